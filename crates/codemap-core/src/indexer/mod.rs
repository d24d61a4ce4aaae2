pub mod analyzer;
pub mod callgraph;
pub mod embedding;
pub mod extract;
pub mod filesystem;
pub mod graph;
pub mod imports;
pub mod incremental;
pub mod parser;
pub mod patterns;
pub mod pipeline;
pub mod symbols;
