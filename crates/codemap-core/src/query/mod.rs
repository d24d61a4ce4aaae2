pub mod guards;
pub mod search;
pub mod structure;
