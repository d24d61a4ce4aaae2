pub mod index;

pub use index::{ApplySummary, RepositoryIndex};
