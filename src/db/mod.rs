mod repository;
mod schema;

pub use repository::{DeskStats, EmbeddingCandidate, EmbeddingStats, Repository};
