// Database module
// LanceDB for chunk vectors, MySQL for the city event tables

pub mod lancedb;
pub mod mysql;

pub use self::lancedb::vector_store::VectorStore;
pub use self::lancedb::{EmbeddingRecord, SearchResult};
pub use mysql::{Database, SqlRow};
