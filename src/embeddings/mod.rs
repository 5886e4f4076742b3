// Embeddings module
// Heading-based chunking and the OpenAI-compatible embedding client

pub mod chunking;
pub mod client;

pub use chunking::{ChunkMetadata, ChunkingConfig, DocumentChunk, HeaderSection, chunk_document, split_markdown};
pub use client::EmbeddingClient;
