// LanceDB vector database module
// Handles vector storage and similarity search for document chunks


pub mod vector_store;

use crate::embeddings::chunking::DocumentChunk;

/// A chunk paired with its embedding, ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub chunk: DocumentChunk,
    pub vector: Vec<f32>,
}

impl EmbeddingRecord {
    #[inline]
    pub fn new(chunk: DocumentChunk, vector: Vec<f32>) -> Self {
        Self { chunk, vector }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.chunk.id
    }
}

/// A stored chunk returned by similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    /// Distance to the query vector; lower is closer
    pub distance: f32,
}

/// Headings are stored as a single newline-joined column
#[inline]
pub fn join_headings(headings: &[String]) -> String {
    headings.join("\n")
}

#[inline]
pub fn split_headings(stored: &str) -> Vec<String> {
    stored
        .split('\n')
        .filter(|heading| !heading.is_empty())
        .map(str::to_string)
        .collect()
}
