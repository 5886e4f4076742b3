// Indexer module
// Loads, chunks, embeds and stores documents, and answers knowledge-base queries


use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::agent::DocumentSearch;
use crate::config::Config;
use crate::database::{EmbeddingRecord, SearchResult, VectorStore};
use crate::documents::{is_supported, load_document};
use crate::embeddings::EmbeddingClient;
use crate::embeddings::chunking::{ChunkingConfig, DocumentChunk, chunk_document};

/// Document ingestion and retrieval over one collection
pub struct Indexer {
    vector_store: VectorStore,
    embeddings: EmbeddingClient,
    chunking_config: ChunkingConfig,
}

/// Outcome of ingesting one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source: String,
    pub chunks_added: usize,
    /// Chunks in the collection after this file was added
    pub total_chunks: usize,
}

impl Indexer {
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        let vector_store = VectorStore::new(config)
            .await
            .context("Failed to initialize LanceDB vector store")?;

        let embeddings =
            EmbeddingClient::new(&config.model).context("Failed to initialize embedding client")?;

        Ok(Self::with_parts(
            vector_store,
            embeddings,
            config.chunking.clone(),
        ))
    }

    #[inline]
    pub fn with_parts(
        vector_store: VectorStore,
        embeddings: EmbeddingClient,
        chunking_config: ChunkingConfig,
    ) -> Self {
        Self {
            vector_store,
            embeddings,
            chunking_config,
        }
    }

    #[inline]
    pub fn vector_store(&self) -> &VectorStore {
        &self.vector_store
    }

    /// Load, chunk, embed and store one file.
    ///
    /// Chunks are appended; ingesting a file twice stores its chunks twice.
    #[inline]
    pub async fn add_document(&mut self, path: &Path) -> Result<IngestReport> {
        let document = load_document(path)?;
        let chunks = chunk_document(&document, &self.chunking_config);

        if chunks.is_empty() {
            warn!("{} produced no chunks", document.source);
            return Ok(IngestReport {
                source: document.source,
                chunks_added: 0,
                total_chunks: self.vector_store.count().await?,
            });
        }

        let vectors = self
            .embeddings
            .embed_chunks(&chunks)
            .with_context(|| format!("Failed to embed chunks of {}", document.source))?;

        let records: Vec<EmbeddingRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord::new(chunk, vector))
            .collect();

        let chunks_added = self
            .vector_store
            .add(&records)
            .await
            .with_context(|| format!("Failed to store chunks of {}", document.source))?;
        let total_chunks = self.vector_store.count().await?;

        info!(
            "{} added, {} chunks, total {} chunks",
            document.source, chunks_added, total_chunks
        );

        Ok(IngestReport {
            source: document.source,
            chunks_added,
            total_chunks,
        })
    }

    /// Every stored chunk
    #[inline]
    pub async fn list(&self) -> Result<Vec<DocumentChunk>> {
        Ok(self.vector_store.list().await?)
    }

    /// The `k` chunks closest to `query`
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embeddings
            .embed_query(query)
            .context("Failed to embed search query")?;

        let results = self.vector_store.search(&vector, k).await?;
        debug!("Query '{}' matched {} chunks", query, results.len());
        Ok(results)
    }

    /// Remove chunks whose source contains `file_name`, returning their ids
    #[inline]
    pub async fn delete(&self, file_name: &str) -> Result<Vec<String>> {
        Ok(self.vector_store.delete(file_name).await?)
    }

    #[inline]
    pub async fn count(&self) -> Result<usize> {
        Ok(self.vector_store.count().await?)
    }
}

#[async_trait]
impl DocumentSearch for Indexer {
    async fn search(&self, question: &str, k: usize) -> crate::Result<Vec<SearchResult>> {
        Ok(Self::search(self, question, k).await?)
    }
}

/// Expand `paths` into the supported files they name.
///
/// Directories are walked recursively and their files returned in sorted
/// order. Files named explicitly must have a supported extension.
#[inline]
pub fn collect_documents(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            walk_directory(path, &mut found)?;
            found.sort();
            debug!("Found {} documents under {}", found.len(), path.display());
            documents.extend(found);
        } else if path.is_file() {
            if !is_supported(path) {
                bail!("Unsupported document type: {}", path.display());
            }
            documents.push(path.clone());
        } else {
            bail!("No such file or directory: {}", path.display());
        }
    }

    Ok(documents)
}

fn walk_directory(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read entry in {}", dir.display()))?
            .path();
        if path.is_dir() {
            walk_directory(&path, found)?;
        } else if is_supported(&path) && !is_office_lock_file(&path) {
            found.push(path);
        }
    }

    Ok(())
}

/// Word leaves `~$name.docx` owner files next to open documents
fn is_office_lock_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("~$"))
}
