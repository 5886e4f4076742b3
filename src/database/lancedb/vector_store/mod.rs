
use super::{EmbeddingRecord, SearchResult, join_headings, split_headings};
use crate::config::Config;
use crate::embeddings::chunking::{ChunkMetadata, DocumentChunk};
use crate::{CityOpsError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::{
    Connection, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collection of document chunks and their embeddings, persisted by LanceDB
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: Option<usize>,
}

impl VectorStore {
    /// Open the configured collection under `<base_dir>/vectors`
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(
            &config.vector_database_path(),
            &config.vector_store.collection_name,
        )
        .await
    }

    /// Open (or lazily create) the collection `collection_name` at `db_path`.
    ///
    /// The backing table is only created on the first `add`, once the vector
    /// dimension is known.
    #[inline]
    pub async fn open(db_path: &Path, collection_name: &str) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            database_error("Failed to create vector database directory", e)
        })?;

        let uri = db_path.to_string_lossy();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| database_error("Failed to connect to LanceDB", e))?;

        let mut store = Self {
            connection,
            table_name: collection_name.to_string(),
            vector_dimension: None,
        };

        store.vector_dimension = store.detect_existing_vector_dimension().await?;
        match store.vector_dimension {
            Some(dim) => info!(
                "Opened collection '{}' with {}-dimensional vectors",
                store.table_name, dim
            ),
            None => info!(
                "Collection '{}' is empty and will be created on first insert",
                store.table_name
            ),
        }

        Ok(store)
    }

    #[inline]
    pub fn collection_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    pub fn vector_dimension(&self) -> Option<usize> {
        self.vector_dimension
    }

    async fn open_table(&self) -> Result<Option<Table>> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| database_error("Failed to list tables", e))?;

        if !table_names.contains(&self.table_name) {
            return Ok(None);
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| database_error("Failed to open table", e))?;

        Ok(Some(table))
    }

    async fn detect_existing_vector_dimension(&self) -> Result<Option<usize>> {
        let Some(table) = self.open_table().await? else {
            return Ok(None);
        };

        let schema = table
            .schema()
            .await
            .map_err(|e| database_error("Failed to get table schema", e))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(usize::try_from(*size).ok());
                }
            }
        }

        Err(CityOpsError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(vector_dim: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim,
                ),
                false,
            ),
            Field::new("document_name", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("headings", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Append chunk records, returning how many were stored.
    ///
    /// The first insert fixes the collection's vector dimension. Records with
    /// another dimension are rejected while the collection holds any rows.
    #[inline]
    pub async fn add(&mut self, records: &[EmbeddingRecord]) -> Result<usize> {
        let Some(first) = records.first() else {
            debug!("No embeddings to store");
            return Ok(0);
        };

        let vector_dim = first.vector.len();
        if vector_dim == 0 {
            return Err(CityOpsError::Database(format!(
                "Embedding for {} is empty",
                first.id()
            )));
        }
        if let Some(record) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(CityOpsError::Database(format!(
                "Embedding for {} has {} dimensions, expected {}",
                record.id(),
                record.vector.len(),
                vector_dim
            )));
        }

        match self.vector_dimension {
            Some(existing) if existing == vector_dim => {}
            Some(existing) => {
                let count = self.count().await?;
                if count > 0 {
                    return Err(CityOpsError::Database(format!(
                        "Collection '{}' stores {}-dimensional vectors, cannot add {}-dimensional vectors",
                        self.table_name, existing, vector_dim
                    )));
                }
                warn!(
                    "Collection '{}' is empty, recreating it for {}-dimensional vectors (was {})",
                    self.table_name, vector_dim, existing
                );
                self.recreate_table_with_dimension(vector_dim).await?;
            }
            None => self.recreate_table_with_dimension(vector_dim).await?,
        }
        self.vector_dimension = Some(vector_dim);

        let created_at = chrono::Utc::now().to_rfc3339();
        let record_batch = Self::create_record_batch(records, vector_dim, &created_at)?;

        let table = self.open_table().await?.ok_or_else(|| {
            CityOpsError::Database(format!("Collection '{}' is missing", self.table_name))
        })?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| database_error("Failed to insert embeddings", e))?;

        info!(
            "Stored {} chunks in collection '{}'",
            records.len(),
            self.table_name
        );
        Ok(records.len())
    }

    async fn recreate_table_with_dimension(&self, vector_dim: usize) -> Result<()> {
        info!("Creating table with vector dimension: {}", vector_dim);

        self.drop_table_if_exists().await?;

        let dim = i32::try_from(vector_dim)
            .map_err(|e| database_error("Vector dimension out of range", e))?;
        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(dim))
            .execute()
            .await
            .map_err(|e| database_error("Failed to create table", e))?;

        Ok(())
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        if self.open_table().await?.is_some() {
            info!("Dropping existing table '{}'", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| database_error("Failed to drop table", e))?;
        }
        Ok(())
    }

    fn create_record_batch(
        records: &[EmbeddingRecord],
        vector_dim: usize,
        created_at: &str,
    ) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut document_names = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut headings = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);

        for record in records {
            let chunk = &record.chunk;
            ids.push(chunk.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            document_names.push(chunk.metadata.document_name.as_str());
            sources.push(chunk.metadata.source.as_str());
            headings.push(join_headings(&chunk.metadata.headings));
            contents.push(chunk.content.as_str());
            chunk_indices.push(chunk.metadata.chunk_index);
        }

        let dim = i32::try_from(vector_dim)
            .map_err(|e| database_error("Vector dimension out of range", e))?;
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, dim, Arc::new(Float32Array::from(flat_values)), None)
                .map_err(|e| database_error("Failed to create vector array", e))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(document_names)),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(headings)),
            Arc::new(StringArray::from(contents)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(vec![created_at; len])),
        ];

        RecordBatch::try_new(Self::create_schema(dim), arrays)
            .map_err(|e| database_error("Failed to create record batch", e))
    }

    /// Every stored chunk, in stored order
    #[inline]
    pub async fn list(&self) -> Result<Vec<DocumentChunk>> {
        let Some(table) = self.open_table().await? else {
            return Ok(Vec::new());
        };

        let stream = table
            .query()
            .execute()
            .await
            .map_err(|e| database_error("Failed to query table", e))?;

        let rows = parse_stream(stream).await?;
        debug!("Listed {} chunks", rows.len());
        Ok(rows.into_iter().map(|(chunk, _)| chunk).collect())
    }

    /// The `k` nearest chunks to `query_vector`, closest first.
    ///
    /// No similarity cutoff is applied.
    #[inline]
    pub async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        debug!("Searching for similar vectors with limit: {}", k);

        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(table) = self.open_table().await? else {
            return Ok(Vec::new());
        };

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| database_error("Failed to count rows", e))?;
        if count == 0 {
            return Ok(Vec::new());
        }

        if let Some(dim) = self.vector_dimension {
            if dim != query_vector.len() {
                return Err(CityOpsError::Database(format!(
                    "Query vector has {} dimensions, collection '{}' stores {}",
                    query_vector.len(),
                    self.table_name,
                    dim
                )));
            }
        }

        let stream = table
            .vector_search(query_vector)
            .map_err(|e| database_error("Failed to create vector search", e))?
            .column("vector")
            .limit(k)
            .execute()
            .await
            .map_err(|e| database_error("Failed to execute search", e))?;

        let mut results: Vec<SearchResult> = parse_stream(stream)
            .await?
            .into_iter()
            .map(|(chunk, distance)| SearchResult {
                chunk,
                distance: distance.unwrap_or(0.0),
            })
            .collect();

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(k);

        debug!("Search returned {} results", results.len());
        Ok(results)
    }

    /// Remove every chunk whose `source` contains `file_name`, returning the
    /// removed ids.
    ///
    /// Matching is by substring, so `"report"` also removes chunks of
    /// `weekly_report.docx`.
    #[inline]
    pub async fn delete(&self, file_name: &str) -> Result<Vec<String>> {
        debug!("Deleting chunks whose source contains '{}'", file_name);

        let Some(table) = self.open_table().await? else {
            return Ok(Vec::new());
        };

        let matching: Vec<DocumentChunk> = self
            .list()
            .await?
            .into_iter()
            .filter(|chunk| chunk.metadata.source.contains(file_name))
            .collect();

        if matching.is_empty() {
            info!("No chunks found for '{}'", file_name);
            return Ok(Vec::new());
        }

        let sources: BTreeSet<&str> = matching
            .iter()
            .map(|chunk| chunk.metadata.source.as_str())
            .collect();
        let source_count = sources.len();
        let predicate = format!(
            "source IN ({})",
            sources.into_iter().map(sql_string_literal).join(", ")
        );

        table
            .delete(&predicate)
            .await
            .map_err(|e| database_error("Failed to delete chunks", e))?;

        let ids: Vec<String> = matching.into_iter().map(|chunk| chunk.id).collect();
        info!(
            "Deleted {} chunks from {} source file(s) matching '{}'",
            ids.len(),
            source_count,
            file_name
        );
        Ok(ids)
    }

    /// Number of stored chunks
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        table
            .count_rows(None)
            .await
            .map_err(|e| database_error("Failed to count rows", e))
    }
}

fn database_error(context: &str, error: impl Display) -> CityOpsError {
    CityOpsError::Database(format!("{context}: {error}"))
}

fn sql_string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

async fn parse_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<(DocumentChunk, Option<f32>)>> {
    let mut rows = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| database_error("Failed to read result stream", e))?
    {
        rows.extend(parse_batch(&batch)?);
    }

    Ok(rows)
}

fn typed_column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| CityOpsError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| CityOpsError::Database(format!("Invalid {name} column type")))
}

fn parse_batch(batch: &RecordBatch) -> Result<Vec<(DocumentChunk, Option<f32>)>> {
    let ids = typed_column::<StringArray>(batch, "id")?;
    let document_names = typed_column::<StringArray>(batch, "document_name")?;
    let sources = typed_column::<StringArray>(batch, "source")?;
    let headings = typed_column::<StringArray>(batch, "headings")?;
    let contents = typed_column::<StringArray>(batch, "content")?;
    let chunk_indices = typed_column::<UInt32Array>(batch, "chunk_index")?;
    let created_ats = typed_column::<StringArray>(batch, "created_at")?;

    // Only present on vector search results
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let rows = (0..batch.num_rows())
        .map(|row| {
            let chunk = DocumentChunk {
                id: ids.value(row).to_string(),
                content: contents.value(row).to_string(),
                metadata: ChunkMetadata {
                    source: sources.value(row).to_string(),
                    document_name: document_names.value(row).to_string(),
                    headings: split_headings(headings.value(row)),
                    chunk_index: chunk_indices.value(row),
                    created_at: Some(created_ats.value(row).to_string()),
                },
            };
            let distance = distances.and_then(|d| (!d.is_null(row)).then_some(d.value(row)));
            (chunk, distance)
        })
        .collect();

    Ok(rows)
}
