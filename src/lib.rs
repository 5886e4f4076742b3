use thiserror::Error;

use crate::sql::SqlBridgeError;

pub type Result<T> = std::result::Result<T, CityOpsError>;

#[derive(Error, Debug)]
pub enum CityOpsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("SQL bridge error: {0}")]
    Sql(#[from] SqlBridgeError),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod agent;
pub mod commands;
pub mod config;
pub mod database;
pub mod documents;
pub mod embeddings;
pub mod indexer;
pub mod llm;
pub mod sql;
