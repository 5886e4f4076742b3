
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::prompts::PromptConfig;
use crate::embeddings::chunking::ChunkingConfig;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1024;

/// Upper bound for `agent.max_steps` and the `--max-steps` override
pub const MAX_AGENT_STEPS: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// OpenAI-compatible model server used for chat, text-to-SQL and embeddings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub api_path: String,
    pub api_key: String,
    pub chat_model: String,
    pub sql_model: String,
    pub embedding_model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
    pub retry_attempts: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 9997,
            api_path: "/v1".to_string(),
            api_key: String::new(),
            chat_model: "qwen30b".to_string(),
            sql_model: "qwen7b".to_string(),
            embedding_model: "bge-m3".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            retry_attempts: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub collection_name: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            collection_name: "city_operations".to_string(),
        }
    }
}

/// MySQL-compatible server holding the event tables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub charset: String,
    pub table_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "test".to_string(),
            charset: "utf8".to_string(),
            table_name: "event_info_dt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_steps: 10 }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0:?} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid collection name: {0:?} (letters, digits, '_' and '-' only)")]
    InvalidCollectionName(String),
    #[error("Invalid heading depth: {0} (must be between 1 and 6)")]
    InvalidHeadingDepth(u8),
    #[error("Invalid table name: {0:?} (letters, digits, '_' and '$' only)")]
    InvalidTableName(String),
    #[error("Invalid database setting {field}: {value:?}")]
    InvalidDatabaseSetting { field: &'static str, value: String },
    #[error("Invalid max steps: {0} (must be between 1 and 100)")]
    InvalidMaxSteps(usize),
    #[error("Prompt template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default base directory, `~/.cityops`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".cityops"))
            .or_else(|| dirs::data_dir().map(|data| data.join("cityops")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from `config_dir`, falling back to defaults when it does not exist.
    ///
    /// A `prompts.toml` next to it overrides the prompt templates.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        let config_path = config_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str::<Config>(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Config::default()
        };
        config.base_dir = config_dir.to_path_buf();

        let prompts_path = config.prompts_file_path();
        if prompts_path.exists() {
            config.prompts = PromptConfig::load(&prompts_path)?;
        }

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;
        self.vector_store.validate()?;
        self.database.validate()?;

        if !(1..=6).contains(&self.chunking.max_heading_depth) {
            return Err(ConfigError::InvalidHeadingDepth(
                self.chunking.max_heading_depth,
            ));
        }

        if !(1..=MAX_AGENT_STEPS).contains(&self.agent.max_steps) {
            return Err(ConfigError::InvalidMaxSteps(self.agent.max_steps));
        }

        self.prompts.validate()?;
        Ok(())
    }

    #[inline]
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        self.model.api_base_url()
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    #[inline]
    pub fn prompts_file_path(&self) -> PathBuf {
        self.get_base_dir().join("prompts.toml")
    }

    /// Directory holding the LanceDB collections
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        self.api_base_url()?;

        for model in [&self.chat_model, &self.sql_model, &self.embedding_model] {
            if model.trim().is_empty() {
                return Err(ConfigError::InvalidModel(model.clone()));
            }
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    /// Base URL of the OpenAI-compatible API, always ending in `/` so that
    /// `chat/completions` and `embeddings` join beneath it.
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        let path = self.api_path.trim().trim_matches('/');
        let url_str = if path.is_empty() {
            format!("{}://{}:{}/", self.protocol, self.host, self.port)
        } else {
            format!("{}://{}:{}/{}/", self.protocol, self.host, self.port, path)
        };
        let url = Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str.clone()))?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::InvalidUrl(url_str));
        }
        Ok(url)
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = ModelConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.api_base_url()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}

impl VectorStoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.collection_name;
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidCollectionName(name.clone()));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidDatabaseSetting {
                field: "host",
                value: self.host.clone(),
            });
        }

        if self.database.trim().is_empty() {
            return Err(ConfigError::InvalidDatabaseSetting {
                field: "database",
                value: self.database.clone(),
            });
        }

        if self.charset.is_empty() || !self.charset.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::InvalidDatabaseSetting {
                field: "charset",
                value: self.charset.clone(),
            });
        }

        if !is_valid_table_name(&self.table_name) {
            return Err(ConfigError::InvalidTableName(self.table_name.clone()));
        }

        Ok(())
    }
}

/// Unquoted MySQL identifier characters; anything else is rejected rather than escaped.
#[inline]
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
