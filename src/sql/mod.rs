// Text-to-SQL bridge
// Asks the SQL model for a statement over the event table, then runs it


use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::config::Config;
use crate::config::prompts::{QUESTION_PLACEHOLDER, TABLE_INFO_PLACEHOLDER};
use crate::database::{Database, SqlRow};
use crate::llm::ChatClient;

const SQL_FENCE_OPEN: &str = "```sql";
const FENCE_CLOSE: &str = "```";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SqlBridgeError {
    #[error("Model reply contains no ```sql code block: {response}")]
    MissingSqlFence { response: String },
}

/// Relational database operations the bridge relies on
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn show_create_table(&self, table: &str) -> anyhow::Result<String>;

    async fn fetch_rows(&self, sql: &str) -> anyhow::Result<Vec<SqlRow>>;
}

#[async_trait]
impl SqlExecutor for Database {
    async fn show_create_table(&self, table: &str) -> anyhow::Result<String> {
        Self::show_create_table(self, table).await
    }

    async fn fetch_rows(&self, sql: &str) -> anyhow::Result<Vec<SqlRow>> {
        Self::fetch_rows(self, sql).await
    }
}

/// SQL found in the first ```sql fence, up to the next fence or the end of the reply
#[inline]
pub fn extract_sql(reply: &str) -> std::result::Result<String, SqlBridgeError> {
    let (_, after_fence) =
        reply
            .split_once(SQL_FENCE_OPEN)
            .ok_or_else(|| SqlBridgeError::MissingSqlFence {
                response: reply.to_string(),
            })?;

    let sql = after_fence
        .split_once(FENCE_CLOSE)
        .map_or(after_fence, |(sql, _)| sql);

    Ok(sql.trim().to_string())
}

/// Fill `{table_info}` and `{question}` in one pass, leaving substituted text untouched
#[inline]
pub fn build_prompt(template: &str, table_info: &str, question: &str) -> String {
    let mut prompt = String::with_capacity(template.len() + table_info.len() + question.len());
    let mut rest = template;

    loop {
        let next = [
            (rest.find(TABLE_INFO_PLACEHOLDER), TABLE_INFO_PLACEHOLDER, table_info),
            (rest.find(QUESTION_PLACEHOLDER), QUESTION_PLACEHOLDER, question),
        ]
        .into_iter()
        .filter_map(|(pos, placeholder, value)| pos.map(|pos| (pos, placeholder, value)))
        .min_by_key(|(pos, _, _)| *pos);

        let Some((pos, placeholder, value)) = next else {
            prompt.push_str(rest);
            return prompt;
        };

        prompt.push_str(&rest[..pos]);
        prompt.push_str(value);
        rest = &rest[pos + placeholder.len()..];
    }
}

pub struct SqlBridge {
    executor: Arc<dyn SqlExecutor>,
    chat: ChatClient,
    table_name: String,
    template: String,
}

impl SqlBridge {
    #[inline]
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        chat: ChatClient,
        table_name: &str,
        template: &str,
    ) -> Self {
        Self {
            executor,
            chat,
            table_name: table_name.to_string(),
            template: template.to_string(),
        }
    }

    /// Bridge over `database` using the configured SQL model, table and template
    #[inline]
    pub fn from_config(config: &Config, database: Database) -> Result<Self> {
        let chat = ChatClient::new(&config.model, &config.model.sql_model)?;
        Ok(Self::new(
            Arc::new(database),
            chat,
            &config.database.table_name,
            &config.prompts.sql_template,
        ))
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// `SHOW CREATE TABLE` output, or an empty string when it cannot be fetched
    #[inline]
    pub async fn table_info(&self) -> String {
        match self.executor.show_create_table(&self.table_name).await {
            Ok(ddl) => ddl,
            Err(e) => {
                warn!("Could not fetch schema of {}: {:#}", self.table_name, e);
                String::new()
            }
        }
    }

    #[inline]
    pub fn build_prompt(&self, table_info: &str, question: &str) -> String {
        build_prompt(&self.template, table_info, question)
    }

    /// Translate a question into SQL with one zero-temperature model call
    #[inline]
    pub async fn generate_sql(&self, question: &str) -> Result<String> {
        let table_info = self.table_info().await;
        let prompt = self.build_prompt(&table_info, question);
        debug!("Text-to-SQL prompt is {} chars", prompt.len());

        let reply = self.chat.prompt(&prompt, Some(0.0))?;
        let sql = extract_sql(&reply)?;

        info!("Generated SQL for '{}': {}", question, sql);
        Ok(sql)
    }

    /// Run `sql`; failures are logged and yield no rows
    #[inline]
    pub async fn execute(&self, sql: &str) -> Vec<SqlRow> {
        match self.executor.fetch_rows(sql).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("SQL execution failed: {:#}", e);
                Vec::new()
            }
        }
    }

    /// `generate_sql` followed by `execute`
    #[inline]
    pub async fn answer(&self, question: &str) -> Result<Vec<SqlRow>> {
        let sql = self.generate_sql(question).await?;
        Ok(self.execute(&sql).await)
    }
}
