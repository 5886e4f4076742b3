// Agent tools: date lookup, text-to-SQL, SQL query, knowledge-base search, final answer

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{
    AgentTool, FINAL_ANSWER_TOOL, InputType, ToolDefinition, ToolInput, optional_integer_argument,
    string_argument,
};
use crate::Result;
use crate::database::SearchResult;
use crate::database::mysql::render_rows;
use crate::sql::SqlBridge;

/// Number of chunks `doc_search_tool` returns when the model gives no `k`
pub const DEFAULT_SEARCH_K: usize = 3;

/// Separator between chunks in `doc_search_tool` output
pub const DOCUMENT_SEPARATOR: &str = "\n---\n";

/// Similarity search over the ingested documents
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    async fn search(&self, question: &str, k: usize) -> Result<Vec<SearchResult>>;
}

/// Reports the current local date
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeTool;

#[async_trait]
impl AgentTool for TimeTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "time_tool",
            description: "Returns today's date. Use it whenever the question mentions a relative time such as today, yesterday or this week.",
            inputs: Vec::new(),
        }
    }

    async fn call(&self, _arguments: &Value) -> Result<String> {
        Ok(format!(
            "Today is {}",
            chrono::Local::now().format("%Y-%m-%d")
        ))
    }
}

/// Turns a question into SQL without running it
pub struct TextToSqlTool {
    bridge: Arc<SqlBridge>,
}

impl TextToSqlTool {
    #[inline]
    pub fn new(bridge: Arc<SqlBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl AgentTool for TextToSqlTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "text_to_sql_tool",
            description: "Translates a natural-language question about city events into a MySQL query over the event table. Returns the SQL only; run it with query_tool.",
            inputs: vec![ToolInput {
                name: "question",
                kind: InputType::String,
                description: "The question to translate into SQL",
                nullable: false,
            }],
        }
    }

    async fn call(&self, arguments: &Value) -> Result<String> {
        let question = string_argument(arguments, "question")?;
        self.bridge.generate_sql(question).await
    }
}

/// Runs SQL against the event database
pub struct QueryTool {
    bridge: Arc<SqlBridge>,
}

impl QueryTool {
    #[inline]
    pub fn new(bridge: Arc<SqlBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl AgentTool for QueryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "query_tool",
            description: "Executes a SQL statement against the city event database and returns the rows, one JSON object per line. An empty result means no rows or a failed query.",
            inputs: vec![ToolInput {
                name: "sql_string",
                kind: InputType::String,
                description: "The SQL statement to execute",
                nullable: false,
            }],
        }
    }

    async fn call(&self, arguments: &Value) -> Result<String> {
        let sql = string_argument(arguments, "sql_string")?;
        let rows = self.bridge.execute(sql).await;
        Ok(render_rows(&rows))
    }
}

/// Searches the city operations logs
pub struct DocSearchTool {
    search: Arc<dyn DocumentSearch>,
}

impl DocSearchTool {
    #[inline]
    pub fn new(search: Arc<dyn DocumentSearch>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl AgentTool for DocSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "doc_search_tool",
            description: "Searches the daily city operations logs and returns the most relevant passages, separated by '---'.",
            inputs: vec![
                ToolInput {
                    name: "question",
                    kind: InputType::String,
                    description: "What to look for in the operations logs",
                    nullable: false,
                },
                ToolInput {
                    name: "k",
                    kind: InputType::Integer,
                    description: "Number of passages to return (default 3)",
                    nullable: true,
                },
            ],
        }
    }

    async fn call(&self, arguments: &Value) -> Result<String> {
        let question = string_argument(arguments, "question")?;
        let k = optional_integer_argument(arguments, "k")?
            .map_or(DEFAULT_SEARCH_K, |k| usize::try_from(k).unwrap_or(usize::MAX));

        let results = self.search.search(question, k).await?;
        debug!("doc_search_tool found {} passages", results.len());

        Ok(results
            .iter()
            .map(|result| result.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join(DOCUMENT_SEPARATOR))
    }
}

/// Ends the run; its `answer` argument becomes the run's answer
#[derive(Debug, Default, Clone, Copy)]
pub struct FinalAnswerTool;

#[async_trait]
impl AgentTool for FinalAnswerTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: FINAL_ANSWER_TOOL,
            description: "Gives the final answer to the user's question and ends the task.",
            inputs: vec![ToolInput {
                name: "answer",
                kind: InputType::String,
                description: "The final answer",
                nullable: false,
            }],
        }
    }

    async fn call(&self, arguments: &Value) -> Result<String> {
        Ok(string_argument(arguments, "answer")?.to_string())
    }
}
