use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::ConfigError;

pub const TABLE_INFO_PLACEHOLDER: &str = "{table_info}";
pub const QUESTION_PLACEHOLDER: &str = "{question}";

const DEFAULT_SQL_TEMPLATE: &str = r#"
Answer the user's question with SQL, using the table structure provided. Requirements:
1. Answer with one block of SQL code that starts with ```sql and ends with ```.
2. Filter any time mentioned in the question on the "dt" column; never filter on other time columns.
3. Express times with CURDATE(), DATE_FORMAT(), YEAR(), MONTH(), QUARTER() and similar functions.
4. The SQL must be valid MySQL, and the rows it returns must answer the question exactly.
```table structure
{table_info}
```
```user question
{question}
```
"#;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant for a city operations center. \
Answer the user's question by calling the tools you are given. The database records daily \
event reports; the knowledge base holds the daily city operations logs. Call `final_answer` \
with your answer as soon as you have it.";

const DEFAULT_SUMMARY_PROMPT: &str = "The step limit has been reached. Using only the \
information gathered above, give your final answer to the question: {question}";

/// Prompt templates, overridable from `[prompts]` in `config.toml` or from `prompts.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    /// Text-to-SQL template with `{table_info}` and `{question}` placeholders
    pub sql_template: String,
    pub system_prompt: String,
    /// Sent when the agent runs out of steps; `{question}` is substituted
    pub summary_prompt: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            sql_template: DEFAULT_SQL_TEMPLATE.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            summary_prompt: DEFAULT_SUMMARY_PROMPT.to_string(),
        }
    }
}

impl PromptConfig {
    /// Read a standalone prompts file; missing keys keep their defaults.
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompts file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse prompts file: {}", path.display()))
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sql_template.contains(TABLE_INFO_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder(TABLE_INFO_PLACEHOLDER));
        }
        if !self.sql_template.contains(QUESTION_PLACEHOLDER)
            || !self.summary_prompt.contains(QUESTION_PLACEHOLDER)
        {
            return Err(ConfigError::MissingPlaceholder(QUESTION_PLACEHOLDER));
        }
        Ok(())
    }

    #[inline]
    pub fn render_summary(&self, question: &str) -> String {
        self.summary_prompt.replace(QUESTION_PLACEHOLDER, question)
    }
}
