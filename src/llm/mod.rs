// Chat completions client
// OpenAI-compatible `chat/completions`, used by the SQL bridge and the tool agent

pub mod transport;


use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::{CityOpsError, Result};

pub use transport::ApiTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message of a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Result of a tool invocation, answering the call with `tool_call_id`
    #[inline]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Content as a string, empty when the model sent none
    #[inline]
    pub fn text_content(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments
    #[serde(default, deserialize_with = "deserialize_arguments")]
    pub arguments: String,
}

fn default_tool_type() -> String {
    "function".to_string()
}

/// Some servers send arguments as a JSON object instead of an encoded string
fn deserialize_arguments<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Client for one chat model on the configured server
#[derive(Debug, Clone)]
pub struct ChatClient {
    transport: ApiTransport,
    model: String,
}

impl ChatClient {
    #[inline]
    pub fn new(config: &ModelConfig, model: &str) -> Result<Self> {
        let transport = ApiTransport::new(config)
            .map_err(|e| CityOpsError::Config(format!("{e:#}")))?;
        Ok(Self::with_transport(transport, model))
    }

    #[inline]
    pub fn with_transport(transport: ApiTransport, model: &str) -> Self {
        Self {
            transport,
            model: model.to_string(),
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.with_timeout(timeout);
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a conversation and return the first choice's message
    #[inline]
    pub fn complete(&self, messages: &[ChatMessage], temperature: Option<f32>) -> Result<ChatMessage> {
        self.send(messages, temperature, None)
    }

    /// Send a conversation declaring `tools` in OpenAI function-calling format
    #[inline]
    pub fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        temperature: Option<f32>,
    ) -> Result<ChatMessage> {
        self.send(messages, temperature, Some(tools))
    }

    /// Single user prompt, returning the reply text
    #[inline]
    pub fn prompt(&self, prompt: &str, temperature: Option<f32>) -> Result<String> {
        let reply = self.complete(&[ChatMessage::user(prompt)], temperature)?;
        Ok(reply.content.unwrap_or_default())
    }

    fn send(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
        tools: Option<&[Value]>,
    ) -> Result<ChatMessage> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature,
            tools: tools.filter(|tools| !tools.is_empty()),
        };

        let tool_count = request.tools.map_or(0, <[Value]>::len);
        debug!(
            "Sending {} messages to {} ({} tools)",
            messages.len(),
            self.model,
            tool_count
        );

        let response_text = self
            .transport
            .post_json("chat/completions", &request)
            .map_err(|e| CityOpsError::Model(format!("{e:#}")))?;

        let response: ChatResponse = serde_json::from_str(&response_text).map_err(|e| {
            CityOpsError::Model(format!("Failed to parse chat completion response: {e}"))
        })?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            CityOpsError::Model(format!("Model {} returned no choices", self.model))
        })?;

        info!(
            "Model {} replied (finish reason: {})",
            self.model,
            choice.finish_reason.as_deref().unwrap_or("unknown")
        );

        Ok(choice.message)
    }
}
