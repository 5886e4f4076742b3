// Tool-calling agent
// Dispatches model tool calls until `final_answer`, a plain reply, or the step limit

pub mod tools;


use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, PromptConfig};
use crate::llm::{ChatClient, ChatMessage, ToolCall};
use crate::{CityOpsError, Result};

pub use tools::{DocSearchTool, DocumentSearch, FinalAnswerTool, QueryTool, TextToSqlTool, TimeTool};

/// Name of the tool that ends a run
pub const FINAL_ANSWER_TOOL: &str = "final_answer";

/// Longest observation logged at info level before truncation
const LOGGED_OBSERVATION_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    String,
    Integer,
}

impl InputType {
    fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
        }
    }
}

/// A named, typed tool argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInput {
    pub name: &'static str,
    pub kind: InputType,
    pub description: &'static str,
    /// Nullable inputs may be omitted by the model
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub inputs: Vec<ToolInput>,
}

impl ToolDefinition {
    /// OpenAI function-calling declaration
    #[inline]
    pub fn to_openai_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .inputs
            .iter()
            .map(|input| {
                let mut schema = json!({
                    "type": input.kind.json_type(),
                    "description": input.description,
                });
                if input.nullable {
                    schema["nullable"] = Value::Bool(true);
                }
                (input.name.to_string(), schema)
            })
            .collect();

        let required: Vec<&str> = self
            .inputs
            .iter()
            .filter(|input| !input.nullable)
            .map(|input| input.name)
            .collect();

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

/// A capability the agent can invoke
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool with the model's decoded JSON arguments
    async fn call(&self, arguments: &Value) -> Result<String>;
}

/// Required string argument
#[inline]
pub fn string_argument<'a>(arguments: &'a Value, name: &str) -> Result<&'a str> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| CityOpsError::Agent(format!("Missing string argument '{name}'")))
}

/// Optional integer argument; `null` and absence both give `None`
#[inline]
pub fn optional_integer_argument(arguments: &Value, name: &str) -> Result<Option<u64>> {
    match arguments.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .map(Some)
            .ok_or_else(|| CityOpsError::Agent(format!("Argument '{name}' must be a non-negative integer"))),
        Some(Value::String(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CityOpsError::Agent(format!("Argument '{name}' must be an integer"))),
        Some(_) => Err(CityOpsError::Agent(format!(
            "Argument '{name}' must be an integer"
        ))),
    }
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool of the same name
    #[inline]
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        let name = tool.definition().name;
        self.tools.retain(|existing| existing.definition().name != name);
        self.tools.push(tool);
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn AgentTool>> {
        self.tools.iter().find(|tool| tool.definition().name == name)
    }

    #[inline]
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.definition().name).collect()
    }

    #[inline]
    pub fn definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| tool.definition().to_openai_json())
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// One tool call made during a step and what came back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool: String,
    pub arguments: String,
    pub observation: String,
    pub is_error: bool,
}

/// One model round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStep {
    /// 1-based; the summarising call after the step limit has number `max_steps + 1`
    pub number: usize,
    /// Text the model sent alongside or instead of tool calls
    pub model_output: Option<String>,
    pub invocations: Vec<ToolInvocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    FinalAnswer,
    /// The model answered without calling a tool
    PlainReply,
    StepLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRun {
    pub answer: String,
    pub steps: Vec<AgentStep>,
    pub stop_reason: StopReason,
}

pub struct Agent {
    chat: ChatClient,
    registry: ToolRegistry,
    prompts: PromptConfig,
    max_steps: usize,
}

impl Agent {
    /// Agent with the given tools; `final_answer` is always available
    #[inline]
    pub fn new(chat: ChatClient, mut registry: ToolRegistry, prompts: PromptConfig, max_steps: usize) -> Self {
        if registry.get(FINAL_ANSWER_TOOL).is_none() {
            registry.register(Arc::new(FinalAnswerTool));
        }
        Self {
            chat,
            registry,
            prompts,
            max_steps,
        }
    }

    /// Agent on the configured chat model with the configured step limit
    #[inline]
    pub fn from_config(config: &Config, registry: ToolRegistry) -> Result<Self> {
        let chat = ChatClient::new(&config.model, &config.model.chat_model)?;
        Ok(Self::new(
            chat,
            registry,
            config.prompts.clone(),
            config.agent.max_steps,
        ))
    }

    #[inline]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[inline]
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    #[inline]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Answer `question`, without step reporting
    #[inline]
    pub async fn run(&self, question: &str) -> Result<AgentRun> {
        self.run_with_observer(question, |_| {}).await
    }

    /// Answer `question`, passing every completed step to `observer`
    #[inline]
    pub async fn run_with_observer<F>(&self, question: &str, mut observer: F) -> Result<AgentRun>
    where
        F: FnMut(&AgentStep) + Send,
    {
        info!("Agent run started (max {} steps)", self.max_steps);

        let tool_definitions = self.registry.definitions();
        let mut messages = vec![
            ChatMessage::system(self.prompts.system_prompt.clone()),
            ChatMessage::user(question),
        ];
        let mut steps = Vec::new();

        for number in 1..=self.max_steps {
            let reply = self
                .chat
                .complete_with_tools(&messages, &tool_definitions, None)?;

            let model_output = reply
                .content
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string);

            let Some(calls) = reply.tool_calls.clone().filter(|calls| !calls.is_empty()) else {
                let step = AgentStep {
                    number,
                    model_output: model_output.clone(),
                    invocations: Vec::new(),
                };
                observer(&step);
                steps.push(step);

                info!("Agent answered without tools at step {}", number);
                return Ok(AgentRun {
                    answer: model_output.unwrap_or_default(),
                    steps,
                    stop_reason: StopReason::PlainReply,
                });
            };

            debug!("Step {}: {} tool call(s)", number, calls.len());
            messages.push(reply);

            let mut invocations = Vec::with_capacity(calls.len());
            let mut final_answer = None;

            for call in &calls {
                let (invocation, answer) = self.dispatch(call).await;
                messages.push(ChatMessage::tool(
                    call.id.clone(),
                    invocation.observation.clone(),
                ));
                invocations.push(invocation);

                if answer.is_some() {
                    final_answer = answer;
                    break;
                }
            }

            let step = AgentStep {
                number,
                model_output,
                invocations,
            };
            observer(&step);
            steps.push(step);

            if let Some(answer) = final_answer {
                info!("Agent reached final answer at step {}", number);
                return Ok(AgentRun {
                    answer,
                    steps,
                    stop_reason: StopReason::FinalAnswer,
                });
            }
        }

        warn!(
            "Agent hit the step limit of {}, asking for a summary",
            self.max_steps
        );
        messages.push(ChatMessage::user(self.prompts.render_summary(question)));
        let reply = self.chat.complete(&messages, None)?;
        let answer = reply.text_content().trim().to_string();

        let step = AgentStep {
            number: self.max_steps + 1,
            model_output: Some(answer.clone()),
            invocations: Vec::new(),
        };
        observer(&step);
        steps.push(step);

        Ok(AgentRun {
            answer,
            steps,
            stop_reason: StopReason::StepLimit,
        })
    }

    /// Run one tool call. Failures become error observations for the model.
    async fn dispatch(&self, call: &ToolCall) -> (ToolInvocation, Option<String>) {
        let name = call.function.name.as_str();
        let raw_arguments = call.function.arguments.trim();

        let outcome = match self.registry.get(name) {
            None => Err(CityOpsError::Agent(format!(
                "Unknown tool '{}'. Available tools: {}",
                name,
                self.registry.names().join(", ")
            ))),
            Some(tool) => match parse_arguments(raw_arguments) {
                Ok(arguments) => tool.call(&arguments).await,
                Err(e) => Err(e),
            },
        };

        let (observation, is_error) = match outcome {
            Ok(output) => (output, false),
            Err(e) => {
                warn!("Tool {} failed: {}", name, e);
                (format!("Error: {e}"), true)
            }
        };

        info!(
            "Tool {} -> {}",
            name,
            observation.chars().take(LOGGED_OBSERVATION_CHARS).collect::<String>()
        );

        let answer = (name == FINAL_ANSWER_TOOL && !is_error).then(|| observation.clone());

        (
            ToolInvocation {
                tool: name.to_string(),
                arguments: raw_arguments.to_string(),
                observation,
                is_error,
            },
            answer,
        )
    }
}

fn parse_arguments(raw: &str) -> Result<Value> {
    if raw.is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(CityOpsError::Agent(format!(
            "Tool arguments must be a JSON object, got {other}"
        ))),
        Err(e) => Err(CityOpsError::Agent(format!(
            "Tool arguments are not valid JSON: {e}"
        ))),
    }
}
