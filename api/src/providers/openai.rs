//! Chat-completions agent for OpenAI-compatible endpoints.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    AgentFactory, AgentMessage, AgentReply, AgentSetup, ConversationalAgent, ProviderError,
    ToolInvocation,
};
use crate::config::OpenAiConfig;

pub const END_CALL_TOOL: &str = "endCall";

/// Upper bound on tool round-trips within a single reply.
const MAX_TOOL_ROUNDS: usize = 4;

pub struct OpenAiAgentFactory {
    config: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiAgentFactory {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

impl AgentFactory for OpenAiAgentFactory {
    fn create(&self, setup: AgentSetup) -> Result<Box<dyn ConversationalAgent>, ProviderError> {
        if self.config.api_key.is_empty() {
            return Err(ProviderError::Unauthorized(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }
        Ok(Box::new(OpenAiAgent {
            config: self.config.clone(),
            http: self.http.clone(),
            tools: tool_specs(&setup),
            setup,
        }))
    }
}

struct OpenAiAgent {
    config: OpenAiConfig,
    http: reqwest::Client,
    setup: AgentSetup,
    tools: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<CompletionToolCall>>,
}

impl CompletionMessage {
    fn tool_calls(&self) -> &[CompletionToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct CompletionToolCall {
    id: String,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded arguments
    arguments: String,
}

fn tool_specs(setup: &AgentSetup) -> Vec<Value> {
    let mut specs: Vec<Value> = setup
        .tools
        .definitions()
        .map(|definition| {
            json!({
                "type": "function",
                "function": {
                    "name": definition.name,
                    "description": definition.description,
                    "parameters": definition.parameters,
                }
            })
        })
        .collect();

    if setup.auto_end_call {
        specs.push(json!({
            "type": "function",
            "function": {
                "name": END_CALL_TOOL,
                "description": "End the call once the conversation is over. Say goodbye before calling it.",
                "parameters": { "type": "object", "properties": {} }
            }
        }));
    }
    specs
}

impl OpenAiAgent {
    fn initial_messages(&self, history: &[AgentMessage]) -> Vec<Value> {
        let mut messages = vec![json!({
            "role": "system",
            "content": self.setup.instructions,
        })];
        messages.extend(history.iter().map(|message| {
            json!({
                "role": message.role.as_str(),
                "content": message.content,
            })
        }));
        messages
    }

    async fn complete(&self, messages: &[Value]) -> Result<CompletionMessage, ProviderError> {
        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
        });
        if !self.tools.is_empty() {
            body["tools"] = json!(self.tools);
        }

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Unauthorized(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Request(format!("HTTP {status}: {text}")));
        }

        let completion: CompletionResponse = resp.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ProviderError::Response("completion has no choices".to_string()))
    }
}

#[async_trait]
impl ConversationalAgent for OpenAiAgent {
    async fn answer(&mut self, history: &[AgentMessage]) -> Result<AgentReply, ProviderError> {
        let mut messages = self.initial_messages(history);
        let mut reply = AgentReply::default();

        for _ in 0..MAX_TOOL_ROUNDS {
            let message = self.complete(&messages).await?;
            if let Some(content) = message.content.as_deref().filter(|c| !c.trim().is_empty()) {
                if !reply.content.is_empty() {
                    reply.content.push(' ');
                }
                reply.content.push_str(content.trim());
            }
            if message.tool_calls().is_empty() {
                return Ok(reply);
            }

            messages.push(json!({
                "role": "assistant",
                "content": message.content,
                "tool_calls": message.tool_calls().iter().map(|call| json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.function.name,
                        "arguments": call.function.arguments,
                    }
                })).collect::<Vec<_>>(),
            }));

            for call in message.tool_calls() {
                let parameters: Value =
                    serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
                let output = if call.function.name == END_CALL_TOOL {
                    reply.end_call = true;
                    json!({})
                } else {
                    self.setup
                        .tools
                        .invoke(&call.function.name, &parameters)
                        .unwrap_or_else(|| json!({ "error": "unknown tool" }))
                };

                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": call.id,
                    "content": output.to_string(),
                }));

                if call.function.name != END_CALL_TOOL {
                    reply.tool_calls.push(ToolInvocation {
                        tool_name: call.function.name.clone(),
                        parameters,
                        output,
                    });
                }
            }
        }

        tracing::warn!(
            rounds = MAX_TOOL_ROUNDS,
            "agent kept calling tools; returning partial reply"
        );
        Ok(reply)
    }
}
