//! Seams to the speech and language collaborators. The call pipeline only
//! talks to these traits; concrete vendors live in submodules.

use std::sync::Arc;

use async_trait::async_trait;
use formcall_core::bridge::ToolDefinition;
use formcall_core::conversation::Role;
use formcall_core::error::ErrorCode;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod openai;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("unexpected provider response: {0}")]
    Response(String),
}

impl ProviderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::Request(_) | Self::Response(_) => ErrorCode::InternalServer,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Request(err.to_string())
    }
}

pub type ToolCallback = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    callback: ToolCallback,
}

/// Tools the agent may call during a session.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register<F>(&mut self, definition: ToolDefinition, callback: F)
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.tools.push(RegisteredTool {
            definition,
            callback: Arc::new(callback),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().map(|tool| &tool.definition)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.definitions().map(|d| d.name.clone()).collect()
    }

    /// `None` when no tool with this name is registered.
    pub fn invoke(&self, name: &str, arguments: &Value) -> Option<Value> {
        self.tools
            .iter()
            .find(|tool| tool.definition.name == name)
            .map(|tool| (tool.callback)(arguments))
    }
}

/// Everything an agent is configured with for one call.
#[derive(Clone)]
pub struct AgentSetup {
    pub instructions: String,
    pub tools: ToolRegistry,
    pub auto_end_call: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentMessage {
    pub role: Role,
    pub content: String,
}

/// A tool call made while producing a reply, with the output the agent saw.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub parameters: Value,
    pub output: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentReply {
    pub content: String,
    /// In the order the agent made them
    pub tool_calls: Vec<ToolInvocation>,
    pub end_call: bool,
}

#[async_trait]
pub trait ConversationalAgent: Send {
    /// Next assistant turn for `history`. An empty history asks for a greeting.
    async fn answer(&mut self, history: &[AgentMessage]) -> Result<AgentReply, ProviderError>;
}

pub trait AgentFactory: Send + Sync {
    fn create(&self, setup: AgentSetup) -> Result<Box<dyn ConversationalAgent>, ProviderError>;
}

#[async_trait]
pub trait SpeechToText: Send {
    async fn push_audio(&mut self, chunk: Vec<u8>) -> Result<(), ProviderError>;

    /// The client's voice detector reported the end of an utterance.
    async fn end_of_speech(&mut self) -> Result<(), ProviderError>;
}

pub trait SpeechToTextFactory: Send + Sync {
    /// Final transcripts are delivered on `transcripts`.
    fn create(
        &self,
        transcripts: mpsc::UnboundedSender<String>,
    ) -> Result<Box<dyn SpeechToText>, ProviderError>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Encoded audio chunks for `text`, in playback order.
    async fn synthesize(&self, text: &str) -> Result<Vec<Vec<u8>>, ProviderError>;
}

/// Collaborators used to build each call. Speech is optional: without it
/// calls run in text mode.
#[derive(Clone)]
pub struct Providers {
    pub agent: Arc<dyn AgentFactory>,
    pub stt: Option<Arc<dyn SpeechToTextFactory>>,
    pub tts: Option<Arc<dyn TextToSpeech>>,
}
