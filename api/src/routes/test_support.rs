use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::providers::{
    AgentFactory, AgentMessage, AgentReply, AgentSetup, ConversationalAgent, ProviderError,
    Providers, SpeechToText, SpeechToTextFactory, TextToSpeech, ToolInvocation, ToolRegistry,
};
use crate::state::AppState;

/// Instructions and tool names of every agent created.
pub type RecordedSetups = Arc<Mutex<Vec<(String, Vec<String>)>>>;

#[derive(Debug, Clone)]
pub struct ScriptedToolCall {
    pub tool_name: String,
    pub parameters: Value,
}

impl ScriptedToolCall {
    pub fn new(tool_name: &str, parameters: Value) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            parameters,
        }
    }
}

/// Agent factory whose agents replay a fixed list of replies. Tool calls
/// scripted for a turn go through the session's registry, so outputs are
/// whatever the registered callbacks return.
pub struct ScriptedAgentFactory {
    replies: Vec<AgentReply>,
    tool_calls: HashMap<usize, Vec<ScriptedToolCall>>,
    setups: RecordedSetups,
}

impl ScriptedAgentFactory {
    pub fn new(replies: Vec<AgentReply>) -> Self {
        Self {
            replies,
            tool_calls: HashMap::new(),
            setups: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_tool_calls(mut self, turn: usize, calls: Vec<ScriptedToolCall>) -> Self {
        self.tool_calls.insert(turn, calls);
        self
    }

    pub fn setups(&self) -> RecordedSetups {
        self.setups.clone()
    }
}

impl AgentFactory for ScriptedAgentFactory {
    fn create(&self, setup: AgentSetup) -> Result<Box<dyn ConversationalAgent>, ProviderError> {
        self.setups
            .lock()
            .expect("setups lock")
            .push((setup.instructions.clone(), setup.tools.tool_names()));
        Ok(Box::new(ScriptedAgent {
            replies: self.replies.clone(),
            tool_calls: self.tool_calls.clone(),
            tools: setup.tools,
            turn: 0,
        }))
    }
}

struct ScriptedAgent {
    replies: Vec<AgentReply>,
    tool_calls: HashMap<usize, Vec<ScriptedToolCall>>,
    tools: ToolRegistry,
    turn: usize,
}

#[async_trait]
impl ConversationalAgent for ScriptedAgent {
    async fn answer(&mut self, _history: &[AgentMessage]) -> Result<AgentReply, ProviderError> {
        let turn = self.turn;
        self.turn += 1;

        let mut reply = self.replies.get(turn).cloned().unwrap_or_default();
        for call in self.tool_calls.get(&turn).cloned().unwrap_or_default() {
            let output = self
                .tools
                .invoke(&call.tool_name, &call.parameters)
                .ok_or_else(|| ProviderError::Response(format!("unknown tool {}", call.tool_name)))?;
            reply.tool_calls.push(ToolInvocation {
                tool_name: call.tool_name,
                parameters: call.parameters,
                output,
            });
        }
        Ok(reply)
    }
}

/// Recognizer factory whose recognizers emit the next scripted transcript
/// at each end of speech that followed some audio.
pub struct ScriptedSpeechFactory {
    transcripts: Vec<String>,
    heard: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedSpeechFactory {
    pub fn new(transcripts: &[&str]) -> Self {
        Self {
            transcripts: transcripts.iter().map(|t| t.to_string()).collect(),
            heard: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every audio byte pushed to any recognizer, in arrival order.
    pub fn heard(&self) -> Arc<Mutex<Vec<u8>>> {
        self.heard.clone()
    }
}

impl SpeechToTextFactory for ScriptedSpeechFactory {
    fn create(
        &self,
        transcripts: mpsc::UnboundedSender<String>,
    ) -> Result<Box<dyn SpeechToText>, ProviderError> {
        Ok(Box::new(ScriptedRecognizer {
            script: self.transcripts.clone().into_iter(),
            pending: 0,
            heard: self.heard.clone(),
            transcripts,
        }))
    }
}

struct ScriptedRecognizer {
    script: std::vec::IntoIter<String>,
    pending: usize,
    heard: Arc<Mutex<Vec<u8>>>,
    transcripts: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl SpeechToText for ScriptedRecognizer {
    async fn push_audio(&mut self, chunk: Vec<u8>) -> Result<(), ProviderError> {
        self.pending += chunk.len();
        self.heard.lock().expect("heard lock").extend(chunk);
        Ok(())
    }

    async fn end_of_speech(&mut self) -> Result<(), ProviderError> {
        if std::mem::take(&mut self.pending) == 0 {
            return Ok(());
        }
        if let Some(transcript) = self.script.next() {
            let _ = self.transcripts.send(transcript);
        }
        Ok(())
    }
}

/// One audio chunk per word.
pub fn synthesized(text: &str) -> Vec<Vec<u8>> {
    text.split_whitespace()
        .map(|word| word.as_bytes().to_vec())
        .collect()
}

pub struct WordSynthesizer;

#[async_trait]
impl TextToSpeech for WordSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<Vec<u8>>, ProviderError> {
        Ok(synthesized(text))
    }
}

fn build_state(providers: Providers, handshake_timeout: Duration) -> AppState {
    let config = ServerConfig {
        handshake_timeout,
        ..ServerConfig::default()
    };
    AppState::new(config, providers)
}

pub fn state_with(factory: ScriptedAgentFactory, handshake_timeout: Duration) -> AppState {
    build_state(
        Providers {
            agent: Arc::new(factory),
            stt: None,
            tts: None,
        },
        handshake_timeout,
    )
}

/// Voice mode: scripted recognizer plus [`WordSynthesizer`].
pub fn state_with_speech(
    factory: ScriptedAgentFactory,
    speech: ScriptedSpeechFactory,
    handshake_timeout: Duration,
) -> AppState {
    build_state(
        Providers {
            agent: Arc::new(factory),
            stt: Some(Arc::new(speech)),
            tts: Some(Arc::new(WordSynthesizer)),
        },
        handshake_timeout,
    )
}

pub fn test_state() -> AppState {
    state_with(
        ScriptedAgentFactory::new(Vec::new()),
        Duration::from_millis(200),
    )
}
