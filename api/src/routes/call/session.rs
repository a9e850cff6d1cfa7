use std::sync::Arc;

use axum::extract::ws::Message;
use formcall_core::bridge::{acknowledgement, form_tools};
use formcall_core::conversation::Role;
use formcall_core::handshake::SessionParams;
use formcall_core::instructions::build_instructions;
use formcall_core::protocol::{ClientCommand, ServerEvent};
use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::providers::{
    AgentMessage, AgentSetup, ConversationalAgent, SpeechToText, TextToSpeech, ToolRegistry,
};
use crate::state::AppState;

/// Agent configuration derived from the handshake: instructions from the
/// fields, plus `updateFormField` when there is at least one field. The tool
/// callback only acknowledges; the client applies the value.
pub fn agent_setup(params: &SessionParams, auto_end_call: bool) -> AgentSetup {
    let fields = params.fields();
    let mut tools = ToolRegistry::new();
    for definition in form_tools(fields) {
        tools.register(definition, |_| acknowledgement());
    }
    AgentSetup {
        instructions: build_instructions(fields),
        tools,
        auto_end_call,
    }
}

/// Server half of one call, created once the handshake succeeded.
pub struct CallSession {
    agent: Box<dyn ConversationalAgent>,
    stt: Option<Box<dyn SpeechToText>>,
    tts: Option<Arc<dyn TextToSpeech>>,
    history: Vec<AgentMessage>,
    paused: bool,
    muted: bool,
    out: mpsc::UnboundedSender<Message>,
}

impl CallSession {
    pub fn open(
        state: &AppState,
        params: &SessionParams,
        out: mpsc::UnboundedSender<Message>,
        transcripts: mpsc::UnboundedSender<String>,
    ) -> Result<Self, SessionError> {
        let setup = agent_setup(params, state.config.auto_end_call);
        tracing::debug!(
            tools = ?setup.tools.tool_names(),
            instructions_len = setup.instructions.len(),
            "configuring agent"
        );
        let agent = state.providers.agent.create(setup)?;
        let stt = match &state.providers.stt {
            Some(factory) => Some(factory.create(transcripts)?),
            None => None,
        };

        Ok(Self {
            agent,
            stt,
            tts: state.providers.tts.clone(),
            history: Vec::new(),
            paused: false,
            muted: false,
            out,
        })
    }

    pub fn send(&self, event: &ServerEvent) {
        let _ = self.out.send(Message::Text(event.to_json().into()));
    }

    /// Let the agent open the conversation.
    pub async fn greet(&mut self) -> Result<(), SessionError> {
        self.respond().await
    }

    pub async fn handle_command(&mut self, command: ClientCommand) -> Result<(), SessionError> {
        match command {
            ClientCommand::Text { content } => self.handle_transcript(content).await?,
            ClientCommand::SpeechStart => {
                if !self.paused && !self.muted {
                    self.send(&ServerEvent::UserSpeaking);
                }
            }
            ClientCommand::SpeechEnd => {
                if let Some(stt) = self.stt.as_mut() {
                    stt.end_of_speech().await?;
                }
            }
            ClientCommand::Pause => self.paused = true,
            ClientCommand::Resume => {
                self.paused = false;
                self.send(&ServerEvent::Listening);
            }
            ClientCommand::Mute => self.muted = true,
            ClientCommand::Unmute => self.muted = false,
        }
        Ok(())
    }

    pub async fn handle_audio(&mut self, chunk: Vec<u8>) -> Result<(), SessionError> {
        if self.paused || self.muted {
            return Ok(());
        }
        match self.stt.as_mut() {
            Some(stt) => stt.push_audio(chunk).await?,
            None => tracing::trace!(bytes = chunk.len(), "no speech recognizer; dropping audio"),
        }
        Ok(())
    }

    pub async fn handle_transcript(&mut self, text: String) -> Result<(), SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        if self.paused {
            tracing::debug!("call paused; ignoring user input");
            return Ok(());
        }

        self.history.push(AgentMessage {
            role: Role::User,
            content: text.to_string(),
        });
        self.send(&ServerEvent::Message {
            role: Role::User,
            content: text.to_string(),
        });
        self.respond().await
    }

    async fn respond(&mut self) -> Result<(), SessionError> {
        self.send(&ServerEvent::Processing);
        let reply = self.agent.answer(&self.history).await?;

        for call in reply.tool_calls {
            tracing::debug!(tool = %call.tool_name, parameters = %call.parameters, "agent tool call");
            self.send(&ServerEvent::ToolCall {
                tool_name: call.tool_name,
                parameters: call.parameters,
                output: call.output,
            });
        }

        if !reply.content.is_empty() {
            self.history.push(AgentMessage {
                role: Role::Assistant,
                content: reply.content.clone(),
            });
            self.send(&ServerEvent::Message {
                role: Role::Assistant,
                content: reply.content.clone(),
            });
            if let Some(tts) = &self.tts {
                for chunk in tts.synthesize(&reply.content).await? {
                    let _ = self.out.send(Message::Binary(chunk.into()));
                }
            }
        }

        if reply.end_call {
            tracing::info!("agent ended the call");
            self.send(&ServerEvent::EndCall);
        } else {
            self.send(&ServerEvent::Listening);
        }
        Ok(())
    }
}
