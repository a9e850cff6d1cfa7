//! JSON text frames exchanged on `/call` once the handshake has succeeded.
//! Audio travels in binary frames in both directions and is not modelled here.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::conversation::Role;
use crate::error::ErrorCode;

/// Path of the call endpoint.
pub const CALL_PATH: &str = "/call";

/// Server → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Handshake accepted; the call is live.
    Ready,
    Listening,
    UserSpeaking,
    Processing,
    Message {
        role: Role,
        content: String,
    },
    /// An agent tool invocation and the acknowledgement it received.
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_name: String,
        parameters: serde_json::Value,
        output: serde_json::Value,
    },
    /// The agent considers the conversation finished.
    EndCall,
    Error {
        code: ErrorCode,
        message: String,
    },
}

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientCommand {
    /// Typed utterance, handled like a transcript from speech recognition.
    Text { content: String },
    SpeechStart,
    SpeechEnd,
    Pause,
    Resume,
    Mute,
    Unmute,
}

impl ServerEvent {
    pub fn to_json(&self) -> String {
        // Serializing these variants cannot fail: all keys are strings.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl ClientCommand {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
