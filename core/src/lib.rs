//! Shared model for voice-driven form filling: the field schema, the session
//! handshake payload, the agent instructions derived from it, the tool-call
//! bridge, the conversation transcript and the post-handshake wire protocol.

pub mod bridge;
pub mod conversation;
pub mod error;
pub mod fields;
pub mod handshake;
pub mod instructions;
pub mod protocol;
