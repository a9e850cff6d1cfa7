use formcall_core::error::{CallError, ErrorCode};
use formcall_core::handshake::HandshakeError;
use formcall_core::protocol::ServerEvent;
use thiserror::Error;

use crate::providers::ProviderError;

/// Failures that end a call. Each maps to an `error` event followed by a
/// close frame carrying the matching close code.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("transport error: {0}")]
    Transport(String),
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::Handshake(err) if err.is_validation() => ErrorCode::BadRequest,
            SessionError::Handshake(_) => ErrorCode::MissingParams,
            SessionError::Provider(err) => err.code(),
            SessionError::Transport(_) => ErrorCode::Connection,
        }
    }

    /// Message sent to the client. Provider internals are not exposed.
    pub fn public_message(&self) -> String {
        match self {
            SessionError::Handshake(err) => err.to_string(),
            SessionError::Provider(ProviderError::Unauthorized(_)) => {
                "The voice server could not authenticate with its AI provider".to_string()
            }
            SessionError::Provider(_) => "An internal error occurred".to_string(),
            SessionError::Transport(msg) => msg.clone(),
        }
    }

    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::Error {
            code: self.code(),
            message: self.public_message(),
        }
    }

    pub fn to_call_error(&self) -> CallError {
        CallError::new(self.code(), self.public_message())
    }
}
