use std::time::Duration;

use formcall_core::error::ErrorCode;
use formcall_core::fields::SchemaEditError;
use formcall_core::handshake::HandshakeError;
use thiserror::Error;

/// How long an error notification stays visible.
pub const NOTIFICATION_DISPLAY: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid call url: {0}")]
    InvalidUrl(String),
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error("server error {code}: {message}")]
    Server { code: ErrorCode, message: String },
    #[error("connection closed by server (code {0:?})")]
    Closed(Option<u16>),
    #[error("transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Form(#[from] SchemaEditError),
    #[error("call controller is no longer running")]
    ControllerGone,
}

impl ClientError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUrl(_) => ErrorCode::MissingUrl,
            Self::Handshake(_) => ErrorCode::MissingParams,
            Self::Server { code, .. } => *code,
            Self::Closed(Some(code)) => {
                ErrorCode::from_close_code(*code).unwrap_or(ErrorCode::Connection)
            }
            Self::Form(_) => ErrorCode::BadRequest,
            Self::Connect(_) | Self::Closed(None) | Self::Transport(_) | Self::ControllerGone => {
                ErrorCode::Connection
            }
        }
    }
}

/// Error broadcast to the UI when a call fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotification {
    pub code: ErrorCode,
    pub message: String,
    pub display_for: Duration,
}

impl ErrorNotification {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.user_message().to_string(),
            display_for: NOTIFICATION_DISPLAY,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.code.is_configuration()
    }
}
