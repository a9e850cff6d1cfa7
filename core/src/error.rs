use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Machine-readable call error code shared by server and client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ErrorCode {
    /// Microphone unavailable or permission denied
    Mic,
    /// Transport could not be opened or was lost
    Connection,
    Unauthorized,
    InternalServer,
    /// No server URL configured, or it is not a ws:// / wss:// URL
    MissingUrl,
    /// Session parameters never arrived
    MissingParams,
    /// Session parameters or a command failed validation
    BadRequest,
    NotFound,
}

/// WebSocket close codes used when the server ends a call because of an error.
pub mod close_codes {
    pub const BAD_REQUEST: u16 = 4400;
    pub const UNAUTHORIZED: u16 = 4401;
    pub const NOT_FOUND: u16 = 4404;
    pub const INTERNAL_SERVER: u16 = 4500;
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mic => "Mic",
            Self::Connection => "Connection",
            Self::Unauthorized => "Unauthorized",
            Self::InternalServer => "InternalServer",
            Self::MissingUrl => "MissingUrl",
            Self::MissingParams => "MissingParams",
            Self::BadRequest => "BadRequest",
            Self::NotFound => "NotFound",
        }
    }

    /// Human-readable explanation shown to the user.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Mic => {
                "Microphone access denied. Please enable microphone permissions and try again."
            }
            Self::Connection => {
                "Connection lost. Please check your internet connection and server status."
            }
            Self::Unauthorized => "Authentication failed. Please check your credentials.",
            Self::InternalServer => "Server error occurred. Please try again later.",
            Self::MissingUrl => "Server URL is missing. Please check your configuration.",
            Self::MissingParams => {
                "The voice server did not receive the form configuration. Please try again."
            }
            Self::BadRequest => "Invalid request. Please check your settings.",
            Self::NotFound => "Voice server not found. Please verify the server URL.",
        }
    }

    /// Configuration-class errors come from the handshake, not the network.
    pub fn is_configuration(self) -> bool {
        matches!(self, Self::MissingParams | Self::BadRequest | Self::MissingUrl)
    }

    pub fn close_code(self) -> u16 {
        match self {
            Self::Unauthorized => close_codes::UNAUTHORIZED,
            Self::NotFound => close_codes::NOT_FOUND,
            Self::MissingParams | Self::BadRequest | Self::MissingUrl => close_codes::BAD_REQUEST,
            Self::Mic | Self::Connection | Self::InternalServer => close_codes::INTERNAL_SERVER,
        }
    }

    /// Map a close code received from the server. Normal closures return `None`.
    pub fn from_close_code(code: u16) -> Option<Self> {
        match code {
            1000 | 1001 => None,
            close_codes::BAD_REQUEST => Some(Self::BadRequest),
            close_codes::UNAUTHORIZED => Some(Self::Unauthorized),
            close_codes::NOT_FOUND => Some(Self::NotFound),
            close_codes::INTERNAL_SERVER => Some(Self::InternalServer),
            _ => Some(Self::Connection),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload: a code plus the detail that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CallError {
    pub code: ErrorCode,
    pub message: String,
}

impl CallError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CallError {}
