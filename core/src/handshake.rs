//! Session parameters exchanged before any conversation takes place.
//!
//! The client sends exactly one JSON text frame right after the transport
//! opens. The server parses and validates it before building the agent.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::fields::{FormField, FormSchema};

/// First payload on a call connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_schema: Option<FormSchema>,
}

impl SessionParams {
    pub fn for_schema(schema: &FormSchema) -> Self {
        Self {
            form_schema: Some(schema.clone()),
        }
    }

    /// Fields carried by the handshake, empty when no schema was sent.
    pub fn fields(&self) -> &[FormField] {
        self.form_schema
            .as_ref()
            .map(|schema| schema.fields.as_slice())
            .unwrap_or(&[])
    }

    pub fn to_payload(&self) -> Result<String, HandshakeError> {
        serde_json::to_string(self).map_err(|err| HandshakeError::Encode(err.to_string()))
    }

    /// Parse and validate a handshake payload.
    pub fn parse(payload: &str) -> Result<Self, HandshakeError> {
        let params: SessionParams =
            serde_json::from_str(payload).map_err(|err| HandshakeError::from_serde(&err))?;
        params.validate()?;
        Ok(params)
    }

    /// Ids must be unique. Names must be unique too: tool invocations address
    /// fields by name, so a duplicate would make the target ambiguous.
    pub fn validate(&self) -> Result<(), HandshakeError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for field in self.fields() {
            if !ids.insert(field.id.as_str()) {
                return Err(HandshakeError::DuplicateFieldId(field.id.clone()));
            }
            if !names.insert(field.name.as_str()) {
                return Err(HandshakeError::DuplicateFieldName(field.name.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("invalid session parameters: {message}")]
    Malformed {
        message: String,
        /// Offending member, when serde names one
        field: Option<String>,
        /// Rejected enum value, for unknown variants
        received: Option<String>,
    },
    #[error("duplicate field id `{0}`")]
    DuplicateFieldId(String),
    #[error("duplicate field name `{0}`")]
    DuplicateFieldName(String),
    #[error("no session parameters received within {0} ms")]
    Timeout(u64),
    #[error("expected session parameters as a text frame")]
    UnexpectedFrame,
    #[error("connection closed before session parameters arrived")]
    Closed,
    #[error("failed to encode session parameters: {0}")]
    Encode(String),
}

impl HandshakeError {
    fn from_serde(err: &serde_json::Error) -> Self {
        let message = err.to_string();
        let field = extract_field_from_serde_message(&message);
        let received = backticked_after(&message, "unknown variant `");
        Self::Malformed {
            message,
            field,
            received,
        }
    }

    /// Payload arrived but failed validation, as opposed to never arriving.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Malformed { .. } | Self::DuplicateFieldId(_) | Self::DuplicateFieldName(_)
        )
    }
}

/// Pull the member name out of serde's "missing field `x`" / "unknown field
/// `x`" messages.
fn extract_field_from_serde_message(msg: &str) -> Option<String> {
    ["missing field `", "unknown field `"]
        .into_iter()
        .find_map(|pattern| backticked_after(msg, pattern))
}

fn backticked_after(msg: &str, pattern: &str) -> Option<String> {
    let start = msg.find(pattern)? + pattern.len();
    let after = &msg[start..];
    let end = after.find('`')?;
    Some(after[..end].to_string())
}
