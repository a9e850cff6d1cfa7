use std::time::Duration;

use axum::extract::ws::Message;
use formcall_core::handshake::{HandshakeError, SessionParams};
use futures_util::{Stream, StreamExt};

/// Wait for the session parameters, the first text frame of a call.
/// Nothing else is read from the socket until they arrive or `timeout` elapses.
pub async fn wait_for_params<S>(
    incoming: &mut S,
    timeout: Duration,
) -> Result<SessionParams, HandshakeError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let payload = tokio::time::timeout(timeout, first_payload(incoming))
        .await
        .map_err(|_| HandshakeError::Timeout(timeout.as_millis() as u64))??;
    SessionParams::parse(&payload)
}

async fn first_payload<S>(incoming: &mut S) -> Result<String, HandshakeError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(frame) = incoming.next().await {
        match frame {
            Ok(Message::Text(text)) => return Ok(text.as_str().to_owned()),
            Ok(Message::Binary(_)) => return Err(HandshakeError::UnexpectedFrame),
            Ok(Message::Close(_)) => return Err(HandshakeError::Closed),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Err(err) => {
                tracing::debug!(error = %err, "socket failed before session parameters");
                return Err(HandshakeError::Closed);
            }
        }
    }
    Err(HandshakeError::Closed)
}
