use formcall_core::fields::FormSchema;
use formcall_core::handshake::SessionParams;
use formcall_core::protocol::ServerEvent;
use url::Url;

use crate::error::ClientError;
use crate::transport::{Connection, Connector, Frame};

/// Validate the configured call url: present and `ws://` or `wss://`.
pub fn parse_call_url(raw: &str) -> Result<Url, ClientError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ClientError::InvalidUrl("no call url configured".into()));
    }
    let url = Url::parse(raw).map_err(|err| ClientError::InvalidUrl(format!("{raw}: {err}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        scheme => Err(ClientError::InvalidUrl(format!(
            "{raw}: expected ws:// or wss://, got {scheme}://"
        ))),
    }
}

/// Open a call: connect, send the session parameters as the first frame,
/// then wait for the server's `ready`.
pub async fn open_call(
    connector: &dyn Connector,
    raw_url: &str,
    schema: &FormSchema,
) -> Result<Connection, ClientError> {
    let url = parse_call_url(raw_url)?;
    let payload = SessionParams::for_schema(schema).to_payload()?;

    let mut connection = connector.connect(&url).await?;
    if !connection.send_text(payload) {
        return Err(ClientError::Closed(None));
    }
    tracing::debug!(fields = schema.len(), "session parameters sent");

    while let Some(frame) = connection.incoming.recv().await {
        match frame {
            Frame::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                Ok(ServerEvent::Ready) => return Ok(connection),
                Ok(ServerEvent::Error { code, message }) => {
                    return Err(ClientError::Server { code, message });
                }
                Ok(event) => {
                    tracing::debug!(?event, "event before ready; ignoring");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "unreadable server event during handshake");
                }
            },
            Frame::Binary(_) => tracing::debug!("audio before ready; ignoring"),
            Frame::Close(code) => return Err(ClientError::Closed(code)),
        }
    }
    Err(ClientError::Closed(None))
}
