use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use crate::error::ClientError;

/// Transport-neutral websocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<u16>),
}

/// An open call transport. Dropping `outgoing` closes the connection;
/// `incoming` ends after the peer's close frame or a transport failure.
#[derive(Debug)]
pub struct Connection {
    pub outgoing: mpsc::UnboundedSender<Frame>,
    pub incoming: mpsc::UnboundedReceiver<Frame>,
}

impl Connection {
    /// Returns `false` when the transport is already gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.outgoing.send(frame).is_ok()
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Frame::Text(text.into()))
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Connection, ClientError>;
}

/// Websocket connector over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Connection, ClientError> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| ClientError::Connect(err.to_string()))?;
        let (mut sink, mut stream) = ws_stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Frame>();
        let (incoming_tx, incoming) = mpsc::unbounded_channel::<Frame>();

        // socket → incoming
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let frame = match message {
                    Ok(Message::Text(text)) => Frame::Text(text),
                    Ok(Message::Binary(data)) => Frame::Binary(data),
                    Ok(Message::Close(frame)) => {
                        let _ = incoming_tx.send(Frame::Close(frame.map(|f| u16::from(f.code))));
                        break;
                    }
                    Ok(_) => continue,
                    Err(err) => {
                        tracing::debug!(error = %err, "call transport failed");
                        break;
                    }
                };
                if incoming_tx.send(frame).is_err() {
                    break;
                }
            }
        });

        // outgoing → socket
        tokio::spawn(async move {
            while let Some(frame) = outgoing_rx.recv().await {
                let message = match frame {
                    Frame::Text(text) => Message::Text(text),
                    Frame::Binary(data) => Message::Binary(data),
                    Frame::Close(code) => Message::Close(code.map(|code| CloseFrame {
                        code: CloseCode::from(code),
                        reason: "".into(),
                    })),
                };
                if sink.send(message).await.is_err() {
                    return;
                }
            }
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                })))
                .await;
        });

        tracing::debug!(%url, "call transport open");
        Ok(Connection { outgoing, incoming })
    }
}

/// Both ends of an in-memory connection, for driving a call without a server.
#[cfg(test)]
pub(crate) fn pair() -> (Connection, Connection) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        Connection {
            outgoing: a_tx,
            incoming: b_rx,
        },
        Connection {
            outgoing: b_tx,
            incoming: a_rx,
        },
    )
}
