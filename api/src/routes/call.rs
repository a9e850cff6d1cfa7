//! `/call` websocket: one voice call per connection.
//!
//! 1. wait (bounded) for the session parameters
//! 2. configure the agent from the form fields, send `ready`
//! 3. relay commands, audio and transcripts through the call session
//!
//! Any failure is reported with an `error` event and a close frame.

use axum::{
    Router,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use formcall_core::protocol::{CALL_PATH, ClientCommand, ServerEvent};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::state::AppState;

pub mod handshake;
pub mod session;

use session::CallSession;

pub fn router() -> Router<AppState> {
    Router::new().route(CALL_PATH, get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    tracing::info!("voice connection established");

    if let Err(err) = run_call(&mut ws_rx, &state, &out_tx).await {
        tracing::warn!(error = %err.to_call_error(), "call ended with error");
        let _ = out_tx.send(Message::Text(err.to_event().to_json().into()));
        let _ = out_tx.send(Message::Close(Some(CloseFrame {
            code: err.code().close_code(),
            reason: err.code().as_str().to_string().into(),
        })));
    }

    drop(out_tx);
    let _ = writer.await;
    tracing::info!("voice connection closed");
}

async fn run_call<S>(
    ws_rx: &mut S,
    state: &AppState,
    out: &mpsc::UnboundedSender<Message>,
) -> Result<(), SessionError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let params = handshake::wait_for_params(ws_rx, state.config.handshake_timeout).await?;
    tracing::info!(fields = params.fields().len(), "session parameters accepted");

    let (transcript_tx, mut transcript_rx) = mpsc::unbounded_channel::<String>();
    let mut session = CallSession::open(state, &params, out.clone(), transcript_tx)?;

    session.send(&ServerEvent::Ready);
    if state.config.generate_first_message {
        session.greet().await?;
    } else {
        session.send(&ServerEvent::Listening);
    }

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let Some(frame) = frame else { break };
                match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ClientCommand>(text.as_str()) {
                            Ok(command) => session.handle_command(command).await?,
                            Err(err) => {
                                tracing::warn!(error = %err, "ignoring malformed client command");
                            }
                        }
                    }
                    Ok(Message::Binary(data)) => session.handle_audio(data.to_vec()).await?,
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Err(err) => return Err(SessionError::Transport(err.to_string())),
                }
            }
            Some(transcript) = transcript_rx.recv() => {
                session.handle_transcript(transcript).await?;
            }
        }
    }

    Ok(())
}
