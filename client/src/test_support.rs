use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use formcall_core::handshake::SessionParams;
use formcall_core::protocol::ServerEvent;
use tokio::sync::{broadcast, mpsc};
use url::Url;

use crate::error::ClientError;
use crate::speaker::{PlaybackEvent, Speaker};
use crate::transport::{Connection, Connector, Frame, pair};

/// Speaker driven by the test: playback starts and finishes on demand.
pub struct ManualSpeaker {
    playing: AtomicBool,
    events: broadcast::Sender<PlaybackEvent>,
    pub enqueued: Mutex<Vec<Vec<u8>>>,
    stops: AtomicUsize,
}

impl ManualSpeaker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            playing: AtomicBool::new(false),
            events,
            enqueued: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        self.enqueued.lock().expect("enqueued lock").len()
    }

    pub fn start_playing(&self) {
        self.playing.store(true, Ordering::SeqCst);
        let _ = self.events.send(PlaybackEvent::Started);
    }

    pub fn finish_playing(&self) {
        self.playing.store(false, Ordering::SeqCst);
        let _ = self.events.send(PlaybackEvent::Finished);
    }
}

impl Speaker for ManualSpeaker {
    fn enqueue(&self, chunk: Vec<u8>) {
        self.enqueued.lock().expect("enqueued lock").push(chunk);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.enqueued.lock().expect("enqueued lock").clear();
        if self.playing.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(PlaybackEvent::Finished);
        }
    }
}

/// Far end of a connection handed out by [`ChannelConnector`].
pub struct ServerEnd {
    pub connection: Connection,
}

impl ServerEnd {
    pub async fn recv(&mut self) -> Option<Frame> {
        self.connection.incoming.recv().await
    }

    pub async fn expect_params(&mut self) -> SessionParams {
        match self.recv().await {
            Some(Frame::Text(payload)) => SessionParams::parse(&payload).expect("valid params"),
            other => panic!("expected session parameters, got {other:?}"),
        }
    }

    pub fn send_event(&self, event: ServerEvent) {
        assert!(self.connection.send_text(event.to_json()), "client end dropped");
    }

    pub fn close(&self, code: u16) {
        let _ = self.connection.send(Frame::Close(Some(code)));
    }
}

/// Connector that hands the server end of each new connection to the test.
pub struct ChannelConnector {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    refuse: AtomicBool,
}

impl ChannelConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        (
            Self {
                accepted,
                refuse: AtomicBool::new(false),
            },
            rx,
        )
    }

    pub fn refusing() -> Self {
        let (connector, _) = Self::new();
        connector.refuse.store(true, Ordering::SeqCst);
        connector
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, _url: &Url) -> Result<Connection, ClientError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ClientError::Connect("connection refused".into()));
        }
        let (client, server) = pair();
        self.accepted
            .send(ServerEnd { connection: server })
            .map_err(|_| ClientError::Connect("test server gone".into()))?;
        Ok(client)
    }
}
