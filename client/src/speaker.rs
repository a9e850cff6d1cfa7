use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started,
    Finished,
}

/// Audio output for assistant speech.
pub trait Speaker: Send + Sync {
    /// Queue an encoded audio chunk received from the server.
    fn enqueue(&self, chunk: Vec<u8>);

    fn is_playing(&self) -> bool;

    /// Playback notifications from now on.
    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent>;

    /// Drop queued audio and stop playing. Called once when a call is torn down.
    fn stop(&self);
}

/// Speaker for text-only calls: discards audio and never plays.
#[derive(Debug)]
pub struct NullSpeaker {
    events: broadcast::Sender<PlaybackEvent>,
}

impl NullSpeaker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self { events }
    }
}

impl Default for NullSpeaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Speaker for NullSpeaker {
    fn enqueue(&self, chunk: Vec<u8>) {
        tracing::trace!(bytes = chunk.len(), "discarding assistant audio");
    }

    fn is_playing(&self) -> bool {
        false
    }

    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    fn stop(&self) {}
}
