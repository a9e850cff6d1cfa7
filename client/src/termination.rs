//! Ending a call without clipping the assistant's last words.
//!
//! After the agent signals the end of the call the controller waits a short
//! grace period, then stops once the speaker is quiet.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use crate::speaker::{PlaybackEvent, Speaker};

const DEFAULT_END_CALL_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_MAX_PLAYBACK_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPolicy {
    /// Grace period between the end-of-call signal and the playback check
    pub end_call_delay: Duration,
    /// Upper bound on waiting for playback to finish; `None` waits forever
    pub max_playback_wait: Option<Duration>,
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self {
            end_call_delay: DEFAULT_END_CALL_DELAY,
            max_playback_wait: Some(DEFAULT_MAX_PLAYBACK_WAIT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Nothing was playing after the grace period
    Quiet,
    PlaybackFinished,
    FallbackElapsed,
    /// The speaker stopped publishing notifications
    SpeakerGone,
}

/// Resolve once the call may be stopped.
///
/// The playback subscription is taken before `is_playing` is checked, so a
/// "finished" notification racing the check is not missed.
pub async fn await_quiescence(speaker: &dyn Speaker, policy: TerminationPolicy) -> TerminationReason {
    tokio::time::sleep(policy.end_call_delay).await;

    let mut playback = speaker.subscribe();
    if !speaker.is_playing() {
        return TerminationReason::Quiet;
    }

    let finished = async {
        loop {
            match playback.recv().await {
                Ok(PlaybackEvent::Finished) => return TerminationReason::PlaybackFinished,
                Ok(PlaybackEvent::Started) => continue,
                Err(RecvError::Lagged(_)) => {
                    if !speaker.is_playing() {
                        return TerminationReason::PlaybackFinished;
                    }
                }
                Err(RecvError::Closed) => return TerminationReason::SpeakerGone,
            }
        }
    };

    match policy.max_playback_wait {
        Some(limit) => match tokio::time::timeout(limit, finished).await {
            Ok(reason) => reason,
            Err(_) => {
                tracing::warn!(
                    waited_ms = limit.as_millis() as u64,
                    "playback did not finish in time; ending call anyway"
                );
                TerminationReason::FallbackElapsed
            }
        },
        None => finished.await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::Instant;

    use super::*;
    use crate::speaker::NullSpeaker;
    use crate::test_support::ManualSpeaker;

    #[tokio::test(start_paused = true)]
    async fn quiet_speaker_stops_after_delay() {
        let start = Instant::now();
        let reason = await_quiescence(&NullSpeaker::new(), TerminationPolicy::default()).await;
        assert_eq!(reason, TerminationReason::Quiet);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_playback_to_finish() {
        let speaker = Arc::new(ManualSpeaker::new());
        speaker.start_playing();

        let waiter = {
            let speaker = speaker.clone();
            tokio::spawn(async move {
                await_quiescence(speaker.as_ref(), TerminationPolicy::default()).await
            })
        };

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(!waiter.is_finished());
        speaker.finish_playing();

        assert_eq!(
            waiter.await.expect("task"),
            TerminationReason::PlaybackFinished
        );
    }

    #[tokio::test(start_paused = true)]
    async fn playback_that_never_ends_hits_the_fallback() {
        let speaker = ManualSpeaker::new();
        speaker.start_playing();
        let start = Instant::now();

        let reason = await_quiescence(&speaker, TerminationPolicy::default()).await;
        assert_eq!(reason, TerminationReason::FallbackElapsed);
        assert_eq!(start.elapsed(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn playback_finishing_during_delay_counts_as_quiet() {
        let speaker = Arc::new(ManualSpeaker::new());
        speaker.start_playing();

        let waiter = {
            let speaker = speaker.clone();
            tokio::spawn(async move {
                await_quiescence(speaker.as_ref(), TerminationPolicy::default()).await
            })
        };
        tokio::time::sleep(Duration::from_secs(2)).await;
        speaker.finish_playing();

        assert_eq!(waiter.await.expect("task"), TerminationReason::Quiet);
    }
}
