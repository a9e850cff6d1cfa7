use formcall_core::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Idle,
    Starting,
    Connected,
    Stopped,
    Errored(ErrorCode),
}

/// What is happening on a connected call. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activity {
    #[default]
    Listening,
    UserSpeaking,
    Processing,
    AssistantSpeaking,
}

/// Call lifecycle without any I/O. Every transition returns whether it
/// applied; the controller performs the side effects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallMachine {
    phase: ConnectionPhase,
    activity: Activity,
    paused: bool,
    mic_muted: bool,
}

impl CallMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_mic_muted(&self) -> bool {
        self.mic_muted
    }

    pub fn is_starting(&self) -> bool {
        self.phase == ConnectionPhase::Starting
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    /// Starting or connected: the call holds a transport.
    pub fn is_live(&self) -> bool {
        matches!(
            self.phase,
            ConnectionPhase::Starting | ConnectionPhase::Connected
        )
    }

    pub fn error(&self) -> Option<ErrorCode> {
        match self.phase {
            ConnectionPhase::Errored(code) => Some(code),
            _ => None,
        }
    }

    /// Begin a fresh call. Ignored while starting or connected.
    pub fn start(&mut self) -> bool {
        if self.is_live() {
            return false;
        }
        *self = Self {
            phase: ConnectionPhase::Starting,
            ..Self::default()
        };
        true
    }

    pub fn ready(&mut self) -> bool {
        if self.phase != ConnectionPhase::Starting {
            return false;
        }
        self.phase = ConnectionPhase::Connected;
        self.activity = Activity::Listening;
        true
    }

    /// Only a live call can fail; a late error after stop is dropped.
    pub fn fail(&mut self, code: ErrorCode) -> bool {
        if !self.is_live() {
            return false;
        }
        self.phase = ConnectionPhase::Errored(code);
        self.paused = false;
        self.mic_muted = false;
        true
    }

    /// Always ends in `Stopped`. Returns whether a live call was ended.
    pub fn stop(&mut self) -> bool {
        let was_live = self.is_live();
        self.phase = ConnectionPhase::Stopped;
        self.paused = false;
        self.mic_muted = false;
        was_live
    }

    pub fn pause(&mut self) -> bool {
        if !self.is_connected() || self.paused {
            return false;
        }
        self.paused = true;
        true
    }

    /// Activity is frozen while paused, so resuming restores it.
    pub fn resume(&mut self) -> bool {
        if !self.is_connected() || !self.paused {
            return false;
        }
        self.paused = false;
        true
    }

    pub fn mute(&mut self) -> bool {
        if !self.is_connected() || self.mic_muted {
            return false;
        }
        self.mic_muted = true;
        true
    }

    pub fn unmute(&mut self) -> bool {
        if !self.is_connected() || !self.mic_muted {
            return false;
        }
        self.mic_muted = false;
        true
    }

    pub fn set_activity(&mut self, activity: Activity) -> bool {
        if !self.is_connected() || self.paused || self.activity == activity {
            return false;
        }
        self.activity = activity;
        true
    }

    /// One-line summary for a status bar.
    pub fn status_message(&self) -> String {
        match self.phase {
            ConnectionPhase::Errored(code) => format!("Error: {}", code.user_message()),
            ConnectionPhase::Starting => "Starting call...".to_string(),
            ConnectionPhase::Connected if self.paused => "Call paused".to_string(),
            ConnectionPhase::Connected => match self.activity {
                Activity::UserSpeaking => "You are speaking...".to_string(),
                Activity::Listening => "Listening for your voice".to_string(),
                Activity::Processing => "Processing your message".to_string(),
                Activity::AssistantSpeaking => "Assistant is speaking".to_string(),
            },
            ConnectionPhase::Idle | ConnectionPhase::Stopped => {
                "Ready to start voice conversation".to_string()
            }
        }
    }
}
