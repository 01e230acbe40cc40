//! Turn phases: the single source of truth for what the UI renders.

/// Phase of the voice session.
///
/// Owned by the coordinator; transitions are driven only by room events,
/// VAD transitions, and verification responses. At most one phase is
/// active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    /// No room connection.
    #[default]
    Idle,
    /// Join in flight.
    Connecting,
    /// Armed and waiting for the user to speak.
    Listening,
    /// Capturing the user's voice.
    Recording,
    /// Waiting on the verification backend.
    Verifying,
    /// Connected, between turns.
    Chatting,
}

impl TurnPhase {
    /// True once the room join completed and until teardown.
    pub fn is_connected(&self) -> bool {
        !matches!(self, TurnPhase::Idle | TurnPhase::Connecting)
    }
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Connecting => "connecting",
            TurnPhase::Listening => "listening",
            TurnPhase::Recording => "recording",
            TurnPhase::Verifying => "verifying",
            TurnPhase::Chatting => "chatting",
        };
        f.write_str(name)
    }
}
