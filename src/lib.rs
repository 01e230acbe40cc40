//! voxgate - voice turn-taking with remote speaker verification
//!
//! Joins a real-time agent room, detects speech turns from microphone
//! energy, and gates the conversation on server-side speaker
//! verification.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod auth;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod room;
pub mod turn;
pub mod verify;

// Core traits (device → turn loop → backend)
pub use audio::recorder::AudioSource;
pub use audio::sampler::{Clock, EnergySampler, Frame, LoudnessSample, SystemClock};
pub use audio::session::{RecordedClip, RecordingSession};
pub use audio::vad::{EndReason, TurnVad, VadConfig, VadState, VadTransition};
pub use auth::AccessTokenProvider;
pub use room::{RoomEvent, RoomTransport};
pub use verify::{Decision, JoinTokenIssuer, VerificationOutcome, VoiceVerifier};

// Turn coordination
pub use turn::{AgentCommand, CoordinatorConfig, TurnCoordinator, TurnEvent, TurnPhase};

// Error handling
pub use error::{Result, VoxgateError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
