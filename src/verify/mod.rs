//! Speaker verification seam.
//!
//! Scoring happens server-side; the core submits a finalized clip with
//! the user's bearer token and gets a decision back. The trait allows
//! swapping the HTTP client for a mock in turn tests.

pub mod client;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Verification decision from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    /// The speaker matched the enrolled voice.
    Verified,
    /// Inconclusive; the agent should ask the user to repeat.
    Repeat,
    /// The speaker did not match.
    Denied,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Verified => "VERIFIED",
            Decision::Repeat => "REPEAT",
            Decision::Denied => "DENIED",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one completed verification round-trip.
///
/// Created once per turn, published to the remote peer, handed to the
/// UI layer, and not retained by the core.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationOutcome {
    pub decision: Decision,
    pub score: Option<f32>,
    pub reason: Option<String>,
}

/// Submits voice clips for speaker verification.
#[async_trait]
pub trait VoiceVerifier: Send + Sync {
    /// Verify a WAV clip against the authenticated user's enrollment.
    ///
    /// Callers must never pass an empty clip.
    async fn verify(&self, wav: &[u8], access_token: &str) -> Result<VerificationOutcome>;
}

/// Issues join tokens for the real-time room.
#[async_trait]
pub trait JoinTokenIssuer: Send + Sync {
    async fn join_token(&self, access_token: &str) -> Result<String>;
}

/// A verification call recorded by [`MockVerifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyCall {
    pub wav_len: usize,
    pub access_token: String,
}

/// Scripted verifier for tests.
#[derive(Clone)]
pub struct MockVerifier {
    outcome: VerificationOutcome,
    fail_message: Option<String>,
    calls: Arc<Mutex<Vec<VerifyCall>>>,
}

impl MockVerifier {
    pub fn verified(score: f32) -> Self {
        Self::with_outcome(VerificationOutcome {
            decision: Decision::Verified,
            score: Some(score),
            reason: None,
        })
    }

    pub fn denied(score: f32, reason: &str) -> Self {
        Self::with_outcome(VerificationOutcome {
            decision: Decision::Denied,
            score: Some(score),
            reason: Some(reason.to_string()),
        })
    }

    pub fn with_outcome(outcome: VerificationOutcome) -> Self {
        Self {
            outcome,
            fail_message: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail every request with the given message.
    pub fn failing(message: &str) -> Self {
        Self {
            outcome: VerificationOutcome {
                decision: Decision::Denied,
                score: None,
                reason: None,
            },
            fail_message: Some(message.to_string()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<VerifyCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VoiceVerifier for MockVerifier {
    async fn verify(&self, wav: &[u8], access_token: &str) -> Result<VerificationOutcome> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(VerifyCall {
                wav_len: wav.len(),
                access_token: access_token.to_string(),
            });
        }
        match &self.fail_message {
            Some(message) => Err(crate::error::VoxgateError::VerificationRequestFailed {
                message: message.clone(),
            }),
            None => Ok(self.outcome.clone()),
        }
    }
}

/// Scripted token issuer for tests.
#[derive(Debug, Clone)]
pub struct MockIssuer {
    token: Option<String>,
}

impl MockIssuer {
    pub fn new(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl JoinTokenIssuer for MockIssuer {
    async fn join_token(&self, _access_token: &str) -> Result<String> {
        self.token
            .clone()
            .ok_or(crate::error::VoxgateError::TokenRequestFailed {
                message: "mock issuer failure".to_string(),
            })
    }
}
