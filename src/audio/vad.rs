//! Voice activity detection for turn-taking.
//!
//! A three-state machine over loudness samples that decides when a
//! recording begins and ends. Start and stop use different thresholds
//! (hysteresis) so loudness hovering at a single boundary cannot chatter
//! the recorder; a recording ends after continuous silence or at a hard
//! duration ceiling. Pure decision logic with no I/O and no clock reads,
//! which keeps it unit-testable without a microphone.

use crate::audio::sampler::LoudnessSample;
use crate::config::VadTuning;
use crate::defaults;
use std::time::{Duration, Instant};

/// Configuration for the turn VAD.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// RMS above this starts a recording (0.0 to 1.0).
    pub start_threshold: f32,
    /// RMS below this counts as silence; strictly less than
    /// `start_threshold` to form the hysteresis band.
    pub stop_threshold: f32,
    /// Continuous silence that ends a recording (milliseconds).
    pub silence_hold_ms: u32,
    /// Hard ceiling on recording duration (milliseconds).
    pub max_record_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            start_threshold: defaults::START_THRESHOLD,
            stop_threshold: defaults::STOP_THRESHOLD,
            silence_hold_ms: defaults::SILENCE_HOLD_MS,
            max_record_ms: defaults::MAX_RECORD_MS,
        }
    }
}

impl From<VadTuning> for VadConfig {
    fn from(tuning: VadTuning) -> Self {
        Self {
            start_threshold: tuning.start_threshold,
            stop_threshold: tuning.stop_threshold,
            silence_hold_ms: tuning.silence_hold_ms,
            max_record_ms: tuning.max_record_ms,
        }
    }
}

/// Current state of the turn VAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// Not listening; samples are ignored.
    Idle,
    /// Listening for speech, not yet recording.
    ArmedListening,
    /// Actively recording.
    Recording,
}

/// Why a recording ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Continuous silence reached the hold duration.
    Silence,
    /// The duration ceiling was hit.
    MaxDuration,
    /// A remote stop command overrode local detection.
    RemoteStop,
}

/// Transition events emitted by the VAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTransition {
    /// Loudness crossed the start threshold; begin capturing.
    BeginRecording,
    /// The recording is over; finalize the capture.
    EndRecording(EndReason),
}

/// Turn VAD state machine.
pub struct TurnVad {
    config: VadConfig,
    state: VadState,
    /// Instant loudness was last known above the stop threshold; silence
    /// is measured from here so coarse sampling doesn't under-count it.
    silence_since: Option<Instant>,
    record_start: Option<Instant>,
    last_sample_at: Option<Instant>,
}

impl TurnVad {
    /// Creates a new VAD in `Idle` with the given configuration.
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: VadState::Idle,
            silence_since: None,
            record_start: None,
            last_sample_at: None,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> VadState {
        self.state
    }

    /// Arms listening. No-op unless `Idle`: an in-flight recording is
    /// never restarted by a stale arm.
    pub fn arm(&mut self) {
        if self.state == VadState::Idle {
            self.state = VadState::ArmedListening;
            self.silence_since = None;
            self.last_sample_at = None;
        }
    }

    /// Resets to `Idle`, clearing all timers.
    pub fn reset(&mut self) {
        self.state = VadState::Idle;
        self.silence_since = None;
        self.record_start = None;
        self.last_sample_at = None;
    }

    /// Forces the end of an in-flight recording, regardless of loudness.
    ///
    /// Remote override: returns `EndRecording(RemoteStop)` when
    /// `Recording`, otherwise `None` and no state change beyond
    /// disarming is performed by the caller.
    pub fn force_stop(&mut self) -> Option<VadTransition> {
        if self.state == VadState::Recording {
            Some(self.end(EndReason::RemoteStop))
        } else {
            None
        }
    }

    /// Consumes one loudness sample and returns the transition it
    /// triggers, if any.
    pub fn observe(&mut self, sample: LoudnessSample) -> Option<VadTransition> {
        let transition = match self.state {
            VadState::Idle => None,
            VadState::ArmedListening => {
                if sample.rms > self.config.start_threshold {
                    self.state = VadState::Recording;
                    self.record_start = Some(sample.at);
                    self.silence_since = None;
                    Some(VadTransition::BeginRecording)
                } else {
                    None
                }
            }
            VadState::Recording => self.observe_recording(sample),
        };

        self.last_sample_at = Some(sample.at);
        transition
    }

    fn observe_recording(&mut self, sample: LoudnessSample) -> Option<VadTransition> {
        // Ceiling wins over silence accounting: a stuck-open mic must
        // not record unboundedly.
        if let Some(started) = self.record_start
            && sample.at.duration_since(started)
                >= Duration::from_millis(self.config.max_record_ms as u64)
        {
            return Some(self.end(EndReason::MaxDuration));
        }

        if sample.rms < self.config.stop_threshold {
            // Silence started no later than the previous sample, which
            // was the last time loudness was known above the threshold.
            let since = match self.silence_since {
                Some(since) => since,
                None => {
                    let since = self
                        .last_sample_at
                        .or(self.record_start)
                        .unwrap_or(sample.at);
                    self.silence_since = Some(since);
                    since
                }
            };
            if sample.at.duration_since(since)
                >= Duration::from_millis(self.config.silence_hold_ms as u64)
            {
                return Some(self.end(EndReason::Silence));
            }
        } else {
            // Any loudness above the stop threshold restarts the hold:
            // silence must be continuous, not cumulative.
            self.silence_since = None;
        }

        None
    }

    fn end(&mut self, reason: EndReason) -> VadTransition {
        self.state = VadState::ArmedListening;
        self.silence_since = None;
        self.record_start = None;
        VadTransition::EndRecording(reason)
    }
}
