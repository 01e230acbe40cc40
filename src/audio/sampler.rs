//! Energy sampler: turns a live audio source into a stream of loudness
//! samples for VAD decisions.
//!
//! One frame is pulled per scheduler tick (~60 Hz). The raw chunk rides
//! along with its loudness so the recorder consumes the same device
//! stream as the sampler: one mic, one stream, two consumers.

use crate::audio::recorder::AudioSource;
use crate::error::{Result, VoxgateError};
use std::sync::Arc;
use std::time::Instant;

/// Trait for time operations, allowing mock time in tests.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Real system clock using `std::time::Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A single loudness measurement.
///
/// Ephemeral: produced once per frame tick, consumed immediately.
#[derive(Debug, Clone, Copy)]
pub struct LoudnessSample {
    /// Normalized RMS in [0, 1].
    pub rms: f32,
    /// Monotonic timestamp of the measurement.
    pub at: Instant,
}

/// One frame pulled from the source: the loudness sample plus the raw
/// chunk it was computed from.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sample: LoudnessSample,
    pub chunk: Vec<i16>,
}

/// Pulls frames from an open audio source and stamps them with loudness.
///
/// The sampler owns the device handle for the duration of a listening
/// turn; [`EnergySampler::stop`] is the single release point.
pub struct EnergySampler {
    source: Box<dyn AudioSource>,
    clock: Arc<dyn Clock>,
}

impl EnergySampler {
    /// Start sampling from an already-permission-granted source.
    ///
    /// # Errors
    /// `PermissionDenied` passes through from the source; any other
    /// start failure surfaces as `AudioUnavailable`. Callers must not
    /// retry silently; the failure is terminal for the current turn.
    pub fn start(source: Box<dyn AudioSource>) -> Result<Self> {
        Self::start_with_clock(source, Arc::new(SystemClock))
    }

    /// Start sampling with a custom clock (for deterministic testing).
    pub fn start_with_clock(mut source: Box<dyn AudioSource>, clock: Arc<dyn Clock>) -> Result<Self> {
        source.start().map_err(|e| match e {
            VoxgateError::PermissionDenied { .. } => e,
            VoxgateError::AudioUnavailable { .. } => e,
            other => VoxgateError::AudioUnavailable {
                message: other.to_string(),
            },
        })?;
        Ok(Self { source, clock })
    }

    /// Pull the next frame and compute its loudness.
    pub fn next_frame(&mut self) -> Result<Frame> {
        let chunk = self.source.read_samples()?;
        let sample = LoudnessSample {
            rms: rms(&chunk),
            at: self.clock.now(),
        };
        Ok(Frame { sample, chunk })
    }

    /// Stop sampling and release the underlying device stream.
    pub fn stop(&mut self) -> Result<()> {
        self.source.stop()
    }
}

/// Calculates the normalized Root Mean Square of audio samples.
///
/// Each sample is normalized to [-1, 1] before squaring; the result is
/// `sqrt(mean(sample²))` over the frame window. This exact recipe is
/// what the start/stop thresholds were calibrated against; changing it
/// silently recalibrates every threshold.
///
/// Returns 0.0 for an empty frame.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}
