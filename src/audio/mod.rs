//! Audio capture, loudness sampling, and voice activity detection.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod recorder;
pub mod sampler;
pub mod session;
pub mod vad;
