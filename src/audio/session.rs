//! Recording session: owns the chunk buffer for one voice turn.
//!
//! Started and stopped by VAD transitions. Chunks accumulate in arrival
//! order between `begin` and `finish`; `finish` concatenates them into a
//! single in-memory WAV clip exactly once and clears the buffer.

use crate::defaults;
use crate::error::{Result, VoxgateError};
use std::io::Cursor;

/// A finalized voice clip, ready for verification upload.
#[derive(Debug, Clone)]
pub struct RecordedClip {
    /// 16-bit mono WAV bytes.
    pub wav: Vec<u8>,
    /// Total PCM samples in the clip.
    pub samples: usize,
    /// Clip duration derived from the sample count.
    pub duration_ms: u64,
}

/// Accumulates audio chunks for a single recording turn.
pub struct RecordingSession {
    sample_rate: u32,
    chunks: Vec<Vec<i16>>,
    recording: bool,
}

impl RecordingSession {
    /// Creates an inactive session for the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            chunks: Vec::new(),
            recording: false,
        }
    }

    /// Returns true while a recording is in progress.
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Begin accumulating chunks.
    ///
    /// Re-entrant calls are a no-op with a logged warning, never a
    /// second parallel capture. Returns false when ignored.
    pub fn begin(&mut self) -> bool {
        if self.recording {
            eprintln!("voxgate: begin ignored, recording already in progress");
            return false;
        }
        self.recording = true;
        self.chunks.clear();
        true
    }

    /// Append one chunk in arrival order. Ignored unless recording;
    /// empty chunks are dropped (frame ticks with no new audio).
    pub fn push_chunk(&mut self, chunk: &[i16]) {
        if self.recording && !chunk.is_empty() {
            self.chunks.push(chunk.to_vec());
        }
    }

    /// Stop and finalize into a single WAV clip.
    ///
    /// # Errors
    /// `EmptyRecording` if no chunks were captured; callers must not
    /// send an empty clip to verification.
    pub fn finish(&mut self) -> Result<RecordedClip> {
        self.recording = false;
        let chunks = std::mem::take(&mut self.chunks);

        let samples: usize = chunks.iter().map(Vec::len).sum();
        if samples == 0 {
            return Err(VoxgateError::EmptyRecording);
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| VoxgateError::AudioCapture {
                message: format!("Failed to create WAV writer: {}", e),
            })?;
        for chunk in &chunks {
            for &sample in chunk {
                writer
                    .write_sample(sample)
                    .map_err(|e| VoxgateError::AudioCapture {
                        message: format!("Failed to encode WAV sample: {}", e),
                    })?;
            }
        }
        writer.finalize().map_err(|e| VoxgateError::AudioCapture {
            message: format!("Failed to finalize WAV clip: {}", e),
        })?;

        let duration_ms = samples as u64 * 1000 / self.sample_rate as u64;
        Ok(RecordedClip {
            wav: cursor.into_inner(),
            samples,
            duration_ms,
        })
    }

    /// Discard the buffer without finalizing (teardown path).
    pub fn abort(&mut self) {
        self.recording = false;
        self.chunks.clear();
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new(defaults::SAMPLE_RATE)
    }
}
