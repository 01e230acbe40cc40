use crate::error::{Result, VoxgateError};

/// Trait for audio input devices.
///
/// This trait allows swapping implementations (real microphone vs mock).
/// One started source represents one open device stream; the energy
/// sampler and the recording session both consume the frames it yields,
/// so a second parallel handle is never opened.
pub trait AudioSource: Send + Sync {
    /// Start capturing audio from the source.
    ///
    /// # Returns
    /// Ok(()) if the source started successfully, or an error
    fn start(&mut self) -> Result<()>;

    /// Stop capturing and release the underlying device.
    ///
    /// After this returns the hardware in-use indicator must be off.
    fn stop(&mut self) -> Result<()>;

    /// Read the audio samples that arrived since the last read.
    ///
    /// # Returns
    /// 16-bit PCM samples; may be empty if no new audio arrived
    fn read_samples(&mut self) -> Result<Vec<i16>>;
}

/// Mock audio source for testing.
///
/// Yields a scripted sequence of frames, one per `read_samples` call;
/// turn-taking tests need loudness that changes over time, not a single
/// repeated buffer. Once the script runs out it returns silence.
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    frames: Vec<Vec<i16>>,
    position: usize,
    should_fail_start: bool,
    start_error_is_permission: bool,
    should_fail_read: bool,
    error_message: String,
}

impl MockAudioSource {
    /// Create a new mock audio source with default settings
    pub fn new() -> Self {
        Self {
            is_started: false,
            frames: vec![vec![0i16; 160]],
            position: 0,
            should_fail_start: false,
            start_error_is_permission: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
        }
    }

    /// Configure the scripted frames, one per read.
    pub fn with_frames(mut self, frames: Vec<Vec<i16>>) -> Self {
        self.frames = frames;
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the start failure to be a permission denial
    pub fn with_permission_denied(mut self) -> Self {
        self.should_fail_start = true;
        self.start_error_is_permission = true;
        self
    }

    /// Configure the mock to fail on read
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Check if the audio source is started
    pub fn is_started(&self) -> bool {
        self.is_started
    }

    /// Number of frames handed out so far.
    pub fn frames_read(&self) -> usize {
        self.position
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            if self.start_error_is_permission {
                Err(VoxgateError::PermissionDenied {
                    message: self.error_message.clone(),
                })
            } else {
                Err(VoxgateError::AudioUnavailable {
                    message: self.error_message.clone(),
                })
            }
        } else {
            self.is_started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.should_fail_read {
            return Err(VoxgateError::AudioCapture {
                message: self.error_message.clone(),
            });
        }
        let frame = self
            .frames
            .get(self.position)
            .cloned()
            .unwrap_or_else(|| vec![0i16; 160]);
        self.position += 1;
        Ok(frame)
    }
}
