//! Error types for voxgate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxgateError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Microphone access denied: {message}")]
    PermissionDenied { message: String },

    #[error("Audio unavailable: {message}")]
    AudioUnavailable { message: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("No audio captured")]
    EmptyRecording,

    // Verification errors
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Verification request failed: {message}")]
    VerificationRequestFailed { message: String },

    #[error("Join token request failed: {message}")]
    TokenRequestFailed { message: String },

    // Room transport errors
    #[error("Room connection failed: {message}")]
    RoomConnection { message: String },

    #[error("Room connection lost")]
    RoomConnectionLost,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VoxgateError {
    /// Short, human-readable status line for the UI layer.
    ///
    /// Every failure surfaces as one of these rather than an exception;
    /// the phrasing is what a user sees next to the mic button.
    pub fn status_line(&self) -> String {
        match self {
            Self::PermissionDenied { .. } => "mic access denied".to_string(),
            Self::AudioUnavailable { .. } | Self::AudioDeviceNotFound { .. } => {
                "mic unavailable".to_string()
            }
            Self::AudioCapture { .. } => "audio capture failed".to_string(),
            Self::EmptyRecording => "no audio detected, try again".to_string(),
            Self::NotAuthenticated => "not signed in".to_string(),
            Self::VerificationRequestFailed { .. } => "verification failed".to_string(),
            Self::TokenRequestFailed { .. } => "could not get room token".to_string(),
            Self::RoomConnection { .. } => "connection error".to_string(),
            Self::RoomConnectionLost => "disconnected".to_string(),
            other => other.to_string(),
        }
    }

    /// True for failures that abandon the current turn but keep the room
    /// connection valid, so the user can retry without reconnecting.
    pub fn is_turn_recoverable(&self) -> bool {
        !matches!(self, Self::RoomConnectionLost | Self::RoomConnection { .. })
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxgateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_permission_denied_display() {
        let error = VoxgateError::PermissionDenied {
            message: "portal refused".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Microphone access denied: portal refused"
        );
    }

    #[test]
    fn test_audio_unavailable_display() {
        let error = VoxgateError::AudioUnavailable {
            message: "no backend".to_string(),
        };
        assert_eq!(error.to_string(), "Audio unavailable: no backend");
    }

    #[test]
    fn test_empty_recording_display() {
        assert_eq!(
            VoxgateError::EmptyRecording.to_string(),
            "No audio captured"
        );
    }

    #[test]
    fn test_verification_request_failed_display() {
        let error = VoxgateError::VerificationRequestFailed {
            message: "HTTP 503".to_string(),
        };
        assert_eq!(error.to_string(), "Verification request failed: HTTP 503");
    }

    #[test]
    fn test_room_connection_lost_display() {
        assert_eq!(
            VoxgateError::RoomConnectionLost.to_string(),
            "Room connection lost"
        );
    }

    #[test]
    fn test_status_lines_are_short_and_human() {
        let cases = [
            VoxgateError::PermissionDenied {
                message: "x".to_string(),
            },
            VoxgateError::EmptyRecording,
            VoxgateError::NotAuthenticated,
            VoxgateError::VerificationRequestFailed {
                message: "x".to_string(),
            },
            VoxgateError::RoomConnectionLost,
        ];
        for error in cases {
            let line = error.status_line();
            assert!(!line.is_empty());
            assert!(line.len() < 60, "status line too long: {}", line);
            assert!(!line.contains("Error"), "not human phrasing: {}", line);
        }
    }

    #[test]
    fn test_recoverability_split() {
        assert!(VoxgateError::EmptyRecording.is_turn_recoverable());
        assert!(
            VoxgateError::VerificationRequestFailed {
                message: "x".to_string()
            }
            .is_turn_recoverable()
        );
        assert!(
            VoxgateError::PermissionDenied {
                message: "x".to_string()
            }
            .is_turn_recoverable()
        );
        assert!(!VoxgateError::RoomConnectionLost.is_turn_recoverable());
        assert!(
            !VoxgateError::RoomConnection {
                message: "x".to_string()
            }
            .is_turn_recoverable()
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: VoxgateError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Value>(toml_str).unwrap_err();
        let error: VoxgateError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VoxgateError>();
        assert_sync::<VoxgateError>();
    }
}
