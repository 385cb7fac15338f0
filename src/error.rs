use thiserror::Error;

/// Main player error type
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),
}

impl PlayerError {
    /// Get user-friendly error message with suggested solutions
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::Audio(err) => err.user_message(),
            PlayerError::Decode(err) => err.user_message(),
            PlayerError::Session(err) => err.user_message(),
            PlayerError::Config(err) => err.user_message(),
            PlayerError::File(err) => Self::format_file_error(err),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PlayerError::Audio(err) => err.recovery_suggestions(),
            PlayerError::Decode(err) => err.recovery_suggestions(),
            PlayerError::Session(err) => err.recovery_suggestions(),
            PlayerError::Config(err) => err.recovery_suggestions(),
            PlayerError::File(_) => vec![
                "Check that the file path is correct".to_string(),
                "Check file permissions".to_string(),
            ],
        }
    }

    /// Check if the caller can retry the operation that produced this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::Audio(err) => err.is_recoverable(),
            PlayerError::Decode(err) => err.is_recoverable(),
            PlayerError::Session(err) => err.is_recoverable(),
            PlayerError::Config(err) => err.is_recoverable(),
            PlayerError::File(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlayerError::Audio(AudioError::BufferUnderrun) => ErrorSeverity::Warning,
            PlayerError::Audio(AudioError::AllocationFailed(_)) => ErrorSeverity::Critical,
            PlayerError::Audio(_) => ErrorSeverity::Error,
            PlayerError::Decode(DecodeError::CorruptedFrame(_)) => ErrorSeverity::Warning,
            PlayerError::Decode(_) => ErrorSeverity::Error,
            // Late data from a superseded session is a benign race
            PlayerError::Session(SessionError::SessionMismatch { .. }) => ErrorSeverity::Info,
            PlayerError::Session(SessionError::WriteAborted { .. }) => ErrorSeverity::Info,
            PlayerError::Session(_) => ErrorSeverity::Warning,
            PlayerError::Config(_) => ErrorSeverity::Warning,
            PlayerError::File(_) => ErrorSeverity::Error,
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File or directory not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied - cannot access file".to_string(),
            std::io::ErrorKind::UnexpectedEof => "File appears to be truncated".to_string(),
            _ => format!("File system error: {}", err),
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Audio output and resource errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    #[error("Audio initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Buffer underrun")]
    BufferUnderrun,

    #[error("Transition queue full")]
    TransitionQueueFull,
}

impl AudioError {
    pub fn user_message(&self) -> String {
        match self {
            AudioError::AllocationFailed(what) => {
                format!("Not enough memory to allocate the {}", what)
            }
            AudioError::InitializationFailed(msg) => {
                format!("Failed to initialize the audio player: {}", msg)
            }
            AudioError::DeviceNotFound { device } => {
                format!("Audio device '{}' is not available or has been disconnected", device)
            }
            AudioError::StreamError(msg) => {
                format!("Audio playback interrupted: {}", msg)
            }
            AudioError::BufferUnderrun => {
                "Audio output ran dry - playback may stutter".to_string()
            }
            AudioError::TransitionQueueFull => {
                "The player is busy processing earlier requests".to_string()
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            AudioError::AllocationFailed(_) => vec![
                "Reduce ring_buffer_capacity in the configuration".to_string(),
                "Close other applications to free memory".to_string(),
            ],
            AudioError::InitializationFailed(_) => vec![
                "Restart the application".to_string(),
                "Check the player configuration with 'vsplay config show'".to_string(),
            ],
            AudioError::DeviceNotFound { .. } => vec![
                "Check that your audio device is connected and powered on".to_string(),
                "Omit --device to use the default output device".to_string(),
            ],
            AudioError::StreamError(_) => vec![
                "Check audio device connections".to_string(),
                "Restart playback".to_string(),
            ],
            AudioError::BufferUnderrun => vec![
                "This is usually temporary - playback should recover automatically".to_string(),
                "Increase max_output_latency_ms in the configuration".to_string(),
            ],
            AudioError::TransitionQueueFull => vec![
                "Retry the request after a short delay".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            AudioError::AllocationFailed(_) => false,
            AudioError::InitializationFailed(_) => true,
            AudioError::DeviceNotFound { .. } => true,
            AudioError::StreamError(_) => true,
            AudioError::BufferUnderrun => true,
            AudioError::TransitionQueueFull => true,
        }
    }
}

/// Audio decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Corrupted frame: {0}")]
    CorruptedFrame(String),
}

impl DecodeError {
    pub fn user_message(&self) -> String {
        match self {
            DecodeError::DecoderInit(msg) => {
                format!("The audio decoder could not be started: {}", msg)
            }
            DecodeError::DecodeFailed(msg) => {
                format!("Failed to decode audio data: {}", msg)
            }
            DecodeError::UnsupportedFormat { format } => {
                format!("Audio format '{}' is not supported by this player", format)
            }
            DecodeError::CorruptedFrame(msg) => {
                format!("The audio stream contains a damaged frame: {}", msg)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            DecodeError::DecoderInit(_) => vec![
                "Start the session again".to_string(),
                "Check available memory".to_string(),
            ],
            DecodeError::DecodeFailed(_) => vec![
                "Check that the stream is MPEG audio (MP3)".to_string(),
                "Start a new session".to_string(),
            ],
            DecodeError::UnsupportedFormat { .. } => vec![
                "Supported format: MPEG-1/2/2.5 Layer III (MP3)".to_string(),
                "Convert the stream to MP3 before sending it".to_string(),
            ],
            DecodeError::CorruptedFrame(_) => vec![
                "The damaged frame is skipped - no action is needed".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            DecodeError::DecoderInit(_) => true, // start() can be retried
            DecodeError::DecodeFailed(_) => false,
            DecodeError::UnsupportedFormat { .. } => false,
            DecodeError::CorruptedFrame(_) => true,
        }
    }
}

/// Errors raised by the caller-facing session API
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Player is not playing (state: {state})")]
    NotPlaying { state: String },

    #[error("Session mismatch: active {active:?}, requested {requested:?}")]
    SessionMismatch {
        active: Option<String>,
        requested: Option<String>,
    },

    #[error("Player did not start within {waited_ms}ms")]
    StartTimeout { waited_ms: u64 },

    #[error("Write aborted after {written} of {total} bytes")]
    WriteAborted { written: usize, total: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::NotPlaying { .. } => {
                "Audio data was sent while no playback session is active".to_string()
            }
            SessionError::SessionMismatch { requested, .. } => {
                format!(
                    "Audio data for session '{}' was ignored because a different session is playing",
                    requested.as_deref().unwrap_or("<none>")
                )
            }
            SessionError::StartTimeout { waited_ms } => {
                format!("Playback did not start within {}ms", waited_ms)
            }
            SessionError::WriteAborted { written, total } => {
                format!("Playback was stopped while sending audio ({} of {} bytes accepted)", written, total)
            }
            SessionError::InvalidArgument(msg) => {
                format!("Invalid request: {}", msg)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            SessionError::NotPlaying { .. } => vec![
                "Call start() before writing audio data".to_string(),
            ],
            SessionError::SessionMismatch { .. } => vec![
                "Drop data that belongs to a finished session".to_string(),
                "Pass the same session id to start() and write()".to_string(),
            ],
            SessionError::StartTimeout { .. } => vec![
                "Call stop() and start the session again".to_string(),
                "Increase start_timeout_ms in the configuration".to_string(),
            ],
            SessionError::WriteAborted { .. } => vec![
                "Start a new session to continue playback".to_string(),
            ],
            SessionError::InvalidArgument(_) => vec![
                "Check the request parameters".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            SessionError::NotPlaying { .. } => true,
            SessionError::SessionMismatch { .. } => true,
            SessionError::StartTimeout { .. } => true,
            SessionError::WriteAborted { .. } => true,
            SessionError::InvalidArgument(_) => false,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
            ConfigError::Invalid { field, reason } => {
                format!("Configuration value '{}' is invalid: {}", field, reason)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Check that you have write permissions to your home directory".to_string(),
                "Try creating the directory manually: ~/.config/voice-stream-player/".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::SerializationError(_) => vec![
                "Try resetting configuration to defaults".to_string(),
            ],
            ConfigError::DeserializationError(_) => vec![
                "Delete the configuration file to reset to defaults".to_string(),
                "Check the configuration file format manually".to_string(),
            ],
            ConfigError::Invalid { field, .. } => vec![
                format!("Fix '{}' in the configuration file", field),
                "Run 'vsplay config reset' to restore defaults".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            ConfigError::ConfigDirNotFound => true, // Can use defaults
            ConfigError::IoError(_) => true,
            ConfigError::SerializationError(_) => true,
            ConfigError::DeserializationError(_) => true,
            ConfigError::Invalid { .. } => false,
        }
    }
}
