//! Error types for the audio player module

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the audio player
#[derive(Debug, Error)]
pub enum AudioPlayerError {
    /// IO errors from file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Decoding-specific errors without a more specific variant
    #[error("Decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid tick/ms/sample timing arguments
    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    /// HTTP server errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Passage lookup failed
    #[error("Passage not found: {0}")]
    PassageNotFound(String),

    /// Playback state/queue errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// Odd sample count passed to a stereo-frame operation
    #[error("Invalid sample count: {0} (expected an even number of interleaved stereo samples)")]
    InvalidSampleCount(usize),

    /// Failed to open or read an audio file
    #[error("Failed to read file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Decoder thread panicked while decoding a file
    #[error("Decoder panicked on {path}: {message}")]
    DecoderPanic { path: PathBuf, message: String },

    /// Codec is not supported
    #[error("Unsupported codec '{codec}' for {path}")]
    UnsupportedCodec { path: PathBuf, codec: String },

    /// Resampler could not be initialized for a rate pair
    #[error("Failed to initialize resampler {source_rate}Hz -> {target_rate}Hz: {message}")]
    ResamplingInitFailed {
        source_rate: u32,
        target_rate: u32,
        message: String,
    },

    /// Resampler failed mid-stream
    #[error("Resampling failed at position {position_ms}ms: {message}")]
    ResamplingRuntimeError { position_ms: u64, message: String },

    /// Too many open file handles to continue decoding
    #[error("File handle exhaustion attempting to open {path}")]
    FileHandleExhaustion { path: PathBuf },

    /// Decoded position has drifted from the expected tick-accurate position
    #[error(
        "Position drift: expected {expected_frames} frames, got {actual_frames} \
         (drift {drift_frames} frames / {drift_ms}ms)"
    )]
    PositionDrift {
        expected_frames: u64,
        actual_frames: u64,
        drift_frames: i64,
        drift_ms: i64,
    },

    /// Generic errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Alias used at collaborator boundaries (db, playback) that predate the
/// full `AudioPlayerError` enum name.
pub use AudioPlayerError as Error;

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, AudioPlayerError>;

/// Error recovery strategies
#[derive(Debug, Clone, Copy)]
pub enum RecoveryStrategy {
    /// Retry the operation
    Retry {
        /// Maximum number of retry attempts
        max_attempts: u32,
        /// Delay between retries in milliseconds
        delay_ms: u64,
    },

    /// Skip the current item and continue
    Skip,

    /// Log the error and continue
    LogAndContinue,

    /// Fatal error - stop execution
    Fatal,
}

impl AudioPlayerError {
    /// Get the recommended recovery strategy for this error
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            // IO errors might be transient
            AudioPlayerError::Io(_) => RecoveryStrategy::Retry {
                max_attempts: 3,
                delay_ms: 1000,
            },

            // Database errors might be transient
            AudioPlayerError::Database(_) => RecoveryStrategy::Retry {
                max_attempts: 2,
                delay_ms: 500,
            },

            // Decode errors are usually permanent for a file
            AudioPlayerError::FileReadError { .. } => RecoveryStrategy::Skip,
            AudioPlayerError::UnsupportedCodec { .. } => RecoveryStrategy::Skip,
            AudioPlayerError::DecoderPanic { .. } => RecoveryStrategy::Skip,
            AudioPlayerError::Decode(_) => RecoveryStrategy::Skip,

            // File handle exhaustion might clear up once other handles close
            AudioPlayerError::FileHandleExhaustion { .. } => RecoveryStrategy::Retry {
                max_attempts: 5,
                delay_ms: 200,
            },

            // Resampler init failures are permanent for the passage
            AudioPlayerError::ResamplingInitFailed { .. } => RecoveryStrategy::Skip,
            AudioPlayerError::ResamplingRuntimeError { .. } => RecoveryStrategy::Skip,

            // Position drift is a warning-level condition, log and carry on
            AudioPlayerError::PositionDrift { .. } => RecoveryStrategy::LogAndContinue,

            // Device errors are fatal to the current output stream
            AudioPlayerError::AudioOutput(_) => RecoveryStrategy::Fatal,

            // Most other errors log and continue
            _ => RecoveryStrategy::LogAndContinue,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AudioPlayerError::UnsupportedCodec { codec, .. } => {
                format!("The audio format '{}' is not supported", codec)
            }
            AudioPlayerError::FileReadError { path, .. } => {
                format!("Could not read audio file: {}", path.display())
            }
            AudioPlayerError::FileHandleExhaustion { path } => {
                format!("Too many open files while opening: {}", path.display())
            }
            AudioPlayerError::AudioOutput(_) => {
                "No audio output device available".to_string()
            }
            AudioPlayerError::ResamplingInitFailed { .. } => {
                "Could not set up sample rate conversion for this track".to_string()
            }
            _ => "An error occurred during playback".to_string(),
        }
    }

    /// Get an error code for logging/debugging
    pub fn error_code(&self) -> &'static str {
        match self {
            AudioPlayerError::Io(_) => "AP_IO_001",
            AudioPlayerError::Database(_) => "AP_DB_001",
            AudioPlayerError::Decode(_) => "AP_DC_001",
            AudioPlayerError::AudioOutput(_) => "AP_PB_001",
            AudioPlayerError::Config(_) => "AP_CF_001",
            AudioPlayerError::InvalidTiming(_) => "AP_TM_001",
            AudioPlayerError::Http(_) => "AP_HT_001",
            AudioPlayerError::PassageNotFound(_) => "AP_PG_001",
            AudioPlayerError::Playback(_) => "AP_PB_002",
            AudioPlayerError::InvalidSampleCount(_) => "AP_BF_001",
            AudioPlayerError::FileReadError { .. } => "AP_DC_002",
            AudioPlayerError::DecoderPanic { .. } => "AP_DC_003",
            AudioPlayerError::UnsupportedCodec { .. } => "AP_DC_004",
            AudioPlayerError::ResamplingInitFailed { .. } => "AP_DC_005",
            AudioPlayerError::ResamplingRuntimeError { .. } => "AP_DC_006",
            AudioPlayerError::FileHandleExhaustion { .. } => "AP_DC_007",
            AudioPlayerError::PositionDrift { .. } => "AP_BF_002",
            AudioPlayerError::Other(_) => "AP_OT_001",
        }
    }
}
