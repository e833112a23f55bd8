//! Error types for reelplay
//!
//! Construction failures (`UnsupportedFormat`, `UnsupportedCodec`) are fatal
//! and returned to the caller. Per-sample failures (`SampleRead`, `Decode`)
//! are recovered inside the decode worker by skipping the sample.

use thiserror::Error;

/// Main error type for reelplay
#[derive(Error, Debug)]
pub enum PlayerError {
    /// The container could not be opened or holds no playable video track
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The video track uses a codec no decoder is available for
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Reading a coded sample from the container failed
    #[error("Failed to read sample {index}: {reason}")]
    SampleRead { index: u64, reason: String },

    /// Decoding a single sample failed
    #[error("Failed to decode sample {index}: {reason}")]
    Decode { index: u64, reason: String },

    /// GPU resource or upload errors
    #[error("GPU error: {0}")]
    Gpu(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for PlayerError {
    fn from(err: ffmpeg_next::Error) -> Self {
        PlayerError::UnsupportedFormat(format!("FFmpeg error: {}", err))
    }
}

impl PlayerError {
    /// Whether playback can continue past this error by skipping a sample
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlayerError::SampleRead { .. } | PlayerError::Decode { .. })
    }

    /// Create a decode error for the given sample
    pub fn decode<S: Into<String>>(index: u64, reason: S) -> Self {
        PlayerError::Decode {
            index,
            reason: reason.into(),
        }
    }

    /// Create a sample read error for the given sample
    pub fn sample_read<S: Into<String>>(index: u64, reason: S) -> Self {
        PlayerError::SampleRead {
            index,
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results in reelplay
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Extension trait for converting other errors to PlayerError
pub trait IntoPlayerError<T> {
    /// Convert this error into a PlayerError with the given context
    fn format_err(self, context: &str) -> Result<T>;
    fn codec_err(self, context: &str) -> Result<T>;
    fn gpu_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlayerError<T> for std::result::Result<T, E> {
    fn format_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::UnsupportedFormat(format!("{}: {}", context, e)))
    }

    fn codec_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::UnsupportedCodec(format!("{}: {}", context, e)))
    }

    fn gpu_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Gpu(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Config(format!("{}: {}", context, e)))
    }
}

/// Helper macro for creating internal errors with file and line information
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::utils::error::PlayerError::Internal(
            format!("{} at {}:{}", $msg, file!(), line!())
        )
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::utils::error::PlayerError::Internal(
            format!("{} at {}:{}", format!($fmt, $($arg)*), file!(), line!())
        )
    };
}
