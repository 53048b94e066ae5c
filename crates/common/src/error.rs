//! Error types shared across Flipbook crates.

/// Top-level error type for Flipbook operations.
///
/// Absence is not an error here: a missing blob is `None`, an
/// unresolvable resolution is `None`, and a cancelled path prompt is a
/// normal export outcome.
#[derive(Debug, thiserror::Error)]
pub enum FlipbookError {
    #[error("Blob store write failed: {message}")]
    StoreWriteFailed { message: String },

    #[error("Blob store read failed: {message}")]
    StoreReadFailed { message: String },

    #[error("Frame {id} is referenced by the scene but has no stored record")]
    FrameMissing { id: u64 },

    #[error("Frame conversion failed: {message}")]
    Conversion { message: String },

    #[error("Encoder request failed: {message}")]
    EncoderRequestFailed { message: String },

    #[error("Encoder did not finish within {secs}s")]
    EncoderTimedOut { secs: u64 },

    #[error("Invalid export configuration: {message}")]
    InvalidConfig { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FlipbookError.
pub type FlipbookResult<T> = Result<T, FlipbookError>;

impl FlipbookError {
    pub fn store_write(msg: impl Into<String>) -> Self {
        Self::StoreWriteFailed {
            message: msg.into(),
        }
    }

    pub fn store_read(msg: impl Into<String>) -> Self {
        Self::StoreReadFailed {
            message: msg.into(),
        }
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion {
            message: msg.into(),
        }
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::EncoderRequestFailed {
            message: msg.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: msg.into(),
        }
    }
}
