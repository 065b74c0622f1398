//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while resolving media or driving the render engine.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("Render failed: {reason}")]
    RenderFailed {
        reason: String,
        stderr: Option<String>,
    },

    #[error("FFprobe command failed: {message}")]
    ProbeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Render cancelled")]
    Cancelled,

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    /// Create a render failure error.
    pub fn render_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::RenderFailed {
            reason: reason.into(),
            stderr,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(message.into())
    }

    pub fn too_large(message: impl Into<String>) -> Self {
        Self::PayloadTooLarge(message.into())
    }

    pub fn invalid_encoding(message: impl Into<String>) -> Self {
        Self::InvalidEncoding(message.into())
    }
}
