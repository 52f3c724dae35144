//! Error types for the encoder module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while encoding, concatenating or muxing.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// ffmpeg binary not found.
    #[error("ffmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// ffmpeg exited unsuccessfully.
    #[error("encoding failed: {reason}")]
    EncodingFailed {
        reason: String,
        /// Tail of ffmpeg's stderr.
        stderr: Option<String>,
    },

    /// A frame arrived out of order or after a gap.
    #[error("expected frame {expected}, got {got}")]
    OutOfOrderFrame { expected: u64, got: u64 },

    /// The session finished with fewer frames than requested.
    #[error("encoder received {written} of {expected} frames")]
    IncompleteInput { expected: u64, written: u64 },

    /// ffmpeg closed its input before all frames were written.
    #[error("encoder input closed unexpectedly")]
    InputClosed,

    /// ffmpeg succeeded but produced no file.
    #[error("encoder output missing: {path}")]
    OutputMissing { path: PathBuf },

    /// The request cannot be encoded.
    #[error("invalid encode request: {reason}")]
    InvalidRequest { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncoderError {
    /// Creates an encoding failed error with an optional stderr tail.
    pub fn encoding_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::EncodingFailed {
            reason: reason.into(),
            stderr,
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Captured stderr, if ffmpeg produced any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::EncodingFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}
