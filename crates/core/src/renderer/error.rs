//! Error types for renderer backends.

use std::path::PathBuf;
use thiserror::Error;

use crate::readiness::ReadinessError;

/// Errors raised by a renderer instance.
#[derive(Debug, Error)]
pub enum RendererError {
    /// The renderer executable does not exist.
    #[error("renderer command not found: {command}")]
    NotFound { command: PathBuf },

    #[error("scene did not load within {timeout_ms}ms")]
    LoadTimeout { timeout_ms: u64 },

    #[error("frame {frame} was not painted within {timeout_ms}ms")]
    PaintTimeout { frame: u64, timeout_ms: u64 },

    /// The renderer sent something that does not fit the protocol.
    #[error("renderer protocol error: {0}")]
    Protocol(String),

    /// The scene itself reported an error.
    #[error("scene error: {0}")]
    Scene(String),

    #[error("renderer process exited")]
    Exited,

    #[error("capture of frame {frame} failed: {reason}")]
    CaptureFailed { frame: u64, reason: String },

    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RendererError {
    pub fn capture_failed(frame: u64, reason: impl Into<String>) -> Self {
        Self::CaptureFailed {
            frame,
            reason: reason.into(),
        }
    }
}
