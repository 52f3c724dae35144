//! Types for the render orchestrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::batch::BatchError;
use crate::config::Config;
use crate::driver::DriverTimeouts;
use crate::encoder::EncoderError;
use crate::job::ValidationError;
use crate::readiness::ReadinessError;
use crate::renderer::{RendererConfig, RendererError};
use crate::worker::WorkerError;

/// Errors that end a render job.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Rejected before any subprocess started.
    #[error("invalid render job: {0}")]
    Validation(#[from] ValidationError),

    #[error("worker {worker_index}: scene did not load within {timeout_ms}ms")]
    SceneLoadTimeout { worker_index: usize, timeout_ms: u64 },

    #[error("worker {worker_index}: frame {frame} never became ready: {source}")]
    ReadinessTimeout {
        worker_index: usize,
        frame: u64,
        #[source]
        source: ReadinessError,
    },

    #[error("worker {worker_index} failed{}: {message}", on_frame(.frame))]
    WorkerFailure {
        worker_index: usize,
        frame: Option<u64>,
        message: String,
    },

    #[error("encoding failed: {0}")]
    EncodingFailure(#[from] EncoderError),

    /// Only surfaced as a warning by the orchestrator.
    #[error("audio mix failed: {0}")]
    AudioMixFailure(String),

    #[error("batch job {index} failed: {message}")]
    BatchJobFailure { index: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Whether the error ends the job. Audio mix failures do not.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::AudioMixFailure(_))
    }

    /// Maps a renderer error raised while loading the scene.
    pub(crate) fn from_load(worker_index: usize, err: RendererError) -> Self {
        match err {
            RendererError::LoadTimeout { timeout_ms } => Self::SceneLoadTimeout {
                worker_index,
                timeout_ms,
            },
            other => Self::WorkerFailure {
                worker_index,
                frame: None,
                message: other.to_string(),
            },
        }
    }
}

impl From<WorkerError> for RenderError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Frame {
                worker_index,
                frame,
                source: RendererError::Readiness(source @ ReadinessError::Timeout { .. }),
            }
            | WorkerError::Frame {
                worker_index,
                frame,
                source: RendererError::Readiness(source @ ReadinessError::DelayExhausted { .. }),
            } => Self::ReadinessTimeout {
                worker_index,
                frame,
                source,
            },
            WorkerError::Frame {
                worker_index,
                frame,
                source,
            } => Self::WorkerFailure {
                worker_index,
                frame: Some(frame),
                message: source.to_string(),
            },
            WorkerError::Encoder { source, .. } => Self::EncodingFailure(source),
            WorkerError::Io { source, .. } => Self::Io(source),
        }
    }
}

impl From<BatchError<RenderError>> for RenderError {
    fn from(err: BatchError<RenderError>) -> Self {
        match err {
            BatchError::InvalidConcurrency => Self::Validation(ValidationError::InvalidConcurrency),
            BatchError::JobFailed { index, error } => Self::BatchJobFailure {
                index,
                message: error.to_string(),
            },
        }
    }
}

fn on_frame(frame: &Option<u64>) -> String {
    frame.map(|f| format!(" on frame {}", f)).unwrap_or_default()
}

/// A worker's encoded part of the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub worker_index: usize,
    pub start_frame: u64,
    /// Inclusive.
    pub end_frame: u64,
    pub path: PathBuf,
}

impl Segment {
    pub fn frame_count(&self) -> u64 {
        self.end_frame - self.start_frame + 1
    }
}

/// Result of a finished render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOutcome {
    pub output_path: PathBuf,
    pub filename: String,
    pub frames: u64,
    pub workers: usize,
    pub duration_ms: u64,
    pub audio_tracks_mixed: usize,
    /// Non-fatal problems, also emitted as status events.
    pub warnings: Vec<String>,
}

/// Runtime settings of a [`super::RenderOrchestrator`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Parent of the per-job scratch directories.
    pub temp_dir: PathBuf,
    pub timeouts: DriverTimeouts,
    pub serve_url: String,
    /// Base of `downloadUrl` in complete events, if outputs are served.
    pub download_base_url: Option<String>,
}

impl OrchestratorSettings {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            timeouts: DriverTimeouts::default(),
            serve_url: RendererConfig::default().serve_url,
            download_base_url: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            temp_dir: config.render.temp_dir.clone(),
            timeouts: DriverTimeouts::from_config(&config.renderer),
            serve_url: config.renderer.serve_url.clone(),
            download_base_url: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: DriverTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_download_base_url(mut self, url: impl Into<String>) -> Self {
        self.download_base_url = Some(url.into());
        self
    }

    /// `<base>/<filename>` when a download base is configured.
    pub fn download_url(&self, filename: &str) -> Option<String> {
        self.download_base_url
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), filename))
    }
}
