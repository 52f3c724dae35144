//! Frame driver: the control surface over one renderer instance.
//!
//! Capturing a frame is three steps that must happen in order: commit (seek
//! and wait for the paint), wait for readiness (no outstanding delays), then
//! capture. The [`CommittedFrame`] and [`ReadyFrame`] tokens can only be
//! produced by the step before them, so the order is checked at compile time.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::audio::AudioTrackDescriptor;
use crate::readiness::ReadinessRegistry;
use crate::renderer::{
    ImageFormat, LoadedScene, Renderer, RendererConfig, RendererError, RendererLauncher, SceneRef,
};

/// Time limits applied around renderer calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTimeouts {
    pub load: Duration,
    pub readiness: Duration,
    pub paint: Duration,
}

impl DriverTimeouts {
    pub fn from_config(config: &RendererConfig) -> Self {
        Self {
            load: Duration::from_millis(config.load_timeout_ms),
            readiness: Duration::from_millis(config.readiness_timeout_ms),
            paint: Duration::from_millis(config.paint_timeout_ms),
        }
    }
}

impl Default for DriverTimeouts {
    fn default() -> Self {
        Self::from_config(&RendererConfig::default())
    }
}

/// A frame whose state update has been applied and painted.
#[derive(Debug, PartialEq, Eq)]
pub struct CommittedFrame {
    frame: u64,
}

impl CommittedFrame {
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

/// A committed frame with no outstanding delays.
#[derive(Debug, PartialEq, Eq)]
pub struct ReadyFrame {
    frame: u64,
}

impl ReadyFrame {
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

/// A frame written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub frame: u64,
    pub path: PathBuf,
}

/// Drives one renderer instance frame by frame.
pub struct FrameDriver {
    worker_index: usize,
    renderer: Box<dyn Renderer>,
    registry: ReadinessRegistry,
    timeouts: DriverTimeouts,
    committed: Option<u64>,
}

impl FrameDriver {
    pub fn new(
        worker_index: usize,
        renderer: Box<dyn Renderer>,
        registry: ReadinessRegistry,
        timeouts: DriverTimeouts,
    ) -> Self {
        Self {
            worker_index,
            renderer,
            registry,
            timeouts,
            committed: None,
        }
    }

    /// Launches an isolated instance with its own readiness registry.
    pub async fn launch(
        launcher: &dyn RendererLauncher,
        worker_index: usize,
        timeouts: DriverTimeouts,
    ) -> Result<Self, RendererError> {
        let registry = ReadinessRegistry::new(format!("worker-{}", worker_index));
        let renderer = launcher.launch(worker_index, registry.clone()).await?;
        Ok(Self::new(worker_index, renderer, registry, timeouts))
    }

    pub fn worker_index(&self) -> usize {
        self.worker_index
    }

    pub fn registry(&self) -> &ReadinessRegistry {
        &self.registry
    }

    pub fn timeouts(&self) -> DriverTimeouts {
        self.timeouts
    }

    /// Loads the scene. A timeout is fatal for this instance.
    pub async fn load(&mut self, scene: &SceneRef) -> Result<LoadedScene, RendererError> {
        let limit = self.timeouts.load;
        let loaded = timeout(limit, self.renderer.load(scene))
            .await
            .map_err(|_| RendererError::LoadTimeout {
                timeout_ms: limit.as_millis() as u64,
            })??;

        info!(
            worker = self.worker_index,
            renderer = self.renderer.name(),
            composition = %loaded.composition_id,
            duration_in_frames = ?loaded.duration_in_frames,
            "Scene loaded"
        );
        Ok(loaded)
    }

    /// Applies the state update for `frame` and waits for its paint.
    pub async fn commit_frame(&mut self, frame: u64) -> Result<CommittedFrame, RendererError> {
        if let Some(failure) = self.registry.failure() {
            return Err(failure.into());
        }

        self.committed = None;
        self.renderer.seek(frame).await?;

        let limit = self.timeouts.paint;
        timeout(limit, self.renderer.await_paint(frame))
            .await
            .map_err(|_| RendererError::PaintTimeout {
                frame,
                timeout_ms: limit.as_millis() as u64,
            })??;

        self.committed = Some(frame);
        debug!(worker = self.worker_index, frame, "Frame committed");
        Ok(CommittedFrame { frame })
    }

    /// Waits until no delay is outstanding for the committed frame.
    pub async fn await_readiness(
        &mut self,
        committed: CommittedFrame,
    ) -> Result<ReadyFrame, RendererError> {
        self.registry
            .wait_until_clear(self.timeouts.readiness)
            .await?;
        Ok(ReadyFrame {
            frame: committed.frame,
        })
    }

    /// Writes the ready frame to `dest`.
    pub async fn capture(
        &mut self,
        ready: ReadyFrame,
        dest: &Path,
        format: ImageFormat,
        quality: u8,
    ) -> Result<CapturedFrame, RendererError> {
        if self.committed != Some(ready.frame) {
            return Err(RendererError::capture_failed(
                ready.frame,
                "another frame was committed since readiness",
            ));
        }
        self.renderer
            .screenshot(ready.frame, dest, format, quality)
            .await?;

        Ok(CapturedFrame {
            frame: ready.frame,
            path: dest.to_path_buf(),
        })
    }

    /// Audio tracks the scene reported since the last call.
    pub fn collected_audio(&mut self) -> Vec<AudioTrackDescriptor> {
        self.renderer.take_audio_tracks()
    }

    /// Closes the renderer instance.
    pub async fn dispose(mut self) -> Result<(), RendererError> {
        debug!(worker = self.worker_index, "Disposing renderer");
        self.renderer.close().await
    }
}
