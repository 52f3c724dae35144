//! Trait definitions for renderer backends.

use async_trait::async_trait;
use std::path::Path;

use super::error::RendererError;
use super::types::{ImageFormat, LoadedScene, SceneRef};
use crate::audio::AudioTrackDescriptor;
use crate::readiness::ReadinessRegistry;

/// One isolated renderer instance.
///
/// Calls are strictly sequential. Timeouts are applied by the caller.
#[async_trait]
pub trait Renderer: Send {
    /// Returns the name of this renderer implementation.
    fn name(&self) -> &str;

    /// Loads the composition and resolves once it is mounted.
    async fn load(&mut self, scene: &SceneRef) -> Result<LoadedScene, RendererError>;

    /// Moves the scene to `frame`. Returns before the frame is painted.
    async fn seek(&mut self, frame: u64) -> Result<(), RendererError>;

    /// Resolves once `frame` has been painted.
    async fn await_paint(&mut self, frame: u64) -> Result<(), RendererError>;

    /// Writes the current frame to `dest`.
    async fn screenshot(
        &mut self,
        frame: u64,
        dest: &Path,
        format: ImageFormat,
        quality: u8,
    ) -> Result<(), RendererError>;

    /// Drains audio tracks the scene reported so far.
    fn take_audio_tracks(&mut self) -> Vec<AudioTrackDescriptor>;

    /// Shuts the instance down.
    async fn close(&mut self) -> Result<(), RendererError>;
}

/// Creates renderer instances, one per worker.
#[async_trait]
pub trait RendererLauncher: Send + Sync {
    fn name(&self) -> &str;

    /// Starts an instance whose delay messages go into `registry`.
    async fn launch(
        &self,
        worker_index: usize,
        registry: ReadinessRegistry,
    ) -> Result<Box<dyn Renderer>, RendererError>;
}
