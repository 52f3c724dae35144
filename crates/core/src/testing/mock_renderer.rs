//! Mock renderer for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::audio::AudioTrackDescriptor;
use crate::readiness::{ReadinessError, ReadinessRegistry};
use crate::renderer::{
    ImageFormat, LoadedScene, Renderer, RendererError, RendererLauncher, SceneRef,
};

/// How a scripted delay behaves once the frame is committed.
#[derive(Debug, Clone, PartialEq)]
pub enum MockDelay {
    /// `end_delay` is called after the duration.
    ResolveAfter(Duration),
    /// The delay is never resolved.
    Never,
}

#[derive(Debug, Clone)]
struct ScriptedDelay {
    label: String,
    behavior: MockDelay,
    timeout: Duration,
    retries: u32,
}

#[derive(Debug, Default)]
struct Script {
    delays: HashMap<u64, Vec<ScriptedDelay>>,
    fail_on_frame: Option<(u64, String)>,
    fail_launch: Option<String>,
    hang_on_load: bool,
    hang_paint_on: Option<u64>,
    audio_tracks: Vec<AudioTrackDescriptor>,
    frame_delay: Option<Duration>,
}

/// A capture recorded for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCapture {
    pub worker_index: usize,
    pub frame: u64,
    pub path: PathBuf,
}

/// Mock implementation of the RendererLauncher trait.
///
/// Every launched [`MockRenderer`] shares the launcher's script, so behavior
/// configured here applies to all workers:
/// - delays registered when a frame is committed
/// - scene errors on a given frame
/// - hanging loads or paints
/// - audio tracks reported on load
///
/// Screenshots write `frame N\n` to the destination.
///
/// # Example
///
/// ```rust,ignore
/// use framecast_core::testing::{MockDelay, MockLauncher};
///
/// let launcher = MockLauncher::new();
/// launcher.add_delay(10, "font", MockDelay::ResolveAfter(Duration::from_millis(50))).await;
///
/// let orchestrator = RenderOrchestrator::new(Arc::new(launcher.clone()), encoder, settings);
/// orchestrator.render(job).await?;
///
/// assert_eq!(launcher.captured_frames().await.len(), 60);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    script: Arc<RwLock<Script>>,
    captures: Arc<RwLock<Vec<RecordedCapture>>>,
    launches: Arc<RwLock<Vec<usize>>>,
    closed: Arc<AtomicUsize>,
}

impl MockLauncher {
    /// Create a new mock launcher with no scripted behavior.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a delay when `frame` is committed. The delay never times out.
    pub async fn add_delay(&self, frame: u64, label: impl Into<String>, behavior: MockDelay) {
        self.add_delay_with_timeout(frame, label, behavior, Duration::ZERO, 0)
            .await;
    }

    /// Register a delay with its own timeout and retry count.
    pub async fn add_delay_with_timeout(
        &self,
        frame: u64,
        label: impl Into<String>,
        behavior: MockDelay,
        timeout: Duration,
        retries: u32,
    ) {
        self.script
            .write()
            .await
            .delays
            .entry(frame)
            .or_default()
            .push(ScriptedDelay {
                label: label.into(),
                behavior,
                timeout,
                retries,
            });
    }

    /// Make the scene throw when `frame` is committed.
    pub async fn fail_on_frame(&self, frame: u64, message: impl Into<String>) {
        self.script.write().await.fail_on_frame = Some((frame, message.into()));
    }

    /// Make every launch fail.
    pub async fn fail_launch(&self, message: impl Into<String>) {
        self.script.write().await.fail_launch = Some(message.into());
    }

    /// Make `load` never resolve.
    pub async fn hang_on_load(&self) {
        self.script.write().await.hang_on_load = true;
    }

    /// Make the paint of `frame` never arrive.
    pub async fn hang_paint_on(&self, frame: u64) {
        self.script.write().await.hang_paint_on = Some(frame);
    }

    /// Audio tracks every instance reports when loaded.
    pub async fn set_audio_tracks(&self, tracks: Vec<AudioTrackDescriptor>) {
        self.script.write().await.audio_tracks = tracks;
    }

    /// Simulated paint time per frame.
    pub async fn set_frame_delay(&self, delay: Duration) {
        self.script.write().await.frame_delay = Some(delay);
    }

    /// All captures in the order they happened.
    pub async fn captures(&self) -> Vec<RecordedCapture> {
        self.captures.read().await.clone()
    }

    /// Captured frame numbers, sorted.
    pub async fn captured_frames(&self) -> Vec<u64> {
        let mut frames: Vec<u64> = self.captures.read().await.iter().map(|c| c.frame).collect();
        frames.sort_unstable();
        frames
    }

    /// Worker indices in launch order.
    pub async fn launches(&self) -> Vec<usize> {
        self.launches.read().await.clone()
    }

    /// Number of instances closed through `close`.
    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RendererLauncher for MockLauncher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn launch(
        &self,
        worker_index: usize,
        registry: ReadinessRegistry,
    ) -> Result<Box<dyn Renderer>, RendererError> {
        if let Some(message) = self.script.read().await.fail_launch.clone() {
            return Err(RendererError::Scene(message));
        }
        self.launches.write().await.push(worker_index);

        Ok(Box::new(MockRenderer {
            worker_index,
            registry,
            script: Arc::clone(&self.script),
            captures: Arc::clone(&self.captures),
            closed: Arc::clone(&self.closed),
            audio: Vec::new(),
            current: None,
            resolvers: Vec::new(),
        }))
    }
}

/// Mock implementation of the Renderer trait, created by [`MockLauncher`].
pub struct MockRenderer {
    worker_index: usize,
    registry: ReadinessRegistry,
    script: Arc<RwLock<Script>>,
    captures: Arc<RwLock<Vec<RecordedCapture>>>,
    closed: Arc<AtomicUsize>,
    audio: Vec<AudioTrackDescriptor>,
    current: Option<u64>,
    resolvers: Vec<JoinHandle<()>>,
}

impl Drop for MockRenderer {
    fn drop(&mut self) {
        for resolver in &self.resolvers {
            resolver.abort();
        }
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load(&mut self, scene: &SceneRef) -> Result<LoadedScene, RendererError> {
        let (hang, tracks) = {
            let script = self.script.read().await;
            (script.hang_on_load, script.audio_tracks.clone())
        };
        if hang {
            std::future::pending::<()>().await;
        }
        self.audio = tracks;
        Ok(LoadedScene {
            composition_id: scene.composition_id.clone(),
            duration_in_frames: None,
        })
    }

    async fn seek(&mut self, frame: u64) -> Result<(), RendererError> {
        let (failure, delays) = {
            let script = self.script.read().await;
            let failure = script
                .fail_on_frame
                .as_ref()
                .filter(|(f, _)| *f == frame)
                .map(|(_, message)| message.clone());
            (failure, script.delays.get(&frame).cloned().unwrap_or_default())
        };

        if let Some(message) = failure {
            self.registry
                .fail_all(ReadinessError::Failed(message.clone()));
            return Err(RendererError::Scene(message));
        }

        for delay in delays {
            let id = self
                .registry
                .begin_delay(delay.label, delay.timeout, delay.retries);
            if let MockDelay::ResolveAfter(after) = delay.behavior {
                let registry = self.registry.clone();
                self.resolvers.push(tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    registry.end_delay(id);
                }));
            }
        }
        self.current = Some(frame);
        Ok(())
    }

    async fn await_paint(&mut self, frame: u64) -> Result<(), RendererError> {
        let (hang, frame_delay) = {
            let script = self.script.read().await;
            (script.hang_paint_on == Some(frame), script.frame_delay)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = frame_delay {
            tokio::time::sleep(delay).await;
        }
        if self.current != Some(frame) {
            return Err(RendererError::Protocol(format!(
                "paint requested for frame {} but {:?} is current",
                frame, self.current
            )));
        }
        Ok(())
    }

    async fn screenshot(
        &mut self,
        frame: u64,
        dest: &Path,
        _format: ImageFormat,
        _quality: u8,
    ) -> Result<(), RendererError> {
        tokio::fs::write(dest, format!("frame {}\n", frame)).await?;
        self.captures.write().await.push(RecordedCapture {
            worker_index: self.worker_index,
            frame,
            path: dest.to_path_buf(),
        });
        Ok(())
    }

    fn take_audio_tracks(&mut self) -> Vec<AudioTrackDescriptor> {
        std::mem::take(&mut self.audio)
    }

    async fn close(&mut self) -> Result<(), RendererError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
