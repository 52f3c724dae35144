//! Renderer bridge running as a subprocess.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::RendererConfig;
use super::error::RendererError;
use super::protocol::{RendererCommand, RendererMessage};
use super::traits::{Renderer, RendererLauncher};
use super::types::{ImageFormat, LoadedScene, SceneRef};
use crate::audio::AudioTrackDescriptor;
use crate::readiness::{DelayId, ReadinessError, ReadinessRegistry};

const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Replies the reader task hands to the waiting caller.
#[derive(Debug)]
enum Reply {
    Ready(LoadedScene),
    Painted(u64),
    Captured(u64),
    Error(String),
}

/// Launches [`ProcessRenderer`] instances from configuration.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    config: RendererConfig,
}

impl ProcessLauncher {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }
}

#[async_trait]
impl RendererLauncher for ProcessLauncher {
    fn name(&self) -> &str {
        "process"
    }

    async fn launch(
        &self,
        worker_index: usize,
        registry: ReadinessRegistry,
    ) -> Result<Box<dyn Renderer>, RendererError> {
        let renderer = ProcessRenderer::spawn(&self.config, worker_index, registry)?;
        Ok(Box::new(renderer))
    }
}

/// A renderer bridge process speaking the NDJSON protocol.
///
/// The child is killed when this value is dropped.
pub struct ProcessRenderer {
    worker_index: usize,
    child: Child,
    stdin: ChildStdin,
    replies: mpsc::UnboundedReceiver<Reply>,
    audio: Arc<Mutex<Vec<AudioTrackDescriptor>>>,
    closing: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    stderr: Option<JoinHandle<()>>,
}

impl ProcessRenderer {
    /// Spawns the configured command for one worker.
    pub fn spawn(
        config: &RendererConfig,
        worker_index: usize,
        registry: ReadinessRegistry,
    ) -> Result<Self, RendererError> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .env("FRAMECAST_WORKER_INDEX", worker_index.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RendererError::NotFound {
                        command: config.command.clone(),
                    }
                } else {
                    RendererError::Io(e)
                }
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RendererError::Protocol("renderer stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RendererError::Protocol("renderer stdout unavailable".into()))?;

        let stderr = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "framecast::renderer", worker = worker_index, "{}", line);
                }
            })
        });

        let (tx, replies) = mpsc::unbounded_channel();
        let audio = Arc::new(Mutex::new(Vec::new()));
        let closing = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(
            MessageReader {
                worker_index,
                registry,
                delays: HashMap::new(),
                default_timeout: config.delay_timeout(),
                default_retries: config.delay_retries,
                audio: Arc::clone(&audio),
                closing: Arc::clone(&closing),
                replies: tx,
            }
            .run(stdout),
        );

        info!(
            worker = worker_index,
            command = %config.command.display(),
            pid = child.id(),
            "Renderer started"
        );

        Ok(Self {
            worker_index,
            child,
            stdin,
            replies,
            audio,
            closing,
            reader,
            stderr,
        })
    }

    async fn send(&mut self, command: &RendererCommand) -> Result<(), RendererError> {
        let line = command
            .to_line()
            .map_err(|e| RendererError::Protocol(e.to_string()))?;
        self.stdin.write_all(line.as_bytes()).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                RendererError::Exited
            } else {
                RendererError::Io(e)
            }
        })?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn next_reply(&mut self) -> Result<Reply, RendererError> {
        match self.replies.recv().await {
            Some(Reply::Error(message)) => Err(RendererError::Scene(message)),
            Some(reply) => Ok(reply),
            None => Err(RendererError::Exited),
        }
    }
}

#[async_trait]
impl Renderer for ProcessRenderer {
    fn name(&self) -> &str {
        "process"
    }

    async fn load(&mut self, scene: &SceneRef) -> Result<LoadedScene, RendererError> {
        self.send(&RendererCommand::Load {
            composition_id: scene.composition_id.clone(),
            input_props: scene.input_props.clone(),
            width: scene.width,
            height: scene.height,
            scale: scene.scale,
            fps: scene.fps,
            serve_url: scene.serve_url.clone(),
        })
        .await?;

        loop {
            match self.next_reply().await? {
                Reply::Ready(loaded) => return Ok(loaded),
                other => debug!(worker = self.worker_index, ?other, "Ignoring reply before ready"),
            }
        }
    }

    async fn seek(&mut self, frame: u64) -> Result<(), RendererError> {
        self.send(&RendererCommand::Seek { frame }).await
    }

    async fn await_paint(&mut self, frame: u64) -> Result<(), RendererError> {
        loop {
            match self.next_reply().await? {
                Reply::Painted(painted) if painted == frame => return Ok(()),
                Reply::Painted(stale) => {
                    debug!(worker = self.worker_index, stale, frame, "Skipping stale paint")
                }
                other => {
                    return Err(RendererError::Protocol(format!(
                        "expected paint of frame {}, got {:?}",
                        frame, other
                    )))
                }
            }
        }
    }

    async fn screenshot(
        &mut self,
        frame: u64,
        dest: &Path,
        format: ImageFormat,
        quality: u8,
    ) -> Result<(), RendererError> {
        self.send(&RendererCommand::Screenshot {
            frame,
            path: dest.to_path_buf(),
            format,
            quality,
        })
        .await?;

        match self.next_reply().await? {
            Reply::Captured(captured) if captured == frame => Ok(()),
            other => Err(RendererError::capture_failed(
                frame,
                format!("unexpected reply {:?}", other),
            )),
        }
    }

    fn take_audio_tracks(&mut self) -> Vec<AudioTrackDescriptor> {
        let mut audio = self.audio.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *audio)
    }

    async fn close(&mut self) -> Result<(), RendererError> {
        self.closing.store(true, Ordering::SeqCst);
        if let Err(e) = self.send(&RendererCommand::Close).await {
            debug!(worker = self.worker_index, error = %e, "Close command not delivered");
        }

        match tokio::time::timeout(CLOSE_GRACE, self.child.wait()).await {
            Ok(status) => {
                debug!(worker = self.worker_index, status = ?status.ok(), "Renderer exited");
            }
            Err(_) => {
                warn!(worker = self.worker_index, "Renderer ignored close, killing it");
                self.child.kill().await?;
            }
        }
        self.reader.abort();
        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }
        Ok(())
    }
}

/// Reads renderer messages, forwarding delays into the registry.
struct MessageReader {
    worker_index: usize,
    registry: ReadinessRegistry,
    /// Renderer-side delay ids mapped to registry ids.
    delays: HashMap<u64, DelayId>,
    default_timeout: Duration,
    default_retries: u32,
    audio: Arc<Mutex<Vec<AudioTrackDescriptor>>>,
    closing: Arc<AtomicBool>,
    replies: mpsc::UnboundedSender<Reply>,
}

impl MessageReader {
    async fn run(mut self, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match RendererMessage::parse(line) {
                        Ok(message) => self.handle(message),
                        Err(e) => warn!(
                            worker = self.worker_index,
                            error = %e,
                            line,
                            "Unparseable renderer message"
                        ),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(worker = self.worker_index, error = %e, "Renderer stdout failed");
                    break;
                }
            }
        }

        if !self.closing.load(Ordering::SeqCst) {
            self.registry
                .fail_all(ReadinessError::Failed("renderer process exited".into()));
        }
    }

    fn handle(&mut self, message: RendererMessage) {
        match message {
            RendererMessage::Ready {
                composition_id,
                duration_in_frames,
            } => self.reply(Reply::Ready(LoadedScene {
                composition_id,
                duration_in_frames,
            })),
            RendererMessage::Painted { frame } => self.reply(Reply::Painted(frame)),
            RendererMessage::Captured { frame } => self.reply(Reply::Captured(frame)),
            RendererMessage::DelayBegin {
                id,
                label,
                timeout_ms,
                retries,
            } => {
                let timeout = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.default_timeout);
                let delay = self.registry.begin_delay(
                    label,
                    timeout,
                    retries.unwrap_or(self.default_retries),
                );
                self.delays.insert(id, delay);
            }
            RendererMessage::DelayEnd { id } => match self.delays.remove(&id) {
                Some(delay) => {
                    self.registry.end_delay(delay);
                }
                None => warn!(
                    worker = self.worker_index,
                    id, "delay_end for an unknown renderer delay"
                ),
            },
            RendererMessage::Audio(track) => {
                debug!(worker = self.worker_index, source = %track.source_url, "Audio track reported");
                self.audio
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(track);
            }
            RendererMessage::Log { level, message } => match level.as_deref() {
                Some("error") | Some("warn") => {
                    warn!(target: "framecast::scene", worker = self.worker_index, "{}", message)
                }
                _ => debug!(target: "framecast::scene", worker = self.worker_index, "{}", message),
            },
            RendererMessage::Error { message } => {
                self.registry.fail_all(ReadinessError::Failed(message.clone()));
                self.reply(Reply::Error(message));
            }
        }
    }

    fn reply(&self, reply: Reply) {
        // The renderer may outlive the caller during shutdown.
        let _ = self.replies.send(reply);
    }
}
