//! Render worker: renders one contiguous frame range on one renderer instance.

use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::AudioTrackDescriptor;
use crate::driver::FrameDriver;
use crate::encoder::{EncoderError, EncoderSession};
use crate::job::FrameRange;
use crate::orchestrator::Segment;
use crate::renderer::{ImageFormat, RendererError};

/// Errors that abort a worker. No partial output survives them.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker {worker_index} failed on frame {frame}: {source}")]
    Frame {
        worker_index: usize,
        frame: u64,
        #[source]
        source: RendererError,
    },

    #[error("worker {worker_index} encoder failed: {source}")]
    Encoder {
        worker_index: usize,
        frame: Option<u64>,
        #[source]
        source: EncoderError,
    },

    #[error("worker {worker_index} I/O error: {source}")]
    Io {
        worker_index: usize,
        #[source]
        source: std::io::Error,
    },
}

impl WorkerError {
    pub fn worker_index(&self) -> usize {
        match self {
            Self::Frame { worker_index, .. }
            | Self::Encoder { worker_index, .. }
            | Self::Io { worker_index, .. } => *worker_index,
        }
    }
}

/// File names of stills: `<prefix><zero-padded frame>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillNaming {
    pub prefix: String,
    pub width: usize,
    pub format: ImageFormat,
}

impl StillNaming {
    /// Pads frame numbers to the digit count of `last_frame`.
    pub fn new(prefix: impl Into<String>, last_frame: u64, format: ImageFormat) -> Self {
        Self {
            prefix: prefix.into(),
            width: last_frame.to_string().len(),
            format,
        }
    }

    pub fn file_name(&self, frame: u64) -> String {
        format!(
            "{}{:0width$}.{}",
            self.prefix,
            frame,
            self.format.extension(),
            width = self.width
        )
    }

    /// printf-style pattern matching every file name.
    pub fn pattern(&self) -> String {
        format!(
            "{}%0{}d.{}",
            self.prefix,
            self.width,
            self.format.extension()
        )
    }
}

/// Where a worker's frames go.
pub enum FrameTarget {
    /// Stream into an encoder session producing the segment at `output_path`.
    Encode {
        session: Box<dyn EncoderSession>,
        output_path: PathBuf,
    },
    /// Keep every frame as a still in `dir`.
    Stills { dir: PathBuf, naming: StillNaming },
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub worker_index: usize,
    pub range: FrameRange,
    pub image_format: ImageFormat,
    pub jpeg_quality: u8,
    /// Directory for the transient capture file of encode targets.
    pub scratch_dir: PathBuf,
    /// Drain audio descriptors from the renderer when done.
    pub collect_audio: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOutput {
    /// Present for encode targets.
    pub segment: Option<Segment>,
    pub frames_rendered: u64,
    pub audio_tracks: Vec<AudioTrackDescriptor>,
}

/// Renders `options.range` in ascending order into `target`.
///
/// For each frame: commit, wait for readiness, capture, then hand the frame
/// to the target and report the running count through `on_progress`. The
/// first failing frame aborts the worker; an encode target's session is
/// dropped and its partial segment removed, a stills target loses the stills
/// it already wrote.
pub async fn render_range<F>(
    driver: &mut FrameDriver,
    target: FrameTarget,
    options: &WorkerOptions,
    on_progress: F,
) -> Result<WorkerOutput, WorkerError>
where
    F: Fn(u64) + Send + Sync,
{
    let partial = match &target {
        FrameTarget::Encode { output_path, .. } => Some(output_path.clone()),
        FrameTarget::Stills { .. } => None,
    };
    let capture_path = options.scratch_dir.join(format!(
        "capture-{}.{}",
        options.worker_index,
        options.image_format.extension()
    ));

    info!(
        worker = options.worker_index,
        start = options.range.start,
        end = options.range.end,
        "Worker started"
    );
    let mut written = Vec::new();
    let result = run(
        driver,
        target,
        options,
        &capture_path,
        &mut written,
        &on_progress,
    )
    .await;
    let _ = tokio::fs::remove_file(&capture_path).await;

    match result {
        Ok(output) => {
            info!(
                worker = options.worker_index,
                frames = output.frames_rendered,
                "Worker finished"
            );
            Ok(output)
        }
        Err(e) => {
            warn!(worker = options.worker_index, error = %e, "Worker failed");
            if let Some(path) = partial {
                if tokio::fs::remove_file(&path).await.is_ok() {
                    debug!(path = %path.display(), "Removed partial segment");
                }
            }
            remove_stills(options.worker_index, &written).await;
            Err(e)
        }
    }
}

async fn remove_stills(worker_index: usize, written: &[PathBuf]) {
    let mut removed = 0;
    for path in written {
        match tokio::fs::remove_file(path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(worker = worker_index, path = %path.display(), error = %e, "Failed to remove still")
            }
        }
    }
    if removed > 0 {
        debug!(worker = worker_index, removed, "Removed partial stills");
    }
}

async fn run(
    driver: &mut FrameDriver,
    mut target: FrameTarget,
    options: &WorkerOptions,
    capture_path: &std::path::Path,
    written: &mut Vec<PathBuf>,
    on_progress: &(dyn Fn(u64) + Send + Sync),
) -> Result<WorkerOutput, WorkerError> {
    let worker_index = options.worker_index;
    let frame_err = |frame: u64| {
        move |source: RendererError| WorkerError::Frame {
            worker_index,
            frame,
            source,
        }
    };

    let mut done = 0;
    for frame in options.range.iter() {
        let committed = driver.commit_frame(frame).await.map_err(frame_err(frame))?;
        let ready = driver
            .await_readiness(committed)
            .await
            .map_err(frame_err(frame))?;

        match &mut target {
            FrameTarget::Encode { session, .. } => {
                driver
                    .capture(ready, capture_path, options.image_format, options.jpeg_quality)
                    .await
                    .map_err(frame_err(frame))?;
                let bytes = tokio::fs::read(capture_path)
                    .await
                    .map_err(|source| WorkerError::Io {
                        worker_index,
                        source,
                    })?;
                session
                    .push_frame(frame, bytes)
                    .await
                    .map_err(|source| WorkerError::Encoder {
                        worker_index,
                        frame: Some(frame),
                        source,
                    })?;
            }
            FrameTarget::Stills { dir, naming } => {
                let dest = dir.join(naming.file_name(frame));
                // A failed capture may leave a truncated file behind
                written.push(dest.clone());
                driver
                    .capture(ready, &dest, options.image_format, options.jpeg_quality)
                    .await
                    .map_err(frame_err(frame))?;
            }
        }

        done += 1;
        on_progress(done);
    }

    let segment = match target {
        FrameTarget::Encode {
            session,
            output_path,
        } => {
            let encoded = session
                .finish()
                .await
                .map_err(|source| WorkerError::Encoder {
                    worker_index,
                    frame: None,
                    source,
                })?;
            debug!(
                worker = worker_index,
                path = %output_path.display(),
                frames = encoded.frames,
                "Segment encoded"
            );
            Some(Segment {
                worker_index,
                start_frame: options.range.start,
                end_frame: options.range.end,
                path: encoded.path,
            })
        }
        FrameTarget::Stills { .. } => None,
    };

    let audio_tracks = if options.collect_audio {
        driver.collected_audio()
    } else {
        Vec::new()
    };

    Ok(WorkerOutput {
        segment,
        frames_rendered: done,
        audio_tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverTimeouts;
    use crate::encoder::{Codec, EncodeRequest, Encoder};
    use crate::renderer::SceneRef;
    use crate::testing::{MockEncoder, MockLauncher};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    fn scene() -> SceneRef {
        SceneRef {
            composition_id: "intro".into(),
            input_props: json!({}),
            width: 64,
            height: 64,
            scale: 1.0,
            fps: 30.0,
            serve_url: "mock://".into(),
        }
    }

    fn options(dir: &std::path::Path, start: u64, end: u64) -> WorkerOptions {
        WorkerOptions {
            worker_index: 0,
            range: FrameRange { start, end },
            image_format: ImageFormat::Png,
            jpeg_quality: 80,
            scratch_dir: dir.to_path_buf(),
            collect_audio: true,
        }
    }

    async fn driver(launcher: &MockLauncher) -> FrameDriver {
        let timeouts = DriverTimeouts {
            load: Duration::from_secs(1),
            readiness: Duration::from_secs(1),
            paint: Duration::from_secs(1),
        };
        let mut driver = FrameDriver::launch(launcher, 0, timeouts).await.unwrap();
        driver.load(&scene()).await.unwrap();
        driver
    }

    #[test]
    fn test_still_naming() {
        let naming = StillNaming::new("element-", 120, ImageFormat::Png);
        assert_eq!(naming.file_name(7), "element-007.png");
        assert_eq!(naming.pattern(), "element-%03d.png");

        let naming = StillNaming::new("frame-", 9, ImageFormat::Jpeg);
        assert_eq!(naming.file_name(3), "frame-3.jpeg");
    }

    #[tokio::test]
    async fn test_encodes_range_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = MockLauncher::new();
        let encoder = MockEncoder::new();
        let mut driver = driver(&launcher).await;

        let output_path = dir.path().join("seg-0.mp4");
        let session = encoder
            .begin(EncodeRequest::pipe(Codec::H264, ImageFormat::Png, &output_path, 10, 5))
            .await
            .unwrap();

        let progress = AtomicU64::new(0);
        let output = render_range(
            &mut driver,
            FrameTarget::Encode {
                session,
                output_path: output_path.clone(),
            },
            &options(dir.path(), 10, 14),
            |done| progress.store(done, Ordering::SeqCst),
        )
        .await
        .unwrap();

        assert_eq!(output.frames_rendered, 5);
        assert_eq!(progress.load(Ordering::SeqCst), 5);
        let segment = output.segment.unwrap();
        assert_eq!((segment.start_frame, segment.end_frame), (10, 14));

        let content = std::fs::read_to_string(&output_path).unwrap();
        let frames: Vec<&str> = content.lines().collect();
        assert_eq!(
            frames,
            vec!["frame 10", "frame 11", "frame 12", "frame 13", "frame 14"]
        );
        assert!(!dir.path().join("capture-0.png").exists());
    }

    #[tokio::test]
    async fn test_failure_removes_partial_segment() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = MockLauncher::new();
        launcher.fail_on_frame(3, "undefined is not a function").await;
        let encoder = MockEncoder::new();
        let mut driver = driver(&launcher).await;

        let output_path = dir.path().join("seg-0.mp4");
        std::fs::write(&output_path, "partial").unwrap();
        let session = encoder
            .begin(EncodeRequest::pipe(Codec::H264, ImageFormat::Png, &output_path, 0, 6))
            .await
            .unwrap();

        let err = render_range(
            &mut driver,
            FrameTarget::Encode {
                session,
                output_path: output_path.clone(),
            },
            &options(dir.path(), 0, 5),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            WorkerError::Frame {
                worker_index: 0,
                frame: 3,
                source: RendererError::Scene(_)
            }
        ));
        assert!(!output_path.exists());
        assert_eq!(launcher.captured_frames().await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_stills_target() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = MockLauncher::new();
        let mut driver = driver(&launcher).await;

        let naming = StillNaming::new("element-", 11, ImageFormat::Png);
        let output = render_range(
            &mut driver,
            FrameTarget::Stills {
                dir: dir.path().to_path_buf(),
                naming,
            },
            &options(dir.path(), 9, 11),
            |_| {},
        )
        .await
        .unwrap();

        assert!(output.segment.is_none());
        assert_eq!(output.frames_rendered, 3);
        for name in ["element-09.png", "element-10.png", "element-11.png"] {
            assert!(dir.path().join(name).exists(), "{name} missing");
        }
    }

    #[tokio::test]
    async fn test_failure_removes_written_stills() {
        let dir = tempfile::tempdir().unwrap();
        let stills = dir.path().join("stills");
        std::fs::create_dir(&stills).unwrap();
        std::fs::write(stills.join("keep.txt"), "unrelated").unwrap();

        let launcher = MockLauncher::new();
        launcher.fail_on_frame(3, "undefined is not a function").await;
        let mut driver = driver(&launcher).await;

        let err = render_range(
            &mut driver,
            FrameTarget::Stills {
                dir: stills.clone(),
                naming: StillNaming::new("element-", 5, ImageFormat::Png),
            },
            &options(dir.path(), 0, 5),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WorkerError::Frame { frame: 3, .. }));
        assert_eq!(launcher.captured_frames().await, vec![0, 1, 2]);
        let left: Vec<_> = std::fs::read_dir(&stills)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from("keep.txt")]);
    }
}
