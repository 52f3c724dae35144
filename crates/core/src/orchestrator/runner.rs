//! Render orchestrator implementation.
//!
//! Picks one of four paths for a validated job:
//! - Sequence: stills written straight into the output directory
//! - GIF: stills into scratch, then a palette pass and a paletteuse pass
//! - Single worker: one encoder pipe, then the audio mix
//! - Parallel: K workers encode segments that are concatenated in order

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio;
use crate::driver::FrameDriver;
use crate::encoder::{EncodeInput, EncodeMode, EncodeRequest, Encoder};
use crate::events::EventReporter;
use crate::job::{file_name_of, FrameRange, RenderJobSpec};
use crate::renderer::{RendererLauncher, SceneRef};
use crate::worker::{render_range, FrameTarget, StillNaming, WorkerOptions, WorkerOutput};

use super::progress::{partition_frames, ProgressAggregator};
use super::types::{OrchestratorSettings, RenderError, RenderOutcome, Segment};

/// What a worker writes.
enum TargetPlan {
    Segment(PathBuf),
    Stills { dir: PathBuf, naming: StillNaming },
}

/// Output of one render path before timing is known.
struct Rendered {
    output_path: PathBuf,
    audio_tracks_mixed: usize,
    warnings: Vec<String>,
}

/// Shared state of one job's workers.
struct JobContext<'a> {
    job: &'a RenderJobSpec,
    scene: SceneRef,
    scratch: &'a Path,
    progress: ProgressAggregator,
    reporter: &'a EventReporter,
}

/// Runs render jobs against a renderer launcher and an encoder.
pub struct RenderOrchestrator {
    launcher: Arc<dyn RendererLauncher>,
    encoder: Arc<dyn Encoder>,
    settings: OrchestratorSettings,
}

impl RenderOrchestrator {
    pub fn new(
        launcher: Arc<dyn RendererLauncher>,
        encoder: Arc<dyn Encoder>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            launcher,
            encoder,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    /// Renders `job` without reporting events.
    pub async fn render(&self, job: &RenderJobSpec) -> Result<RenderOutcome, RenderError> {
        self.render_with_events(job, &EventReporter::disabled()).await
    }

    /// Renders `job`, reporting start, status, progress and one terminal event.
    ///
    /// Validation failures return before any event or subprocess.
    pub async fn render_with_events(
        &self,
        job: &RenderJobSpec,
        reporter: &EventReporter,
    ) -> Result<RenderOutcome, RenderError> {
        job.validate()?;

        let started = Instant::now();
        let workers = job.effective_workers();
        let frames = job.frame_count();
        reporter.start(job.composition_id.clone(), job.codec, frames);
        info!(
            composition = %job.composition_id,
            codec = %job.codec,
            frames,
            workers,
            output = %job.output_path.display(),
            "Render started"
        );

        let scratch = self
            .settings
            .temp_dir
            .join(format!("job-{}", Uuid::new_v4()));
        let result = match tokio::fs::create_dir_all(&scratch).await {
            Ok(()) => self.run(job, workers, &scratch, reporter).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            debug!(path = %scratch.display(), error = %e, "Failed to remove scratch directory");
        }

        match result {
            Ok(rendered) => {
                let filename = file_name_of(&rendered.output_path);
                let duration_ms = started.elapsed().as_millis() as u64;
                reporter.complete(
                    rendered.output_path.clone(),
                    self.settings.download_url(&filename),
                    filename.clone(),
                    duration_ms,
                );
                info!(
                    composition = %job.composition_id,
                    output = %rendered.output_path.display(),
                    duration_ms,
                    "Render complete"
                );
                Ok(RenderOutcome {
                    output_path: rendered.output_path,
                    filename,
                    frames,
                    workers,
                    duration_ms,
                    audio_tracks_mixed: rendered.audio_tracks_mixed,
                    warnings: rendered.warnings,
                })
            }
            Err(e) => {
                error!(composition = %job.composition_id, error = %e, "Render failed");
                reporter.error(e.to_string());
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        job: &RenderJobSpec,
        workers: usize,
        scratch: &Path,
        reporter: &EventReporter,
    ) -> Result<Rendered, RenderError> {
        if let Some(parent) = job.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let ctx = JobContext {
            job,
            scene: SceneRef::for_job(job, self.settings.serve_url.clone()),
            scratch,
            progress: ProgressAggregator::new(workers, job.frame_count()),
            reporter,
        };

        if job.sequence {
            self.render_sequence(&ctx).await
        } else if job.codec.is_palette_format() {
            self.render_gif(&ctx).await
        } else if workers == 1 {
            self.render_single(&ctx).await
        } else {
            self.render_parallel(&ctx, workers).await
        }
    }

    async fn render_sequence(&self, ctx: &JobContext<'_>) -> Result<Rendered, RenderError> {
        let job = ctx.job;
        let created = !tokio::fs::try_exists(&job.output_path).await?;
        tokio::fs::create_dir_all(&job.output_path).await?;

        let naming = StillNaming::new("element-", job.end_frame, job.image_format);
        let plan = TargetPlan::Stills {
            dir: job.output_path.clone(),
            naming,
        };
        if let Err(e) = self.run_worker(ctx, 0, job.frame_range(), plan, false).await {
            // The worker already removed its stills; only an empty directory is left
            if created {
                if let Err(remove_err) = tokio::fs::remove_dir(&job.output_path).await {
                    debug!(path = %job.output_path.display(), error = %remove_err, "Output directory kept");
                }
            }
            return Err(e);
        }

        Ok(Rendered {
            output_path: job.output_path.clone(),
            audio_tracks_mixed: 0,
            warnings: Vec::new(),
        })
    }

    async fn render_gif(&self, ctx: &JobContext<'_>) -> Result<Rendered, RenderError> {
        let job = ctx.job;
        let frames_dir = ctx.scratch.join("frames");
        tokio::fs::create_dir_all(&frames_dir).await?;

        let naming = StillNaming::new("frame-", job.end_frame, job.image_format);
        let plan = TargetPlan::Stills {
            dir: frames_dir.clone(),
            naming: naming.clone(),
        };
        self.run_worker(ctx, 0, job.frame_range(), plan, false)
            .await?;

        ctx.reporter.status("Encoding GIF");
        let (width, height) = job.output_dimensions();
        let palette = ctx.scratch.join("palette.png");
        let stills = EncodeRequest::pipe(
            job.codec,
            job.image_format,
            &palette,
            job.start_frame,
            job.frame_count(),
        )
        .with_fps(job.fps)
        .with_size(width, height)
        .with_input(EncodeInput::ImageSequence {
            pattern: frames_dir.join(naming.pattern()),
            start_number: job.start_frame,
            image_format: job.image_format,
        });

        self.encoder
            .encode(stills.clone().with_mode(EncodeMode::PaletteGen))
            .await?;
        debug!(palette = %palette.display(), "Palette generated");

        let encoded = ctx
            .scratch
            .join(format!("output.{}", job.codec.profile().container_extension));
        self.encoder
            .encode(
                EncodeRequest {
                    output_path: encoded.clone(),
                    ..stills
                }
                .with_mode(EncodeMode::PaletteUse {
                    palette_path: palette,
                }),
            )
            .await?;

        move_file(&encoded, &job.output_path).await?;
        Ok(Rendered {
            output_path: job.output_path.clone(),
            audio_tracks_mixed: 0,
            warnings: Vec::new(),
        })
    }

    async fn render_single(&self, ctx: &JobContext<'_>) -> Result<Rendered, RenderError> {
        let job = ctx.job;
        let ext = job.codec.profile().container_extension;
        let plan = TargetPlan::Segment(ctx.scratch.join(format!("video.{}", ext)));
        let output = self
            .run_worker(ctx, 0, job.frame_range(), plan, !job.muted)
            .await?;

        let Some(segment) = output.segment else {
            return Err(RenderError::WorkerFailure {
                worker_index: 0,
                frame: None,
                message: "worker produced no video".to_string(),
            });
        };

        let mut video = segment.path;
        let mut audio_tracks_mixed = 0;
        let mut warnings = Vec::new();
        let tracks = output.audio_tracks;

        if !job.muted && !tracks.is_empty() {
            if job.codec.profile().audio_codec.is_none() {
                debug!(codec = %job.codec, "Codec carries no audio, skipping mix");
            } else {
                ctx.reporter
                    .status(format!("Mixing {} audio track(s)", tracks.len()));
                let mixed = ctx.scratch.join(format!("mixed.{}", ext));
                match audio::mix(self.encoder.as_ref(), &video, &tracks, &mixed, job).await {
                    Ok(count) => {
                        audio_tracks_mixed = count;
                        video = mixed;
                    }
                    Err(e) => {
                        let warning = RenderError::AudioMixFailure(e.to_string()).to_string();
                        warn!(error = %e, "Audio mix failed, keeping video without audio");
                        ctx.reporter.status(warning.clone());
                        warnings.push(warning);
                    }
                }
            }
        }

        move_file(&video, &job.output_path).await?;
        Ok(Rendered {
            output_path: job.output_path.clone(),
            audio_tracks_mixed,
            warnings,
        })
    }

    async fn render_parallel(
        &self,
        ctx: &JobContext<'_>,
        workers: usize,
    ) -> Result<Rendered, RenderError> {
        let job = ctx.job;
        let ext = job.codec.profile().container_extension;
        let ranges = partition_frames(job.start_frame, job.end_frame, workers);

        let mut warnings = Vec::new();
        if !job.muted {
            let warning = format!(
                "Audio is not collected when rendering with {} workers; output has no audio",
                ranges.len()
            );
            warn!(workers = ranges.len(), "Audio is not collected for parallel renders");
            ctx.reporter.status(warning.clone());
            warnings.push(warning);
        }

        let outputs = try_join_all(ranges.iter().enumerate().map(|(index, range)| {
            let plan = TargetPlan::Segment(
                ctx.scratch
                    .join(format!("segment-{:03}.{}", index, ext)),
            );
            self.run_worker(ctx, index, *range, plan, false)
        }))
        .await?;

        let mut segments: Vec<Segment> = outputs.into_iter().filter_map(|o| o.segment).collect();
        segments.sort_by_key(|s| s.worker_index);
        let paths: Vec<PathBuf> = segments.iter().map(|s| s.path.clone()).collect();

        ctx.reporter
            .status(format!("Merging {} segments", segments.len()));
        let merged = ctx.scratch.join(format!("merged.{}", ext));
        self.encoder.concat(&paths, &merged).await?;
        for path in &paths {
            if let Err(e) = tokio::fs::remove_file(path).await {
                debug!(path = %path.display(), error = %e, "Failed to remove segment");
            }
        }
        info!(segments = paths.len(), "Segments merged");

        move_file(&merged, &job.output_path).await?;
        Ok(Rendered {
            output_path: job.output_path.clone(),
            audio_tracks_mixed: 0,
            warnings,
        })
    }

    /// Launches a renderer, renders `range` into `plan` and disposes the renderer.
    async fn run_worker(
        &self,
        ctx: &JobContext<'_>,
        worker_index: usize,
        range: FrameRange,
        plan: TargetPlan,
        collect_audio: bool,
    ) -> Result<WorkerOutput, RenderError> {
        let job = ctx.job;
        let mut driver = FrameDriver::launch(self.launcher.as_ref(), worker_index, self.settings.timeouts)
            .await
            .map_err(|e| RenderError::from_load(worker_index, e))?;

        if let Err(e) = driver.load(&ctx.scene).await {
            if let Err(close_err) = driver.dispose().await {
                debug!(worker = worker_index, error = %close_err, "Failed to close renderer");
            }
            return Err(RenderError::from_load(worker_index, e));
        }

        let target = match plan {
            TargetPlan::Segment(output_path) => {
                let (width, height) = job.output_dimensions();
                let request = EncodeRequest::pipe(
                    job.codec,
                    job.image_format,
                    &output_path,
                    range.start,
                    range.len(),
                )
                .with_quality(job.quality.clone())
                .with_fps(job.fps)
                .with_size(width, height);
                let session = match self.encoder.begin(request).await {
                    Ok(session) => session,
                    Err(e) => {
                        if let Err(close_err) = driver.dispose().await {
                            warn!(worker = worker_index, error = %close_err, "Failed to close renderer");
                        }
                        return Err(e.into());
                    }
                };
                FrameTarget::Encode {
                    session,
                    output_path,
                }
            }
            TargetPlan::Stills { dir, naming } => FrameTarget::Stills { dir, naming },
        };

        let options = WorkerOptions {
            worker_index,
            range,
            image_format: job.image_format,
            jpeg_quality: job.jpeg_quality,
            scratch_dir: ctx.scratch.to_path_buf(),
            collect_audio,
        };
        let total = ctx.progress.total();
        let result = render_range(&mut driver, target, &options, |done| {
            let sum = ctx.progress.update(worker_index, done);
            ctx.reporter.progress(sum, total);
        })
        .await;

        if let Err(e) = driver.dispose().await {
            warn!(worker = worker_index, error = %e, "Failed to close renderer");
        }
        Ok(result?)
    }
}

/// Renames `from` to `to`, copying when they are on different filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}
