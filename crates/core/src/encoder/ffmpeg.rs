//! FFmpeg-based encoder implementation.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::codec::Codec;
use super::config::EncoderConfig;
use super::error::EncoderError;
use super::traits::{Encoder, EncoderSession};
use super::types::{EncodeInput, EncodeMode, EncodeRequest, EncodedOutput, MuxRequest};
use crate::job::Quality;

/// Lines of ffmpeg stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Bitrate ceiling for VP8 encodes driven by crf.
const VP8_CRF_BITRATE_CAP: &str = "10M";

/// FFmpeg-based encoder implementation.
pub struct FfmpegEncoder {
    config: EncoderConfig,
}

impl FfmpegEncoder {
    /// Creates a new FFmpeg encoder with the given configuration.
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Creates an encoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EncoderConfig::default())
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    fn base_args(&self) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
        ]
    }

    /// Builds ffmpeg arguments for one encoder pass.
    fn build_encode_args(&self, request: &EncodeRequest) -> Vec<String> {
        let mut args = self.base_args();
        let fps = format_fps(request.fps);
        let scale = format!("scale={}:{}", request.width, request.height);

        match &request.input {
            EncodeInput::Pipe { image_format } => {
                args.extend([
                    "-f".to_string(),
                    "image2pipe".to_string(),
                    "-framerate".to_string(),
                    fps,
                    "-c:v".to_string(),
                    image_format.ffmpeg_input_codec().to_string(),
                    "-i".to_string(),
                    "pipe:0".to_string(),
                ]);
            }
            EncodeInput::ImageSequence {
                pattern,
                start_number,
                ..
            } => {
                args.extend([
                    "-framerate".to_string(),
                    fps,
                    "-start_number".to_string(),
                    start_number.to_string(),
                    "-i".to_string(),
                    pattern.to_string_lossy().to_string(),
                ]);
            }
        }

        match &request.mode {
            EncodeMode::PaletteGen => {
                args.extend([
                    "-vf".to_string(),
                    format!("{},palettegen=stats_mode=full", scale),
                    "-frames:v".to_string(),
                    "1".to_string(),
                    "-update".to_string(),
                    "1".to_string(),
                ]);
            }
            EncodeMode::PaletteUse { palette_path } => {
                args.extend([
                    "-i".to_string(),
                    palette_path.to_string_lossy().to_string(),
                    "-lavfi".to_string(),
                    format!("[0:v]{}[frames];[frames][1:v]paletteuse=dither=sierra2_4a", scale),
                    "-loop".to_string(),
                    "0".to_string(),
                ]);
            }
            EncodeMode::Direct => {
                args.extend(["-vf".to_string(), scale]);
                self.push_codec_args(&mut args, request);
            }
        }

        args.push("-an".to_string());
        args.extend(self.config.extra_args.iter().cloned());
        args.push(request.output_path.to_string_lossy().to_string());
        args
    }

    /// Codec, pixel format and quality for a direct encode.
    fn push_codec_args(&self, args: &mut Vec<String>, request: &EncodeRequest) {
        let profile = request.codec.profile();
        args.extend([
            "-c:v".to_string(),
            profile.encoder_name.to_string(),
            "-pix_fmt".to_string(),
            profile.pixel_format.to_string(),
        ]);

        let crf = match &request.quality {
            Some(Quality::Crf(crf)) => Some(*crf),
            Some(Quality::Bitrate(bitrate)) => {
                args.extend(["-b:v".to_string(), bitrate.clone()]);
                None
            }
            None => profile.default_crf,
        };
        if let Some(crf) = crf.filter(|_| profile.supports_crf) {
            args.extend(["-crf".to_string(), crf.to_string()]);
            match request.codec {
                // Zero target bitrate makes libvpx-vp9 constant quality
                Codec::Vp9 => args.extend(["-b:v".to_string(), "0".to_string()]),
                // libvpx (VP8) treats crf as a floor under a nonzero bitrate cap
                Codec::Vp8 => {
                    args.extend(["-b:v".to_string(), VP8_CRF_BITRATE_CAP.to_string()])
                }
                _ => {}
            }
        }

        match request.codec {
            Codec::Prores => args.extend(["-profile:v".to_string(), "3".to_string()]),
            Codec::H265 => args.extend(["-tag:v".to_string(), "hvc1".to_string()]),
            _ => {}
        }
        if profile.container_extension == "mp4" {
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }
    }

    /// Builds ffmpeg arguments for a lossless concat of a list file.
    fn build_concat_args(&self, list_path: &Path, output: &Path) -> Vec<String> {
        let mut args = self.base_args();
        args.extend([
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_path.to_string_lossy().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }

    /// Builds ffmpeg arguments for muxing mixed audio into a video.
    fn build_mux_args(&self, request: &MuxRequest) -> Result<Vec<String>, EncoderError> {
        let audio_codec = request.codec.profile().audio_codec.ok_or_else(|| {
            EncoderError::invalid_request(format!("codec {} carries no audio", request.codec))
        })?;

        let mut args = self.base_args();
        args.extend([
            "-i".to_string(),
            request.video_path.to_string_lossy().to_string(),
        ]);
        args.extend(request.plan.input_args());
        args.extend([
            "-filter_complex".to_string(),
            request.plan.filter_graph.clone(),
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            format!("[{}]", request.plan.output_label),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            audio_codec.to_string(),
            "-t".to_string(),
            format!("{:.3}", request.duration_secs),
        ]);
        args.push(request.output_path.to_string_lossy().to_string());
        Ok(args)
    }

    fn spawn_error(&self, e: std::io::Error) -> EncoderError {
        if e.kind() == std::io::ErrorKind::NotFound {
            EncoderError::FfmpegNotFound {
                path: self.config.ffmpeg_path.clone(),
            }
        } else {
            EncoderError::Io(e)
        }
    }

    /// Runs ffmpeg to completion without stdin.
    async fn run(&self, args: &[String], output: &Path) -> Result<(), EncoderError> {
        debug!(ffmpeg = %self.config.ffmpeg_path.display(), ?args, "Running ffmpeg");
        let result = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !result.status.success() {
            let stderr = tail(&String::from_utf8_lossy(&result.stderr));
            return Err(EncoderError::encoding_failed(
                format!("ffmpeg exited with code: {:?}", result.status.code()),
                (!stderr.is_empty()).then_some(stderr),
            ));
        }
        if tokio::fs::metadata(output).await.is_err() {
            return Err(EncoderError::OutputMissing {
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn begin(&self, request: EncodeRequest) -> Result<Box<dyn EncoderSession>, EncoderError> {
        if request.frame_count == 0 {
            return Err(EncoderError::invalid_request("frame_count must be at least 1"));
        }
        if let Some(parent) = request.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let args = self.build_encode_args(&request);
        debug!(
            codec = %request.codec,
            mode = ?request.mode,
            output = %request.output_path.display(),
            ?args,
            "Starting ffmpeg pass"
        );

        let pipe = request.input.is_pipe();
        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(if pipe { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdin = child.stdin.take();
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "framecast::ffmpeg", "{}", line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Vec::from(tail).join("\n")
            })
        });

        Ok(Box::new(FfmpegSession {
            child,
            stdin,
            stderr_task,
            pipe,
            next_frame: request.first_frame,
            written: 0,
            expected: request.frame_count,
            output_path: request.output_path,
        }))
    }

    async fn concat(&self, segments: &[PathBuf], output: &Path) -> Result<(), EncoderError> {
        if segments.is_empty() {
            return Err(EncoderError::invalid_request("no segments to concatenate"));
        }

        let list_path = output.with_extension("concat.txt");
        tokio::fs::write(&list_path, concat_list(segments)).await?;
        let args = self.build_concat_args(&list_path, output);
        let result = self.run(&args, output).await;
        let _ = tokio::fs::remove_file(&list_path).await;
        result?;

        info!(
            segments = segments.len(),
            output = %output.display(),
            "Concatenated segments"
        );
        Ok(())
    }

    async fn mux_audio(&self, request: MuxRequest) -> Result<(), EncoderError> {
        if request.plan.inputs.is_empty() {
            return Err(EncoderError::invalid_request("mix plan has no tracks"));
        }
        let args = self.build_mux_args(&request)?;
        self.run(&args, &request.output_path).await
    }

    async fn validate(&self) -> Result<(), EncoderError> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(EncoderError::encoding_failed(
                "ffmpeg -version failed",
                Some(tail(&String::from_utf8_lossy(&output.stderr))),
            ));
        }
        Ok(())
    }
}

/// A running ffmpeg pass.
struct FfmpegSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    pipe: bool,
    next_frame: u64,
    written: u64,
    expected: u64,
    output_path: PathBuf,
}

#[async_trait]
impl EncoderSession for FfmpegSession {
    async fn push_frame(&mut self, frame: u64, bytes: Vec<u8>) -> Result<(), EncoderError> {
        if !self.pipe {
            return Err(EncoderError::invalid_request(
                "frames cannot be pushed into an image sequence pass",
            ));
        }
        if frame != self.next_frame {
            return Err(EncoderError::OutOfOrderFrame {
                expected: self.next_frame,
                got: frame,
            });
        }
        let stdin = self.stdin.as_mut().ok_or(EncoderError::InputClosed)?;
        if let Err(e) = stdin.write_all(&bytes).await {
            self.stdin = None;
            return Err(if e.kind() == std::io::ErrorKind::BrokenPipe {
                EncoderError::InputClosed
            } else {
                EncoderError::Io(e)
            });
        }
        self.next_frame += 1;
        self.written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }

    async fn finish(self: Box<Self>) -> Result<EncodedOutput, EncoderError> {
        let mut session = *self;
        if session.pipe && session.written < session.expected {
            let _ = session.child.kill().await;
            return Err(EncoderError::IncompleteInput {
                expected: session.expected,
                written: session.written,
            });
        }

        if let Some(mut stdin) = session.stdin.take() {
            stdin.shutdown().await.ok();
        }
        let status = session.child.wait().await?;
        let stderr = match session.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(EncoderError::encoding_failed(
                format!("ffmpeg exited with code: {:?}", status.code()),
                (!stderr.is_empty()).then_some(stderr),
            ));
        }
        if tokio::fs::metadata(&session.output_path).await.is_err() {
            return Err(EncoderError::OutputMissing {
                path: session.output_path,
            });
        }

        Ok(EncodedOutput {
            path: session.output_path,
            frames: session.expected,
        })
    }
}

/// Concat demuxer list with one quoted `file` line per segment.
fn concat_list(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

/// Integral rates print without a fraction.
fn format_fps(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u64)
    } else {
        format!("{}", fps)
    }
}

fn tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
