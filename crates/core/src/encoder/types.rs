//! Types for encoder requests and results.

use std::path::PathBuf;

use super::codec::Codec;
use crate::audio::MixPlan;
use crate::job::Quality;
use crate::renderer::ImageFormat;

/// Where the encoder reads frames from.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeInput {
    /// Frames are pushed one by one as encoded images.
    Pipe { image_format: ImageFormat },
    /// Frames already sit on disk as a numbered image sequence.
    ImageSequence {
        /// printf-style pattern, e.g. `/tmp/job/frame-%04d.png`.
        pattern: PathBuf,
        start_number: u64,
        image_format: ImageFormat,
    },
}

impl EncodeInput {
    pub fn image_format(&self) -> ImageFormat {
        match self {
            Self::Pipe { image_format } | Self::ImageSequence { image_format, .. } => {
                *image_format
            }
        }
    }

    pub fn is_pipe(&self) -> bool {
        matches!(self, Self::Pipe { .. })
    }
}

/// What a single encoder pass produces.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeMode {
    /// Encode straight into the codec's container.
    Direct,
    /// First palette pass: analyze the frames and write a palette image.
    PaletteGen,
    /// Second palette pass: encode the frames against `palette_path`.
    PaletteUse { palette_path: PathBuf },
}

/// One encoder pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub codec: Codec,
    pub quality: Option<Quality>,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub input: EncodeInput,
    pub mode: EncodeMode,
    pub output_path: PathBuf,
    /// First frame number the session expects.
    pub first_frame: u64,
    /// Number of frames the pass must receive.
    pub frame_count: u64,
}

impl EncodeRequest {
    /// A direct pipe encode of `frame_count` frames starting at `first_frame`.
    pub fn pipe(
        codec: Codec,
        image_format: ImageFormat,
        output_path: impl Into<PathBuf>,
        first_frame: u64,
        frame_count: u64,
    ) -> Self {
        Self {
            codec,
            quality: None,
            fps: 30.0,
            width: 1920,
            height: 1080,
            input: EncodeInput::Pipe { image_format },
            mode: EncodeMode::Direct,
            output_path: output_path.into(),
            first_frame,
            frame_count,
        }
    }

    pub fn with_quality(mut self, quality: Option<Quality>) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_input(mut self, input: EncodeInput) -> Self {
        self.input = input;
        self
    }

    pub fn with_mode(mut self, mode: EncodeMode) -> Self {
        self.mode = mode;
        self
    }
}

/// A finished encoder pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedOutput {
    pub path: PathBuf,
    pub frames: u64,
}

/// Mux a mixed audio plan into an already encoded video.
#[derive(Debug, Clone, PartialEq)]
pub struct MuxRequest {
    pub video_path: PathBuf,
    pub plan: MixPlan,
    pub output_path: PathBuf,
    /// Output is trimmed to this length.
    pub duration_secs: f64,
    pub codec: Codec,
}
