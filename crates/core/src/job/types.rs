//! Render job model.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::error::ValidationError;
use crate::encoder::Codec;
use crate::renderer::ImageFormat;

/// Upper bound on the frames of one job.
pub const MAX_FRAME_COUNT: u64 = 10_000_000;

/// An inclusive range of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: u64,
    pub end: u64,
}

impl FrameRange {
    /// Creates `[start, end]`, rejecting reversed bounds.
    pub fn new(start: u64, end: u64) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidFrameRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Number of frames in the range (never zero). Saturates for `0..=u64::MAX`.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, frame: u64) -> bool {
        frame >= self.start && frame <= self.end
    }

    /// Frames in ascending order.
    pub fn iter(&self) -> std::ops::RangeInclusive<u64> {
        self.start..=self.end
    }

    /// Parses `"start-end"` or a single `"frame"`.
    pub fn parse(spec: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidFrameSpec(spec.to_string());
        let trimmed = spec.trim();
        match trimmed.split_once('-') {
            Some((start, end)) => {
                let start = start.trim().parse::<u64>().map_err(|_| invalid())?;
                let end = end.trim().parse::<u64>().map_err(|_| invalid())?;
                Self::new(start, end)
            }
            None => {
                let frame = trimmed.parse::<u64>().map_err(|_| invalid())?;
                Self::new(frame, frame)
            }
        }
    }
}

/// Encoder quality control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Constant rate factor.
    Crf(u8),
    /// Target bitrate such as `"5M"` or `"800k"`.
    Bitrate(String),
}

impl Quality {
    pub fn validate(&self, codec: Codec) -> Result<(), ValidationError> {
        match self {
            Self::Crf(crf) => codec.profile().validate_crf(*crf),
            Self::Bitrate(bitrate) => {
                let re = Regex::new(r"^[0-9]+(\.[0-9]+)?[kKmM]?$")
                    .map_err(|_| ValidationError::InvalidBitrate(bitrate.clone()))?;
                if re.is_match(bitrate) {
                    Ok(())
                } else {
                    Err(ValidationError::InvalidBitrate(bitrate.clone()))
                }
            }
        }
    }
}

/// A fully resolved render job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJobSpec {
    pub composition_id: String,
    /// Passed through to the scene untouched.
    pub input_props: Value,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub start_frame: u64,
    /// Inclusive.
    pub end_frame: u64,
    pub codec: Codec,
    /// `None` uses the codec's default crf when it has one.
    pub quality: Option<Quality>,
    pub scale: f64,
    pub muted: bool,
    /// Output file, or the output directory in sequence mode.
    pub output_path: PathBuf,
    /// Number of frame workers (K).
    pub concurrency: usize,
    /// Write stills instead of a video.
    pub sequence: bool,
    pub image_format: ImageFormat,
    pub jpeg_quality: u8,
}

impl RenderJobSpec {
    /// Creates a job with 1920x1080@30, h264, one frame and one worker.
    pub fn new(composition_id: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            composition_id: composition_id.into(),
            input_props: Value::Object(Default::default()),
            width: 1920,
            height: 1080,
            fps: 30.0,
            start_frame: 0,
            end_frame: 0,
            codec: Codec::H264,
            quality: None,
            scale: 1.0,
            muted: false,
            output_path: output_path.into(),
            concurrency: 1,
            sequence: false,
            image_format: ImageFormat::Png,
            jpeg_quality: 80,
        }
    }

    pub fn with_frames(mut self, start: u64, end: u64) -> Self {
        self.start_frame = start;
        self.end_frame = end;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_props(mut self, props: Value) -> Self {
        self.input_props = props;
        self
    }

    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn with_sequence(mut self, sequence: bool) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn frame_range(&self) -> FrameRange {
        FrameRange {
            start: self.start_frame,
            end: self.end_frame,
        }
    }

    /// Total frames; only meaningful after validation.
    pub fn frame_count(&self) -> u64 {
        self.frame_range().len()
    }

    /// Frame size after applying `scale`.
    pub fn output_dimensions(&self) -> (u32, u32) {
        (
            (f64::from(self.width) * self.scale).round() as u32,
            (f64::from(self.height) * self.scale).round() as u32,
        )
    }

    /// Whether the job must run on exactly one worker.
    pub fn requires_single_worker(&self) -> bool {
        self.concurrency <= 1 || self.codec.is_palette_format() || self.sequence
    }

    /// Worker count actually used, clamped to the number of frames.
    pub fn effective_workers(&self) -> usize {
        if self.requires_single_worker() {
            return 1;
        }
        let frames = usize::try_from(self.frame_count()).unwrap_or(usize::MAX);
        self.concurrency.min(frames).max(1)
    }

    /// File name of the output, used for events and download links.
    pub fn output_filename(&self) -> String {
        file_name_of(&self.output_path)
    }

    /// Checks every invariant of the job.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let frames = FrameRange::new(self.start_frame, self.end_frame)?.len();
        if frames > MAX_FRAME_COUNT {
            return Err(ValidationError::TooManyFrames {
                frames,
                max: MAX_FRAME_COUNT,
            });
        }

        if self.width == 0 || self.height == 0 {
            return Err(ValidationError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(ValidationError::InvalidFps(self.fps));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ValidationError::InvalidScale(self.scale));
        }
        if self.concurrency == 0 {
            return Err(ValidationError::InvalidConcurrency);
        }
        if self.jpeg_quality > 100 {
            return Err(ValidationError::InvalidJpegQuality(self.jpeg_quality));
        }
        if !self.input_props.is_object() {
            return Err(ValidationError::InvalidProps(
                "expected an object".to_string(),
            ));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ValidationError::InvalidOutputPath(self.output_path.clone()));
        }

        let (width, height) = self.output_dimensions();
        if width == 0 || height == 0 {
            return Err(ValidationError::InvalidDimensions { width, height });
        }

        if self.sequence {
            if self.codec.is_palette_format() {
                return Err(ValidationError::SequenceWithPaletteCodec(self.codec));
            }
            return Ok(());
        }

        let profile = self.codec.profile();
        if profile.requires_even_dimensions() && (width % 2 != 0 || height % 2 != 0) {
            return Err(ValidationError::OddDimensions {
                codec: self.codec,
                width,
                height,
            });
        }
        if let Some(quality) = &self.quality {
            quality.validate(self.codec)?;
        }
        Ok(())
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> RenderJobSpec {
        RenderJobSpec::new("intro", "/out/intro.mp4").with_frames(0, 59)
    }

    #[test]
    fn test_frame_range_parse() {
        assert_eq!(FrameRange::parse("0-59").unwrap(), FrameRange { start: 0, end: 59 });
        assert_eq!(FrameRange::parse("12").unwrap(), FrameRange { start: 12, end: 12 });
        assert_eq!(FrameRange::parse(" 3 - 4 ").unwrap().len(), 2);
        assert!(matches!(
            FrameRange::parse("9-3"),
            Err(ValidationError::InvalidFrameRange { start: 9, end: 3 })
        ));
        assert!(matches!(
            FrameRange::parse("a-b"),
            Err(ValidationError::InvalidFrameSpec(_))
        ));
    }

    #[test]
    fn test_valid_job() {
        assert!(job().validate().is_ok());
        assert_eq!(job().frame_count(), 60);
        assert_eq!(job().output_filename(), "intro.mp4");
    }

    #[test]
    fn test_reversed_range_rejected() {
        let job = job().with_frames(10, 5);
        assert!(matches!(
            job.validate(),
            Err(ValidationError::InvalidFrameRange { .. })
        ));
    }

    #[test]
    fn test_extreme_frame_numbers() {
        let job = job().with_frames(0, u64::MAX);
        assert_eq!(job.frame_count(), u64::MAX);
        assert!(matches!(
            job.validate(),
            Err(ValidationError::TooManyFrames { frames: u64::MAX, .. })
        ));

        let job = self::job().with_frames(u64::MAX, u64::MAX);
        assert!(job.validate().is_ok());
        assert_eq!(job.frame_count(), 1);

        assert!(self::job()
            .with_frames(0, MAX_FRAME_COUNT)
            .validate()
            .is_err());
        assert!(self::job()
            .with_frames(1, MAX_FRAME_COUNT)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_zero_dimensions_and_fps_rejected() {
        assert!(job().with_size(0, 1080).validate().is_err());
        assert!(matches!(
            job().with_fps(0.0).validate(),
            Err(ValidationError::InvalidFps(_))
        ));
        assert!(matches!(
            job().with_fps(f64::NAN).validate(),
            Err(ValidationError::InvalidFps(_))
        ));
    }

    #[test]
    fn test_odd_scaled_dimensions_rejected_for_yuv420() {
        let job = job().with_size(1920, 1080).with_scale(0.5005);
        assert!(matches!(
            job.validate(),
            Err(ValidationError::OddDimensions { .. })
        ));

        let gif = RenderJobSpec::new("intro", "/out/intro.gif")
            .with_codec(Codec::Gif)
            .with_size(333, 333);
        assert!(gif.validate().is_ok());
    }

    #[test]
    fn test_gif_crf_rejected() {
        let job = RenderJobSpec::new("intro", "/out/intro.gif")
            .with_codec(Codec::Gif)
            .with_quality(Quality::Crf(10));
        assert!(matches!(
            job.validate(),
            Err(ValidationError::CrfNotSupported { codec: Codec::Gif })
        ));
    }

    #[test]
    fn test_bitrate_validation() {
        assert!(Quality::Bitrate("5M".into()).validate(Codec::H264).is_ok());
        assert!(Quality::Bitrate("800k".into()).validate(Codec::Gif).is_ok());
        assert!(Quality::Bitrate("2.5M".into()).validate(Codec::Vp9).is_ok());
        assert!(Quality::Bitrate("fast".into()).validate(Codec::H264).is_err());
    }

    #[test]
    fn test_effective_workers() {
        assert_eq!(job().with_concurrency(3).effective_workers(), 3);
        assert_eq!(job().with_frames(0, 1).with_concurrency(8).effective_workers(), 2);
        assert_eq!(
            job().with_codec(Codec::Gif).with_concurrency(4).effective_workers(),
            1
        );
        assert_eq!(job().with_sequence(true).with_concurrency(4).effective_workers(), 1);
    }

    #[test]
    fn test_props_must_be_object() {
        let job = job().with_props(json!([1, 2, 3]));
        assert!(matches!(
            job.validate(),
            Err(ValidationError::InvalidProps(_))
        ));
    }
}
