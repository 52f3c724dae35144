//! Validation errors raised before any subprocess starts.

use std::path::PathBuf;
use thiserror::Error;

use crate::encoder::Codec;

/// A malformed job parameter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("compositionId must not be empty")]
    MissingCompositionId,

    #[error("start frame {start} is after end frame {end}")]
    InvalidFrameRange { start: u64, end: u64 },

    #[error("invalid frame range '{0}', expected 'start-end' or a single frame")]
    InvalidFrameSpec(String),

    #[error("{frames} frames requested, at most {max} can be rendered in one job")]
    TooManyFrames { frames: u64, max: u64 },

    #[error("either endFrame or durationInFrames is required")]
    MissingEndFrame,

    #[error("width and height must be positive, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("codec {codec} needs even dimensions, got {width}x{height} after scaling")]
    OddDimensions { codec: Codec, width: u32, height: u32 },

    #[error("fps must be a positive number, got {0}")]
    InvalidFps(f64),

    #[error("scale must be a positive number, got {0}")]
    InvalidScale(f64),

    #[error("unknown codec '{0}', expected one of h264, h265, vp8, vp9, prores, gif")]
    UnknownCodec(String),

    #[error("codec {codec} does not accept a crf value")]
    CrfNotSupported { codec: Codec },

    #[error("crf {crf} is outside {min}..={max} for codec {codec}")]
    CrfOutOfRange {
        codec: Codec,
        crf: u8,
        min: u8,
        max: u8,
    },

    #[error("invalid bitrate '{0}', expected a number with an optional k/M suffix")]
    InvalidBitrate(String),

    #[error("crf and bitrate are mutually exclusive")]
    ConflictingQuality,

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("jpeg quality must be within 0..=100, got {0}")]
    InvalidJpegQuality(u8),

    #[error("unknown image format '{0}', expected png or jpeg")]
    UnknownImageFormat(String),

    #[error("image sequence output cannot use codec {0}")]
    SequenceWithPaletteCodec(Codec),

    #[error("inputProps must be a JSON object: {0}")]
    InvalidProps(String),

    #[error("invalid output pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("batch row {row} has no value for '{{{field}}}'")]
    UnknownPatternField { field: String, row: usize },

    #[error("batch row {row} is not a JSON object")]
    InvalidRow { row: usize },

    #[error("rows {first} and {second} both resolve to '{filename}'")]
    DuplicateOutput {
        filename: String,
        first: usize,
        second: usize,
    },

    #[error("output path '{0}' is not usable")]
    InvalidOutputPath(PathBuf),
}
