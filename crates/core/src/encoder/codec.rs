//! Fixed codec table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::job::ValidationError;

/// Output codec of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264 in MP4.
    H264,
    /// H.265 / HEVC in MP4.
    H265,
    /// VP8 in WebM.
    Vp8,
    /// VP9 in WebM.
    Vp9,
    /// Apple ProRes in QuickTime.
    Prores,
    /// Animated GIF (palette-limited).
    Gif,
}

impl Codec {
    /// Every supported codec, in table order.
    pub const ALL: [Codec; 6] = [
        Codec::H264,
        Codec::H265,
        Codec::Vp8,
        Codec::Vp9,
        Codec::Prores,
        Codec::Gif,
    ];

    /// The identifier used on the command line and in requests.
    pub fn id(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
            Self::Prores => "prores",
            Self::Gif => "gif",
        }
    }

    /// Returns the profile row for this codec.
    pub fn profile(&self) -> &'static CodecProfile {
        match self {
            Self::H264 => &PROFILES[0],
            Self::H265 => &PROFILES[1],
            Self::Vp8 => &PROFILES[2],
            Self::Vp9 => &PROFILES[3],
            Self::Prores => &PROFILES[4],
            Self::Gif => &PROFILES[5],
        }
    }

    /// Whether this codec needs the two-pass palette technique.
    pub fn is_palette_format(&self) -> bool {
        matches!(self, Self::Gif)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Codec {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Codec::ALL
            .into_iter()
            .find(|c| c.id() == needle)
            .ok_or_else(|| ValidationError::UnknownCodec(s.to_string()))
    }
}

/// Encoder parameters for one codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecProfile {
    pub codec: Codec,
    /// ffmpeg encoder name.
    pub encoder_name: &'static str,
    /// Output container extension (no dot).
    pub container_extension: &'static str,
    /// Pixel format passed to `-pix_fmt`.
    pub pixel_format: &'static str,
    pub supports_crf: bool,
    pub default_crf: Option<u8>,
    /// Inclusive crf bounds accepted by the encoder.
    pub crf_range: Option<(u8, u8)>,
    /// Audio codec used when muxing mixed audio, `None` for silent-only formats.
    pub audio_codec: Option<&'static str>,
}

static PROFILES: [CodecProfile; 6] = [
    CodecProfile {
        codec: Codec::H264,
        encoder_name: "libx264",
        container_extension: "mp4",
        pixel_format: "yuv420p",
        supports_crf: true,
        default_crf: Some(18),
        crf_range: Some((1, 51)),
        audio_codec: Some("aac"),
    },
    CodecProfile {
        codec: Codec::H265,
        encoder_name: "libx265",
        container_extension: "mp4",
        pixel_format: "yuv420p",
        supports_crf: true,
        default_crf: Some(23),
        crf_range: Some((0, 51)),
        audio_codec: Some("aac"),
    },
    CodecProfile {
        codec: Codec::Vp8,
        encoder_name: "libvpx",
        container_extension: "webm",
        pixel_format: "yuv420p",
        supports_crf: true,
        default_crf: Some(9),
        crf_range: Some((4, 63)),
        audio_codec: Some("libopus"),
    },
    CodecProfile {
        codec: Codec::Vp9,
        encoder_name: "libvpx-vp9",
        container_extension: "webm",
        pixel_format: "yuv420p",
        supports_crf: true,
        default_crf: Some(28),
        crf_range: Some((0, 63)),
        audio_codec: Some("libopus"),
    },
    CodecProfile {
        codec: Codec::Prores,
        encoder_name: "prores_ks",
        container_extension: "mov",
        pixel_format: "yuv422p10le",
        supports_crf: false,
        default_crf: None,
        crf_range: None,
        audio_codec: Some("pcm_s16le"),
    },
    CodecProfile {
        codec: Codec::Gif,
        encoder_name: "gif",
        container_extension: "gif",
        pixel_format: "rgb8",
        supports_crf: false,
        default_crf: None,
        crf_range: None,
        audio_codec: None,
    },
];

impl CodecProfile {
    /// Looks up the profile for `codec`.
    pub fn for_codec(codec: Codec) -> &'static CodecProfile {
        codec.profile()
    }

    /// Chroma-subsampled pixel formats need even frame dimensions.
    pub fn requires_even_dimensions(&self) -> bool {
        self.pixel_format.starts_with("yuv420") || self.pixel_format.starts_with("yuv422")
    }

    /// Checks a caller-supplied crf against this codec.
    pub fn validate_crf(&self, crf: u8) -> Result<(), ValidationError> {
        if !self.supports_crf {
            return Err(ValidationError::CrfNotSupported { codec: self.codec });
        }
        if let Some((min, max)) = self.crf_range {
            if crf < min || crf > max {
                return Err(ValidationError::CrfOutOfRange {
                    codec: self.codec,
                    crf,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }
}
