//! The request shape shared by the CLI and the HTTP endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::error::ValidationError;
use super::types::{Quality, RenderJobSpec, MAX_FRAME_COUNT};
use crate::encoder::Codec;
use crate::orchestrator::RenderConfig;
use crate::renderer::ImageFormat;

/// A render request with every field optional except the composition.
///
/// Missing fields fall back to [`RenderConfig`]. The end of the range is given
/// either as `endFrame` (inclusive) or as `durationInFrames`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub composition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crf: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_frame: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_in_frames: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_props: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jpeg_quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl RenderRequest {
    pub fn new(composition_id: impl Into<String>) -> Self {
        Self {
            composition_id: composition_id.into(),
            ..Default::default()
        }
    }

    /// Resolves the request against configured defaults and validates the result.
    pub fn into_job(self, defaults: &RenderConfig) -> Result<RenderJobSpec, ValidationError> {
        if self.composition_id.trim().is_empty() {
            return Err(ValidationError::MissingCompositionId);
        }

        let codec = match self.codec.as_deref() {
            Some(codec) => codec.parse::<Codec>()?,
            None => Codec::H264,
        };

        let quality = match (self.crf, self.bitrate) {
            (Some(_), Some(_)) => return Err(ValidationError::ConflictingQuality),
            (Some(crf), None) => Some(Quality::Crf(crf)),
            (None, Some(bitrate)) => Some(Quality::Bitrate(bitrate)),
            (None, None) => None,
        };

        let start_frame = self.start_frame.unwrap_or(0);
        let end_frame = match (self.end_frame, self.duration_in_frames) {
            (Some(end), _) => end,
            (None, Some(0)) => {
                return Err(ValidationError::InvalidFrameSpec(
                    "durationInFrames must be at least 1".to_string(),
                ))
            }
            (None, Some(duration)) => start_frame.checked_add(duration - 1).ok_or(
                ValidationError::TooManyFrames {
                    frames: duration,
                    max: MAX_FRAME_COUNT,
                },
            )?,
            (None, None) => return Err(ValidationError::MissingEndFrame),
        };

        let image_format = match self.image_format.as_deref() {
            Some(format) => format.parse::<ImageFormat>()?,
            None => defaults.image_format,
        };

        let sequence = self.sequence.unwrap_or(false);
        let output_path = self.output_path.unwrap_or_else(|| {
            default_output_path(&defaults.output_dir, &self.composition_id, codec, sequence)
        });

        let job = RenderJobSpec {
            composition_id: self.composition_id,
            input_props: self
                .input_props
                .unwrap_or_else(|| Value::Object(Default::default())),
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            fps: self.fps.unwrap_or(defaults.fps),
            start_frame,
            end_frame,
            codec,
            quality,
            scale: self.scale.unwrap_or(1.0),
            muted: self.muted.unwrap_or(false),
            output_path,
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            sequence,
            image_format,
            jpeg_quality: self.jpeg_quality.unwrap_or(defaults.jpeg_quality),
        };
        job.validate()?;
        Ok(job)
    }
}

/// `<dir>/<composition>.<ext>`, or `<dir>/<composition>` for image sequences.
pub fn default_output_path(dir: &Path, composition_id: &str, codec: Codec, sequence: bool) -> PathBuf {
    if sequence {
        dir.join(composition_id)
    } else {
        dir.join(format!(
            "{}.{}",
            composition_id,
            codec.profile().container_extension
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> RenderConfig {
        RenderConfig {
            output_dir: PathBuf::from("/renders"),
            ..RenderConfig::default()
        }
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let req: RenderRequest = serde_json::from_value(json!({
            "compositionId": "intro",
            "codec": "vp9",
            "crf": 30,
            "durationInFrames": 90,
            "inputProps": {"title": "Hello"}
        }))
        .unwrap();

        assert_eq!(req.composition_id, "intro");
        assert_eq!(req.duration_in_frames, Some(90));

        let job = req.into_job(&defaults()).unwrap();
        assert_eq!(job.codec, Codec::Vp9);
        assert_eq!(job.end_frame, 89);
        assert_eq!(job.quality, Some(Quality::Crf(30)));
        assert_eq!(job.output_path, PathBuf::from("/renders/intro.webm"));
        assert_eq!(job.input_props["title"], "Hello");
    }

    #[test]
    fn test_end_frame_wins_over_duration() {
        let req = RenderRequest {
            start_frame: Some(10),
            end_frame: Some(19),
            duration_in_frames: Some(100),
            ..RenderRequest::new("intro")
        };
        let job = req.into_job(&defaults()).unwrap();
        assert_eq!(job.frame_count(), 10);
    }

    #[test]
    fn test_duration_past_last_frame_rejected() {
        let req = RenderRequest {
            start_frame: Some(u64::MAX),
            duration_in_frames: Some(2),
            ..RenderRequest::new("intro")
        };
        assert!(matches!(
            req.into_job(&defaults()),
            Err(ValidationError::TooManyFrames { frames: 2, .. })
        ));

        let req = RenderRequest {
            start_frame: Some(u64::MAX),
            duration_in_frames: Some(1),
            ..RenderRequest::new("intro")
        };
        assert_eq!(req.into_job(&defaults()).unwrap().frame_count(), 1);

        let req = RenderRequest {
            end_frame: Some(u64::MAX),
            ..RenderRequest::new("intro")
        };
        assert!(matches!(
            req.into_job(&defaults()),
            Err(ValidationError::TooManyFrames { .. })
        ));
    }

    #[test]
    fn test_missing_end_frame() {
        let err = RenderRequest::new("intro").into_job(&defaults()).unwrap_err();
        assert_eq!(err, ValidationError::MissingEndFrame);
    }

    #[test]
    fn test_crf_and_bitrate_conflict() {
        let req = RenderRequest {
            crf: Some(20),
            bitrate: Some("5M".into()),
            end_frame: Some(10),
            ..RenderRequest::new("intro")
        };
        assert_eq!(
            req.into_job(&defaults()).unwrap_err(),
            ValidationError::ConflictingQuality
        );
    }

    #[test]
    fn test_unknown_codec() {
        let req = RenderRequest {
            codec: Some("av1".into()),
            end_frame: Some(10),
            ..RenderRequest::new("intro")
        };
        assert!(matches!(
            req.into_job(&defaults()),
            Err(ValidationError::UnknownCodec(_))
        ));
    }

    #[test]
    fn test_empty_composition_rejected() {
        let req = RenderRequest {
            end_frame: Some(10),
            ..RenderRequest::new("  ")
        };
        assert_eq!(
            req.into_job(&defaults()).unwrap_err(),
            ValidationError::MissingCompositionId
        );
    }

    #[test]
    fn test_sequence_default_output_is_directory() {
        let req = RenderRequest {
            end_frame: Some(3),
            sequence: Some(true),
            image_format: Some("jpeg".into()),
            ..RenderRequest::new("intro")
        };
        let job = req.into_job(&defaults()).unwrap();
        assert!(job.sequence);
        assert_eq!(job.image_format, ImageFormat::Jpeg);
        assert_eq!(job.output_path, PathBuf::from("/renders/intro"));
    }
}
