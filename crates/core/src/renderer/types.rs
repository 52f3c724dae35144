//! Types shared by renderer backends.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::job::{RenderJobSpec, ValidationError};

/// Still image format produced by a capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        }
    }

    /// Decoder ffmpeg uses when these images are piped in.
    pub fn ffmpeg_input_codec(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "mjpeg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            _ => Err(ValidationError::UnknownImageFormat(s.to_string())),
        }
    }
}

/// What a renderer instance needs to load a composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRef {
    pub composition_id: String,
    pub input_props: Value,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    pub fps: f64,
    /// Where the renderer finds the bundled scene.
    pub serve_url: String,
}

impl SceneRef {
    pub fn for_job(job: &RenderJobSpec, serve_url: impl Into<String>) -> Self {
        Self {
            composition_id: job.composition_id.clone(),
            input_props: job.input_props.clone(),
            width: job.width,
            height: job.height,
            scale: job.scale,
            fps: job.fps,
            serve_url: serve_url.into(),
        }
    }
}

/// Acknowledgement of a successful load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedScene {
    pub composition_id: String,
    /// Length reported by the scene, when it knows one.
    pub duration_in_frames: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_format_parse() {
        assert_eq!("PNG".parse::<ImageFormat>().unwrap(), ImageFormat::Png);
        assert_eq!("jpg".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert!(matches!(
            "webp".parse::<ImageFormat>(),
            Err(ValidationError::UnknownImageFormat(_))
        ));
        assert_eq!(ImageFormat::Jpeg.ffmpeg_input_codec(), "mjpeg");
    }
}
