//! Render defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::renderer::ImageFormat;

/// Defaults applied to render requests, and where scratch and output files go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Frame workers per job when the request does not say.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Parent of the per-job scratch directories.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Directory for outputs without an explicit path.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub image_format: ImageFormat,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: f64,
}

fn default_concurrency() -> usize {
    1
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("framecast")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_fps() -> f64 {
    30.0
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            temp_dir: default_temp_dir(),
            output_dir: default_output_dir(),
            image_format: ImageFormat::default(),
            jpeg_quality: default_jpeg_quality(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RenderConfig::default();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert!(config.temp_dir.ends_with("framecast"));
        assert_eq!(config.image_format, ImageFormat::Png);
        assert_eq!((config.width, config.height), (1920, 1080));
        assert_eq!(config.fps, 30.0);
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            concurrency = 4
            image_format = "jpeg"
            fps = 60
        "#;
        let config: RenderConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.image_format, ImageFormat::Jpeg);
        assert_eq!(config.fps, 60.0);
        assert_eq!(config.jpeg_quality, 80);
    }
}
