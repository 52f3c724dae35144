//! Newline-delimited JSON protocol spoken with the renderer bridge.
//!
//! Every line is one object with a `"type"` tag. Commands go to the bridge on
//! stdin, messages come back on stdout.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use super::types::ImageFormat;
use crate::audio::AudioTrackDescriptor;

/// Sent to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RendererCommand {
    Load {
        composition_id: String,
        input_props: Value,
        width: u32,
        height: u32,
        scale: f64,
        fps: f64,
        serve_url: String,
    },
    Seek {
        frame: u64,
    },
    Screenshot {
        frame: u64,
        path: PathBuf,
        format: ImageFormat,
        quality: u8,
    },
    Close,
}

/// Received from the renderer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RendererMessage {
    Ready {
        composition_id: String,
        #[serde(default)]
        duration_in_frames: Option<u64>,
    },
    Painted {
        frame: u64,
    },
    Captured {
        frame: u64,
    },
    DelayBegin {
        id: u64,
        label: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        retries: Option<u32>,
    },
    DelayEnd {
        id: u64,
    },
    Audio(AudioTrackDescriptor),
    Log {
        #[serde(default)]
        level: Option<String>,
        message: String,
    },
    Error {
        message: String,
    },
}

impl RendererCommand {
    /// Serializes the command as one protocol line, newline included.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl RendererMessage {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}
