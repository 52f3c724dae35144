//! Audio track descriptors reported by scenes.

use serde::{Deserialize, Serialize};

/// Track volume, either fixed or one value per frame from the track start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VolumeEnvelope {
    Constant(f32),
    PerFrame(Vec<f32>),
}

impl Default for VolumeEnvelope {
    fn default() -> Self {
        Self::Constant(1.0)
    }
}

impl VolumeEnvelope {
    /// Volume at `frame` frames after the track start.
    pub fn at(&self, frame: usize) -> f32 {
        match self {
            Self::Constant(volume) => *volume,
            Self::PerFrame(values) => values
                .get(frame)
                .or_else(|| values.last())
                .copied()
                .unwrap_or(1.0),
        }
    }

    pub fn is_silent(&self) -> bool {
        match self {
            Self::Constant(volume) => *volume <= 0.0,
            Self::PerFrame(values) => !values.is_empty() && values.iter().all(|v| *v <= 0.0),
        }
    }
}

/// An audio asset the scene placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrackDescriptor {
    pub source_url: String,
    /// Composition frame at which the track starts playing.
    pub start_frame: u64,
    #[serde(default)]
    pub volume: VolumeEnvelope,
    #[serde(rename = "loop", default)]
    pub loop_audio: bool,
    /// Source frames skipped at the beginning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_before: Option<u64>,
    /// Source frame at which playback stops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_after: Option<u64>,
    #[serde(default = "default_playback_rate")]
    pub playback_rate: f64,
}

fn default_playback_rate() -> f64 {
    1.0
}

impl AudioTrackDescriptor {
    pub fn new(source_url: impl Into<String>, start_frame: u64) -> Self {
        Self {
            source_url: source_url.into(),
            start_frame,
            volume: VolumeEnvelope::default(),
            loop_audio: false,
            trim_before: None,
            trim_after: None,
            playback_rate: default_playback_rate(),
        }
    }

    pub fn with_volume(mut self, volume: VolumeEnvelope) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_loop(mut self, loop_audio: bool) -> Self {
        self.loop_audio = loop_audio;
        self
    }

    pub fn with_trim(mut self, before: Option<u64>, after: Option<u64>) -> Self {
        self.trim_before = before;
        self.trim_after = after;
        self
    }

    pub fn with_playback_rate(mut self, rate: f64) -> Self {
        self.playback_rate = rate;
        self
    }
}
