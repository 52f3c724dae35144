//! Audio mixing.
//!
//! Scenes report the audio they place on the timeline as
//! [`AudioTrackDescriptor`]s. After the video is encoded those tracks are
//! turned into one ffmpeg filter graph and muxed into the output.

mod mixer;
mod types;

pub use mixer::{build_mix_plan, mix, AudioError, MixInput, MixPlan};
pub use types::{AudioTrackDescriptor, VolumeEnvelope};
