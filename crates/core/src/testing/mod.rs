//! Testing utilities and mock implementations.
//!
//! The mocks stand in for the renderer bridge and ffmpeg so the whole render
//! pipeline can run in tests without external processes.
//!
//! # Example
//!
//! ```rust,ignore
//! use framecast_core::testing::{MockEncoder, MockLauncher};
//!
//! let launcher = MockLauncher::new();
//! let encoder = MockEncoder::new();
//!
//! let orchestrator = RenderOrchestrator::new(
//!     Arc::new(launcher.clone()),
//!     Arc::new(encoder.clone()),
//!     OrchestratorSettings::new(temp_dir),
//! );
//! ```

mod mock_encoder;
mod mock_renderer;

pub use mock_encoder::{MockEncoder, RecordedConcat};
pub use mock_renderer::{MockDelay, MockLauncher, MockRenderer, RecordedCapture};

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::Value;
    use std::path::Path;

    use crate::audio::AudioTrackDescriptor;
    use crate::encoder::Codec;
    use crate::job::RenderJobSpec;

    /// A small valid job writing into `dir`.
    pub fn job(dir: &Path, frames: u64) -> RenderJobSpec {
        RenderJobSpec::new("intro", dir.join("intro.mp4"))
            .with_size(64, 36)
            .with_frames(0, frames.saturating_sub(1))
    }

    /// A GIF job writing into `dir`.
    pub fn gif_job(dir: &Path, frames: u64) -> RenderJobSpec {
        RenderJobSpec::new("intro", dir.join("intro.gif"))
            .with_codec(Codec::Gif)
            .with_size(64, 36)
            .with_frames(0, frames.saturating_sub(1))
    }

    /// Batch rows with a `name` field.
    pub fn named_rows(names: &[&str]) -> Vec<Value> {
        names
            .iter()
            .map(|name| serde_json::json!({ "name": name }))
            .collect()
    }

    pub fn music_track(start_frame: u64) -> AudioTrackDescriptor {
        AudioTrackDescriptor::new("/assets/music.mp3", start_frame)
    }
}
