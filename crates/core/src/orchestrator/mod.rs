//! Render orchestrator.
//!
//! Turns a validated [`crate::job::RenderJobSpec`] into an output file:
//! - **Partition**: the frame range is split across K workers
//! - **Render**: each worker drives its own renderer instance
//! - **Merge**: segments are concatenated in worker order without re-encoding
//! - **Mix**: collected audio is muxed in when exactly one worker ran

mod config;
mod progress;
mod runner;
mod types;

pub use config::RenderConfig;
pub use progress::{partition_frames, ProgressAggregator};
pub use runner::RenderOrchestrator;
pub use types::{OrchestratorSettings, RenderError, RenderOutcome, Segment};
