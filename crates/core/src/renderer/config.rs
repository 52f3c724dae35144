//! Configuration for the subprocess renderer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for [`super::ProcessLauncher`] and frame timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Renderer bridge executable.
    #[serde(default = "default_command")]
    pub command: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,

    /// URL of the bundled scene, passed to every load.
    #[serde(default = "default_serve_url")]
    pub serve_url: String,

    #[serde(default = "default_load_timeout")]
    pub load_timeout_ms: u64,

    /// Longest wait for outstanding delays before a capture. Must be at least
    /// `delay_timeout_ms * (delay_retries + 1)`, the time a default delay can
    /// take through all its retries.
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_ms: u64,

    #[serde(default = "default_paint_timeout")]
    pub paint_timeout_ms: u64,

    /// Timeout for delays that do not carry their own.
    #[serde(default = "default_delay_timeout")]
    pub delay_timeout_ms: u64,

    /// Retries for delays that do not carry their own. Each retry re-arms
    /// the delay timer.
    #[serde(default)]
    pub delay_retries: u32,
}

fn default_command() -> PathBuf {
    PathBuf::from("framecast-renderer")
}

fn default_serve_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_load_timeout() -> u64 {
    30_000
}

fn default_readiness_timeout() -> u64 {
    30_000
}

fn default_paint_timeout() -> u64 {
    10_000
}

fn default_delay_timeout() -> u64 {
    30_000
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            serve_url: default_serve_url(),
            load_timeout_ms: default_load_timeout(),
            readiness_timeout_ms: default_readiness_timeout(),
            paint_timeout_ms: default_paint_timeout(),
            delay_timeout_ms: default_delay_timeout(),
            delay_retries: 0,
        }
    }
}

impl RendererConfig {
    pub fn with_command(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn delay_timeout(&self) -> Duration {
        Duration::from_millis(self.delay_timeout_ms)
    }
}
