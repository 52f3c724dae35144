//! Error types for the readiness module.

use thiserror::Error;

/// Why a renderer instance never became ready.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReadinessError {
    /// The wait ran out while blockers were still outstanding.
    #[error("readiness not reached after {waited_ms}ms, outstanding: {}", .labels.join(", "))]
    Timeout { waited_ms: u64, labels: Vec<String> },

    /// A delay kept timing out until its retries were gone.
    #[error("delay '{label}' did not resolve within {timeout_ms}ms after {attempts} attempt(s)")]
    DelayExhausted {
        label: String,
        attempts: u32,
        timeout_ms: u64,
    },

    /// The renderer reported a fatal error.
    #[error("renderer failed: {0}")]
    Failed(String),
}
