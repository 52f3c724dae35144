//! Progress event types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::encoder::Codec;

/// One entry of a render's event stream.
///
/// A stream holds one `start`, any number of `status` and `progress`
/// entries, then exactly one terminal `complete` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    Start {
        composition_id: String,
        codec: Codec,
        frames: u64,
    },
    Status {
        message: String,
    },
    Progress {
        frame: u64,
        total: u64,
        percent: u8,
    },
    Complete {
        output_path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        download_url: Option<String>,
        filename: String,
        duration_ms: u64,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    /// Builds a progress event with its percentage filled in.
    pub fn progress(frame: u64, total: u64) -> Self {
        Self::Progress {
            frame,
            total,
            percent: percent(frame, total),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// The `type` tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Status { .. } => "status",
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// One JSON object followed by a newline.
    pub fn to_ndjson_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// `floor(frame / total * 100)`, capped at 100.
pub fn percent(frame: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let value = u128::from(frame) * 100 / u128::from(total);
    value.min(100) as u8
}
