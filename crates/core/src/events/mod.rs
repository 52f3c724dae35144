//! Progress and event reporting.

mod ndjson;
mod reporter;
mod types;

pub use ndjson::write_ndjson;
pub use reporter::EventReporter;
pub use types::{percent, ProgressEvent};
