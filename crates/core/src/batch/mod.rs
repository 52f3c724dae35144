//! Batch scheduling of independent render jobs.
//!
//! Job-level concurrency is separate from the frame workers inside each job:
//! M batch lanes of K workers each can run up to M×K renderer instances.

mod pattern;
mod scheduler;

pub use pattern::{plan_batch, OutputPattern};
pub use scheduler::{run_all, BatchError, BatchOptions, BatchOutcome, BatchSummary};
