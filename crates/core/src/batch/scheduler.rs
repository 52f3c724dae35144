use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BatchError<E> {
    #[error("batch concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("batch job {index} failed: {error}")]
    JobFailed {
        index: usize,
        #[source]
        error: E,
    },
}

/// How many jobs run at once, and whether the first failure stops the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub fail_fast: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            fail_fast: false,
        }
    }
}

impl BatchOptions {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            fail_fast: false,
        }
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Outcome of one batch job, stored at the job's original index.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> BatchOutcome<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            Self::Fulfilled(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }

    pub fn err(&self) -> Option<&E> {
        match self {
            Self::Fulfilled(_) => None,
            Self::Rejected(error) => Some(error),
        }
    }
}

/// Counts and timing of a finished batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub fulfilled: usize,
    pub rejected: usize,
    pub total: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchSummary {
    pub fn from_outcomes<T, E>(outcomes: &[BatchOutcome<T, E>], started_at: DateTime<Utc>) -> Self {
        let fulfilled = outcomes.iter().filter(|o| o.is_fulfilled()).count();
        Self {
            fulfilled,
            rejected: outcomes.len() - fulfilled,
            total: outcomes.len(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn all_fulfilled(&self) -> bool {
        self.rejected == 0
    }
}

/// Runs `jobs` on `options.concurrency` lanes.
///
/// Each lane claims the next unstarted job until none are left. Outcomes are
/// returned in job order. Without fail-fast every job runs and failures are
/// recorded as [`BatchOutcome::Rejected`]. With fail-fast the first failure
/// stops lanes from claiming more jobs, jobs already running finish, and that
/// failure is returned.
pub async fn run_all<F, Fut, T, E>(
    jobs: Vec<F>,
    options: BatchOptions,
) -> Result<Vec<BatchOutcome<T, E>>, BatchError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if options.concurrency == 0 {
        return Err(BatchError::InvalidConcurrency);
    }

    let total = jobs.len();
    let lanes = options.concurrency.min(total).max(1);
    info!(jobs = total, lanes, fail_fast = options.fail_fast, "Batch started");

    let queue = Mutex::new(jobs.into_iter().enumerate());
    let abort = AtomicBool::new(false);
    let first_failure = Mutex::new(None);

    let lane_results = join_all(
        (0..lanes).map(|lane| run_lane(lane, &queue, &abort, &first_failure, options.fail_fast)),
    )
    .await;

    let mut slots: Vec<Option<BatchOutcome<T, E>>> = (0..total).map(|_| None).collect();
    for (index, outcome) in lane_results.into_iter().flatten() {
        slots[index] = Some(outcome);
    }

    let failed_index = *first_failure
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(index) = failed_index {
        if let Some(BatchOutcome::Rejected(error)) = slots[index].take() {
            warn!(index, "Batch aborted after failure");
            return Err(BatchError::JobFailed { index, error });
        }
    }

    let outcomes: Vec<BatchOutcome<T, E>> = slots.into_iter().flatten().collect();
    let fulfilled = outcomes.iter().filter(|o| o.is_fulfilled()).count();
    info!(
        fulfilled,
        rejected = outcomes.len() - fulfilled,
        "Batch finished"
    );
    Ok(outcomes)
}

async fn run_lane<I, F, Fut, T, E>(
    lane: usize,
    queue: &Mutex<I>,
    abort: &AtomicBool,
    first_failure: &Mutex<Option<usize>>,
    fail_fast: bool,
) -> Vec<(usize, BatchOutcome<T, E>)>
where
    I: Iterator<Item = (usize, F)>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut results = Vec::new();
    loop {
        if abort.load(Ordering::SeqCst) {
            break;
        }
        let next = queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .next();
        let Some((index, job)) = next else {
            break;
        };

        debug!(lane, index, "Batch job claimed");
        match job().await {
            Ok(value) => results.push((index, BatchOutcome::Fulfilled(value))),
            Err(error) => {
                warn!(lane, index, "Batch job failed");
                if fail_fast && !abort.swap(true, Ordering::SeqCst) {
                    *first_failure
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(index);
                }
                results.push((index, BatchOutcome::Rejected(error)));
            }
        }
    }
    results
}
