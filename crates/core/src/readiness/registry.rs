use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::error::ReadinessError;

/// Identifier of one outstanding delay, unique within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DelayId(u64);

impl DelayId {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DelayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delay-{}", self.0)
    }
}

/// A registered blocker.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayHandle {
    pub id: DelayId,
    pub label: String,
    pub created_at: Instant,
    pub timeout: Duration,
    pub retries_remaining: u32,
}

/// Counters for one registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub outstanding: usize,
    pub soft_retries: u64,
    pub failures: u64,
}

struct Entry {
    handle: DelayHandle,
    timer: Option<JoinHandle<()>>,
    attempts: u32,
}

#[derive(Default)]
struct State {
    handles: HashMap<DelayId, Entry>,
    failure: Option<ReadinessError>,
}

struct Inner {
    instance: String,
    next_id: AtomicU64,
    state: Mutex<State>,
    /// Bumped on every change so waiters re-check.
    changed: watch::Sender<u64>,
    soft_retries: AtomicU64,
    failures: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self) {
        self.changed.send_modify(|generation| *generation += 1);
    }

    fn fail_all(&self, err: ReadinessError) {
        let drained: Vec<Entry> = {
            let mut state = self.lock();
            if state.failure.is_none() {
                state.failure = Some(err.clone());
            }
            state.handles.drain().map(|(_, entry)| entry).collect()
        };
        for entry in &drained {
            if let Some(timer) = &entry.timer {
                timer.abort();
            }
        }

        self.failures.fetch_add(1, Ordering::Relaxed);
        error!(
            instance = %self.instance,
            cleared = drained.len(),
            error = %err,
            "Readiness failed, cleared all delays"
        );
        self.notify();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        for entry in state.handles.values_mut() {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
        }
    }
}

/// Outstanding asynchronous blockers of one renderer instance.
///
/// Cloning is cheap and every clone shares the same state. Each delay arms a
/// timer; when it fires with retries left the wait is re-armed, otherwise the
/// whole registry fails. Dropping the last clone aborts every armed timer.
///
/// `begin_delay` spawns timers and must be called inside a Tokio runtime.
#[derive(Clone)]
pub struct ReadinessRegistry {
    inner: Arc<Inner>,
}

impl ReadinessRegistry {
    /// Creates an empty registry; `instance` labels its log lines.
    pub fn new(instance: impl Into<String>) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                instance: instance.into(),
                next_id: AtomicU64::new(1),
                state: Mutex::new(State::default()),
                changed,
                soft_retries: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn instance(&self) -> &str {
        &self.inner.instance
    }

    /// Registers a blocker. A zero `timeout` never fires.
    pub fn begin_delay(&self, label: impl Into<String>, timeout: Duration, retries: u32) -> DelayId {
        let id = DelayId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let label = label.into();
        debug!(
            instance = %self.inner.instance,
            %id,
            label = %label,
            timeout_ms = timeout.as_millis() as u64,
            retries,
            "Delay registered"
        );

        {
            let mut state = self.inner.lock();
            let timer = (!timeout.is_zero())
                .then(|| tokio::spawn(run_timer(Arc::downgrade(&self.inner), id, timeout)));
            state.handles.insert(
                id,
                Entry {
                    handle: DelayHandle {
                        id,
                        label,
                        created_at: Instant::now(),
                        timeout,
                        retries_remaining: retries,
                    },
                    timer,
                    attempts: 1,
                },
            );
        }
        self.inner.notify();
        id
    }

    /// Resolves a blocker. Returns false, with a warning, for unknown ids.
    pub fn end_delay(&self, id: DelayId) -> bool {
        let removed = self.inner.lock().handles.remove(&id);
        match removed {
            Some(entry) => {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
                debug!(
                    instance = %self.inner.instance,
                    %id,
                    label = %entry.handle.label,
                    "Delay resolved"
                );
                self.inner.notify();
                true
            }
            None => {
                warn!(
                    instance = %self.inner.instance,
                    %id,
                    "end_delay called for an unknown or already resolved delay"
                );
                false
            }
        }
    }

    /// Clears every blocker, disarms their timers and records a terminal failure.
    ///
    /// Only the first failure is kept.
    pub fn fail_all(&self, err: ReadinessError) {
        self.inner.fail_all(err);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().handles.is_empty()
    }

    /// Labels of the outstanding delays, oldest first.
    pub fn outstanding_labels(&self) -> Vec<String> {
        self.outstanding()
            .into_iter()
            .map(|handle| handle.label)
            .collect()
    }

    /// Snapshot of the outstanding delays, oldest first.
    pub fn outstanding(&self) -> Vec<DelayHandle> {
        let mut handles: Vec<DelayHandle> = self
            .inner
            .lock()
            .handles
            .values()
            .map(|entry| entry.handle.clone())
            .collect();
        handles.sort_by_key(|handle| handle.id);
        handles
    }

    /// The terminal failure, if one was recorded.
    pub fn failure(&self) -> Option<ReadinessError> {
        self.inner.lock().failure.clone()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            outstanding: self.inner.lock().handles.len(),
            soft_retries: self.inner.soft_retries.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
        }
    }

    /// Waits until no delay is outstanding.
    ///
    /// Returns the recorded failure as soon as one exists, or
    /// [`ReadinessError::Timeout`] naming the outstanding labels.
    pub async fn wait_until_clear(&self, timeout: Duration) -> Result<(), ReadinessError> {
        let started = Instant::now();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut changes = self.inner.changed.subscribe();

        loop {
            changes.borrow_and_update();
            {
                let state = self.inner.lock();
                if let Some(failure) = &state.failure {
                    return Err(failure.clone());
                }
                if state.handles.is_empty() {
                    return Ok(());
                }
            }

            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Err(ReadinessError::Failed("readiness registry closed".to_string()));
                    }
                }
                _ = &mut deadline => {
                    return Err(ReadinessError::Timeout {
                        waited_ms: started.elapsed().as_millis() as u64,
                        labels: self.outstanding_labels(),
                    });
                }
            }
        }
    }
}

impl fmt::Debug for ReadinessRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessRegistry")
            .field("instance", &self.inner.instance)
            .field("stats", &self.stats())
            .finish()
    }
}

enum Expiry {
    Retry { label: String, retries_remaining: u32 },
    Exhausted(ReadinessError),
}

async fn run_timer(inner: Weak<Inner>, id: DelayId, timeout: Duration) {
    loop {
        tokio::time::sleep(timeout).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };

        let expiry = {
            let mut state = inner.lock();
            let Some(entry) = state.handles.get_mut(&id) else {
                return;
            };
            if entry.handle.retries_remaining > 0 {
                entry.handle.retries_remaining -= 1;
                entry.attempts += 1;
                Expiry::Retry {
                    label: entry.handle.label.clone(),
                    retries_remaining: entry.handle.retries_remaining,
                }
            } else {
                // Detach so fail_all does not abort the running task.
                entry.timer.take();
                Expiry::Exhausted(ReadinessError::DelayExhausted {
                    label: entry.handle.label.clone(),
                    attempts: entry.attempts,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        match expiry {
            Expiry::Retry {
                label,
                retries_remaining,
            } => {
                inner.soft_retries.fetch_add(1, Ordering::Relaxed);
                warn!(
                    instance = %inner.instance,
                    %id,
                    label = %label,
                    retries_remaining,
                    "Delay timed out, waiting again"
                );
            }
            Expiry::Exhausted(err) => {
                inner.fail_all(err);
                return;
            }
        }
    }
}
