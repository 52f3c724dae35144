use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

use super::types::ProgressEvent;
use crate::encoder::Codec;

#[derive(Debug, Default)]
struct ReporterState {
    started: bool,
    terminated: bool,
    last_frame: Option<u64>,
}

/// Handle for emitting the events of one render.
///
/// Cheaply cloneable; clones share ordering state. Enforces the stream shape:
/// one `start` first, `progress` strictly increasing, and nothing after the
/// terminal `complete` or `error`. Out-of-place events are dropped with a
/// warning.
#[derive(Debug, Clone)]
pub struct EventReporter {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    state: Arc<Mutex<ReporterState>>,
}

impl EventReporter {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            tx: Some(tx),
            state: Arc::default(),
        }
    }

    /// A reporter plus the receiving end of its stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// A reporter that keeps ordering state but sends nothing.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            state: Arc::default(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    pub fn start(&self, composition_id: impl Into<String>, codec: Codec, frames: u64) -> bool {
        self.emit(ProgressEvent::Start {
            composition_id: composition_id.into(),
            codec,
            frames,
        })
    }

    pub fn status(&self, message: impl Into<String>) -> bool {
        self.emit(ProgressEvent::Status {
            message: message.into(),
        })
    }

    /// Reports `frame` of `total` frames done. Non-increasing values are dropped.
    pub fn progress(&self, frame: u64, total: u64) -> bool {
        self.emit(ProgressEvent::progress(frame, total))
    }

    pub fn complete(
        &self,
        output_path: impl Into<PathBuf>,
        download_url: Option<String>,
        filename: impl Into<String>,
        duration_ms: u64,
    ) -> bool {
        self.emit(ProgressEvent::Complete {
            output_path: output_path.into(),
            download_url,
            filename: filename.into(),
            duration_ms,
        })
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.emit(ProgressEvent::Error {
            message: message.into(),
        })
    }

    /// Sends `event` if it fits the stream. Returns whether it was accepted.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        {
            let mut state = self.lock();
            if state.terminated {
                warn!(event = event.kind(), "Event after terminal event ignored");
                return false;
            }
            match &event {
                ProgressEvent::Start { .. } if state.started => {
                    warn!("Second start event ignored");
                    return false;
                }
                ProgressEvent::Start { .. } => state.started = true,
                ProgressEvent::Error { .. } => {}
                _ if !state.started => {
                    warn!(event = event.kind(), "Event before start ignored");
                    return false;
                }
                ProgressEvent::Progress { frame, .. } => {
                    if state.last_frame.is_some_and(|last| *frame <= last) {
                        return false;
                    }
                    state.last_frame = Some(*frame);
                }
                _ => {}
            }
            if event.is_terminal() {
                state.terminated = true;
            }
        }

        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::debug!("Event receiver dropped");
            }
        }
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_ordering_enforced() {
        let (reporter, mut rx) = EventReporter::channel();

        assert!(!reporter.progress(1, 10));
        assert!(reporter.start("intro", Codec::H264, 10));
        assert!(!reporter.start("intro", Codec::H264, 10));
        assert!(reporter.status("rendering"));
        assert!(reporter.progress(1, 10));
        assert!(reporter.progress(3, 10));
        assert!(!reporter.progress(2, 10));
        assert!(!reporter.progress(3, 10));
        assert!(reporter.complete("/out/a.mp4", None, "a.mp4", 5));
        assert!(!reporter.error("late"));
        assert!(!reporter.status("late"));

        let kinds: Vec<&str> = drain(&mut rx).iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec!["start", "status", "progress", "progress", "complete"]
        );
        assert!(reporter.is_terminated());
    }

    #[test]
    fn test_error_is_terminal_without_start() {
        let (reporter, mut rx) = EventReporter::channel();
        assert!(reporter.error("launch failed"));
        assert!(!reporter.complete("/x", None, "x", 0));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let (reporter, mut rx) = EventReporter::channel();
        let other = reporter.clone();
        reporter.start("intro", Codec::Gif, 2);
        other.progress(2, 2);
        assert!(!reporter.progress(1, 2));
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn test_disabled_reporter_still_orders() {
        let reporter = EventReporter::disabled();
        assert!(reporter.start("intro", Codec::H264, 1));
        assert!(reporter.error("boom"));
        assert!(!reporter.status("after"));
    }
}
