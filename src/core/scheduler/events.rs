use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::core::control::TimelineBand;

/// Cooperative cancellation, checked by the worker before each frame.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 工作线程发往宿主（UI）线程的状态消息
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Started {
        source: String,
        total_frames: Option<usize>,
    },
    Progress {
        frames: usize,
        total_frames: Option<usize>,
    },
    BandChanged {
        band: TimelineBand,
        elapsed_secs: f64,
    },
    Completed {
        frames: usize,
        output: Option<PathBuf>,
    },
    Stopped {
        frames: usize,
    },
    Failed {
        message: String,
    },
}

/// Optional sending half of the status channel. A host that has gone away is
/// not an error for the worker.
#[derive(Debug, Clone, Default)]
pub struct EventSink(Option<Sender<StatusEvent>>);

impl EventSink {
    pub fn new(sender: Sender<StatusEvent>) -> Self {
        Self(Some(sender))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn emit(&self, event: StatusEvent) {
        if let Some(sender) = &self.0 {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_stop_flag_is_shared() {
        let flag = StopFlag::new();
        let worker_view = flag.clone();
        assert!(!worker_view.is_stop_requested());

        flag.request_stop();
        assert!(worker_view.is_stop_requested());
    }

    #[test]
    fn test_sink_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        let sink = EventSink::new(tx);
        sink.emit(StatusEvent::Stopped { frames: 1 });
        assert_eq!(rx.recv().unwrap(), StatusEvent::Stopped { frames: 1 });

        drop(rx);
        sink.emit(StatusEvent::Stopped { frames: 2 });
        EventSink::none().emit(StatusEvent::Stopped { frames: 3 });
    }
}
