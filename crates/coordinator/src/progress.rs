use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    Started,
    Stopped,
}

/// Aggregate in-flight counter across every tier queue.
///
/// `start` is called once per newly queued key and `stop` once per key that
/// finished (or was dropped at shutdown). Transitions 0→1 and 1→0 raise
/// [`ProgressEvent::Started`] / [`ProgressEvent::Stopped`]; the transition
/// and its send happen under one lock so observers see them in order.
pub struct ProgressReporter {
    count: AtomicUsize,
    transition: Mutex<()>,
    events: broadcast::Sender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            count: AtomicUsize::new(0),
            transition: Mutex::new(()),
            events,
        }
    }

    pub fn in_progress(&self) -> bool {
        self.count.load(Ordering::Acquire) > 0
    }

    pub fn pending(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    pub(crate) fn start(&self) {
        let _guard = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        if self.count.fetch_add(1, Ordering::AcqRel) == 0 {
            let _ = self.events.send(ProgressEvent::Started);
        }
    }

    pub(crate) fn stop(&self) {
        let _guard = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.count.load(Ordering::Acquire);
        if current == 0 {
            log::warn!("progress stop without matching start");
            return;
        }
        self.count.store(current - 1, Ordering::Release);
        if current == 1 {
            let _ = self.events.send(ProgressEvent::Stopped);
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
