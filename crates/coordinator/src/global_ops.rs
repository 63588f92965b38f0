use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, watch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalOperationEvent {
    Started { name: String },
    Stopped,
}

/// Host-wide exclusive operations (bulk refactorings, solution loads) that
/// pause background analysis while they run.
///
/// Operations nest: only the first start and the last stop are published,
/// so observers never see two `Started` events in a row.
pub struct GlobalOperationService {
    running: Mutex<Vec<String>>,
    events: broadcast::Sender<GlobalOperationEvent>,
    paused: watch::Sender<bool>,
}

impl GlobalOperationService {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        let (paused, _) = watch::channel(false);
        Arc::new(Self {
            running: Mutex::new(Vec::new()),
            events,
            paused,
        })
    }

    /// Begin an operation; it ends when the returned guard drops
    pub fn start(self: &Arc<Self>, name: impl Into<String>) -> GlobalOperationGuard {
        let name = name.into();
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        running.push(name.clone());
        if running.len() == 1 {
            log::info!("global operation '{name}' started, pausing background analysis");
            self.paused.send_replace(true);
            let _ = self.events.send(GlobalOperationEvent::Started { name });
        }
        GlobalOperationGuard {
            service: Arc::clone(self),
        }
    }

    fn stop(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.pop().is_none() {
            return;
        }
        if running.is_empty() {
            log::info!("global operations finished, resuming background analysis");
            self.paused.send_replace(false);
            let _ = self.events.send(GlobalOperationEvent::Stopped);
        }
    }

    pub fn is_running(&self) -> bool {
        *self.paused.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GlobalOperationEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn paused(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }
}

#[must_use = "the operation stops when the guard is dropped"]
pub struct GlobalOperationGuard {
    service: Arc<GlobalOperationService>,
}

impl Drop for GlobalOperationGuard {
    fn drop(&mut self) {
        self.service.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nested_operations_publish_one_pair() {
        let service = GlobalOperationService::new();
        let mut events = service.subscribe();

        let outer = service.start("load");
        let inner = service.start("rename");
        assert!(service.is_running());
        drop(inner);
        assert!(service.is_running());
        drop(outer);
        assert!(!service.is_running());

        assert_eq!(
            events.try_recv().ok(),
            Some(GlobalOperationEvent::Started {
                name: "load".to_string()
            })
        );
        assert_eq!(events.try_recv().ok(), Some(GlobalOperationEvent::Stopped));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn paused_watch_follows_operations() {
        let service = GlobalOperationService::new();
        let paused = service.paused();
        assert!(!*paused.borrow());
        let guard = service.start("bulk edit");
        assert!(*paused.borrow());
        drop(guard);
        assert!(!*paused.borrow());
    }
}
