use std::sync::Arc;
use tokio::sync::watch;

/// Counts outstanding completion tokens (queued or executing work)
#[derive(Debug)]
pub struct OperationTracker {
    outstanding: watch::Sender<usize>,
}

impl OperationTracker {
    pub fn new() -> Arc<Self> {
        let (outstanding, _) = watch::channel(0);
        Arc::new(Self { outstanding })
    }

    pub fn begin(self: &Arc<Self>) -> CompletionToken {
        self.outstanding.send_modify(|n| *n += 1);
        CompletionToken {
            tracker: Arc::clone(self),
        }
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolves once no token is alive
    pub async fn wait_idle(&self) {
        let mut rx = self.outstanding.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Owned by exactly one pending unit of work; dropping it completes that unit
#[derive(Debug)]
pub struct CompletionToken {
    tracker: Arc<OperationTracker>,
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        self.tracker
            .outstanding
            .send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn wait_idle_resolves_when_last_token_drops() {
        let tracker = OperationTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();
        assert_eq!(tracker.outstanding(), 2);

        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.wait_idle().await })
        };

        drop(first);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!waiter.is_finished());

        drop(second);
        waiter.await.unwrap();
        assert_eq!(tracker.outstanding(), 0);
    }
}
