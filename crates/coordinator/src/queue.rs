use crate::progress::ProgressReporter;
use crate::tier::TierLoad;
use crawler_graph::ProjectDependencyGraph;
use crawler_workspace::ProjectId;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;

/// Something a [`WorkQueue`] can hold: keyed, mergeable, owned by a project
pub trait QueueEntry: Send + 'static {
    type Key: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn key(&self) -> Self::Key;

    fn project_id(&self) -> ProjectId;

    fn is_low_priority(&self) -> bool;

    /// Fold a re-added entry for the same key into the pending one
    fn merge(self, newer: Self) -> Self;
}

/// Probe for projects that currently carry diagnostics
pub trait DiagnosticsSource: Send + Sync {
    fn has_outstanding_diagnostics(&self, project: ProjectId) -> bool;
}

/// No project has diagnostics
pub struct NoDiagnostics;

impl DiagnosticsSource for NoDiagnostics {
    fn has_outstanding_diagnostics(&self, _project: ProjectId) -> bool {
        false
    }
}

/// Preference passed to [`WorkQueue::try_take_any_work`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkHint<K> {
    pub key: Option<K>,
    pub project: Option<ProjectId>,
}

impl<K> WorkHint<K> {
    pub fn none() -> Self {
        Self {
            key: None,
            project: None,
        }
    }
}

/// Handle for one dequeued execution of a key
#[derive(Debug, Clone)]
pub struct ExecutionLease<K> {
    pub key: K,
    lease: u64,
    token: CancellationToken,
}

impl<K> ExecutionLease<K> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

struct Pending<T> {
    item: T,
    seq: u64,
}

struct Running {
    lease: u64,
    token: CancellationToken,
}

struct QueueState<T: QueueEntry> {
    items: HashMap<T::Key, Pending<T>>,
    running: HashMap<T::Key, Running>,
    executing: usize,
    next_seq: u64,
    next_lease: u64,
    disposed: bool,
}

/// Deduplicating per-tier queue.
///
/// One mutex guards the pending map and the running-token map. Every newly
/// added key starts progress and releases one consumer permit; every
/// dequeued key stops progress exactly once through [`WorkQueue::mark_done`].
pub struct WorkQueue<T: QueueEntry> {
    name: &'static str,
    state: Mutex<QueueState<T>>,
    permits: Semaphore,
    progress: Option<Arc<ProgressReporter>>,
    load: watch::Sender<TierLoad>,
    shutdown: CancellationToken,
}

impl<T: QueueEntry> WorkQueue<T> {
    pub fn new(
        name: &'static str,
        progress: Option<Arc<ProgressReporter>>,
        shutdown: CancellationToken,
    ) -> Self {
        let (load, _) = watch::channel(TierLoad::default());
        Self {
            name,
            state: Mutex::new(QueueState {
                items: HashMap::new(),
                running: HashMap::new(),
                executing: 0,
                next_seq: 0,
                next_lease: 0,
                disposed: false,
            }),
            permits: Semaphore::new(0),
            progress,
            load,
            shutdown,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_load(&self, state: &QueueState<T>) {
        let load = TierLoad {
            pending: state.items.len(),
            executing: state.executing,
        };
        self.load.send_if_modified(|current| {
            if *current == load {
                false
            } else {
                *current = load;
                true
            }
        });
    }

    /// Insert or merge. Returns `true` when the key was not pending before.
    pub fn add_or_replace(&self, item: T) -> bool {
        let key = item.key();
        let mut state = self.lock();
        if state.disposed {
            log::debug!("{} queue disposed, dropping {key:?}", self.name);
            return false;
        }

        if let Some(pending) = state.items.remove(&key) {
            let merged = pending.item.merge(item);
            state.items.insert(
                key,
                Pending {
                    item: merged,
                    seq: pending.seq,
                },
            );
            return false;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.items.insert(key, Pending { item, seq });
        if let Some(progress) = &self.progress {
            progress.start();
        }
        self.publish_load(&state);
        drop(state);
        self.permits.add_permits(1);
        true
    }

    /// Wait until at least one item was added since the last wait.
    /// Returns `false` once the queue is disposed.
    pub async fn wait_for_work(&self) -> bool {
        match self.permits.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Remove the pending item for `key` and start executing it
    pub fn try_take(&self, key: T::Key) -> Option<(T, ExecutionLease<T::Key>)> {
        let mut state = self.lock();
        let pending = state.items.remove(&key)?;
        if let Ok(permit) = self.permits.try_acquire() {
            permit.forget();
        }
        Some(self.begin_execution(&mut state, key, pending.item))
    }

    /// Pick the next item: hinted key, then the hinted project, then a
    /// dependent of the hinted project with diagnostics, then any project
    /// with diagnostics, then anything. Ties go to non-low-priority items,
    /// then to the earliest inserted.
    pub fn try_take_any_work(
        &self,
        hint: WorkHint<T::Key>,
        graph: &ProjectDependencyGraph,
        diagnostics: &dyn DiagnosticsSource,
    ) -> Option<(T, ExecutionLease<T::Key>)> {
        let mut state = self.lock();
        if state.items.is_empty() {
            return None;
        }

        let dependents = hint
            .project
            .map(|p| graph.direct_dependents(p))
            .unwrap_or_default();
        let mut diagnostics_cache: HashMap<ProjectId, bool> = HashMap::new();
        let mut has_diagnostics = |project: ProjectId| {
            *diagnostics_cache
                .entry(project)
                .or_insert_with(|| diagnostics.has_outstanding_diagnostics(project))
        };

        let key = state
            .items
            .iter()
            .map(|(key, pending)| {
                let project = pending.item.project_id();
                let bucket = if hint.key == Some(*key) {
                    0
                } else if hint.project == Some(project) {
                    1
                } else if dependents.contains(&project) && has_diagnostics(project) {
                    2
                } else if has_diagnostics(project) {
                    3
                } else {
                    4
                };
                ((bucket, pending.item.is_low_priority(), pending.seq), *key)
            })
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, key)| key)?;

        let pending = state.items.remove(&key)?;
        Some(self.begin_execution(&mut state, key, pending.item))
    }

    fn begin_execution(
        &self,
        state: &mut QueueState<T>,
        key: T::Key,
        item: T,
    ) -> (T, ExecutionLease<T::Key>) {
        let lease = state.next_lease;
        state.next_lease += 1;
        let token = self.shutdown.child_token();
        state.running.insert(
            key,
            Running {
                lease,
                token: token.clone(),
            },
        );
        state.executing += 1;
        self.publish_load(state);
        (item, ExecutionLease { key, lease, token })
    }

    /// Finish one execution: stop progress, forget the token if it is still
    /// the one issued for this lease
    pub fn mark_done(&self, lease: &ExecutionLease<T::Key>) {
        let mut state = self.lock();
        if state
            .running
            .get(&lease.key)
            .is_some_and(|running| running.lease == lease.lease)
        {
            state.running.remove(&lease.key);
        }
        state.executing = state.executing.saturating_sub(1);
        self.publish_load(&state);
        drop(state);
        if let Some(progress) = &self.progress {
            progress.stop();
        }
    }

    /// Request cooperative cancellation of everything executing
    pub fn cancel_running(&self) {
        let state = self.lock();
        for running in state.running.values() {
            running.token.cancel();
        }
    }

    /// Cancel every token, drop pending items and release the consumer
    pub fn dispose(&self) {
        let drained: Vec<T> = {
            let mut state = self.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            for running in state.running.values() {
                running.token.cancel();
            }
            let drained = state.items.drain().map(|(_, p)| p.item).collect();
            self.publish_load(&state);
            drained
        };
        if let Some(progress) = &self.progress {
            for _ in &drained {
                progress.stop();
            }
        }
        log::debug!("{} queue disposed ({} pending dropped)", self.name, drained.len());
        drop(drained);
        self.permits.close();
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: T::Key) -> bool {
        self.lock().items.contains_key(&key)
    }

    /// Keys in insertion order
    pub fn pending_keys(&self) -> Vec<T::Key> {
        let state = self.lock();
        let mut keys: Vec<_> = state.items.iter().map(|(k, p)| (p.seq, *k)).collect();
        keys.sort_by_key(|(seq, _)| *seq);
        keys.into_iter().map(|(_, k)| k).collect()
    }

    /// Inspect a pending item without dequeuing it
    pub fn with_pending<R>(&self, key: T::Key, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.lock().items.get(&key).map(|p| f(&p.item))
    }

    pub fn load(&self) -> TierLoad {
        *self.load.borrow()
    }

    #[must_use]
    pub fn subscribe_load(&self) -> watch::Receiver<TierLoad> {
        self.load.subscribe()
    }
}

/// Calls [`WorkQueue::mark_done`] exactly once, whatever way the execution ends
pub struct ExecutionGuard<'a, T: QueueEntry> {
    queue: &'a WorkQueue<T>,
    lease: ExecutionLease<T::Key>,
}

impl<'a, T: QueueEntry> ExecutionGuard<'a, T> {
    pub fn new(queue: &'a WorkQueue<T>, lease: ExecutionLease<T::Key>) -> Self {
        Self { queue, lease }
    }

    pub fn lease(&self) -> &ExecutionLease<T::Key> {
        &self.lease
    }
}

impl<T: QueueEntry> Drop for ExecutionGuard<'_, T> {
    fn drop(&mut self) {
        self.queue.mark_done(&self.lease);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::OperationTracker;
    use crate::work_item::{AnalyzerFilter, InvocationReason, InvocationReasons, WorkItem, WorkItemKey};
    use crate::AnalyzerId;
    use crawler_workspace::{DocumentId, Language};
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeSet, HashSet};

    fn queue() -> (WorkQueue<WorkItem>, Arc<ProgressReporter>, CancellationToken) {
        let progress = Arc::new(ProgressReporter::new());
        let shutdown = CancellationToken::new();
        (
            WorkQueue::new("test", Some(Arc::clone(&progress)), shutdown.clone()),
            progress,
            shutdown,
        )
    }

    fn doc(id: u32, project: u32) -> WorkItem {
        WorkItem::document(
            DocumentId::from_raw(id),
            ProjectId::from_raw(project),
            Language::Rust,
            InvocationReasons::syntax_and_semantic(),
        )
    }

    fn key(id: u32) -> WorkItemKey {
        WorkItemKey::Document(DocumentId::from_raw(id))
    }

    struct Flagged(HashSet<ProjectId>);

    impl DiagnosticsSource for Flagged {
        fn has_outstanding_diagnostics(&self, project: ProjectId) -> bool {
            self.0.contains(&project)
        }
    }

    #[test]
    fn repeated_adds_merge_into_one_item() {
        let (queue, progress, _) = queue();
        let reasons = [
            InvocationReason::DocumentOpened,
            InvocationReason::SyntaxChanged,
            InvocationReason::Reanalyze,
        ];
        let mut added = Vec::new();
        for (i, reason) in reasons.into_iter().enumerate() {
            let item = WorkItem::document(
                DocumentId::from_raw(1),
                ProjectId::from_raw(1),
                Language::Rust,
                InvocationReasons::new([reason]),
            )
            .with_filter(AnalyzerFilter::only(AnalyzerId::from_index(i)));
            added.push(queue.add_or_replace(item));
        }

        assert_eq!(added, vec![true, false, false]);
        assert_eq!(queue.len(), 1);
        assert_eq!(progress.pending(), 1);

        let (item, lease) = queue.try_take(key(1)).unwrap();
        assert_eq!(item.reasons, InvocationReasons::new(reasons));
        assert_eq!(
            item.filter,
            AnalyzerFilter::Only(BTreeSet::from([
                AnalyzerId::from_index(0),
                AnalyzerId::from_index(1),
                AnalyzerId::from_index(2),
            ]))
        );
        queue.mark_done(&lease);
        assert!(!progress.in_progress());
    }

    #[test]
    fn readd_does_not_cancel_running_execution() {
        let (queue, progress, _) = queue();
        queue.add_or_replace(doc(1, 1));
        let (_first, first_lease) = queue.try_take(key(1)).unwrap();

        assert!(queue.add_or_replace(doc(1, 1)));
        assert!(!first_lease.is_cancelled());
        assert_eq!(progress.pending(), 2);

        let (_second, second_lease) = queue.try_take(key(1)).unwrap();
        queue.mark_done(&first_lease);
        assert_eq!(queue.load().executing, 1);

        // The newer lease still owns the key's token slot
        queue.cancel_running();
        assert!(second_lease.is_cancelled());
        queue.mark_done(&second_lease);
        assert_eq!(progress.pending(), 0);
        assert_eq!(queue.load(), TierLoad::default());
    }

    #[test]
    fn take_any_prefers_hint_then_diagnostics_then_insertion_order() {
        let (queue, _, _) = queue();
        let mut graph = ProjectDependencyGraph::new();
        let core = ProjectId::from_raw(1);
        let app = ProjectId::from_raw(2);
        let other = ProjectId::from_raw(3);
        graph.add_reference(app, core);
        graph.add_project(other);

        queue.add_or_replace(doc(30, 3));
        queue.add_or_replace(doc(20, 2));
        queue.add_or_replace(doc(31, 3));
        queue.add_or_replace(doc(10, 1));

        let diagnostics = Flagged(HashSet::from([app, other]));
        let hint = WorkHint {
            key: None,
            project: Some(core),
        };

        let order: Vec<_> = std::iter::from_fn(|| {
            queue
                .try_take_any_work(hint, &graph, &diagnostics)
                .map(|(item, lease)| {
                    queue.mark_done(&lease);
                    item.key
                })
        })
        .collect();

        assert_eq!(order, vec![key(10), key(20), key(30), key(31)]);
    }

    #[test]
    fn take_any_prefers_normal_priority_within_bucket() {
        let (queue, _, _) = queue();
        let graph = ProjectDependencyGraph::new();
        queue.add_or_replace(doc(1, 1).with_low_priority(true));
        queue.add_or_replace(doc(2, 1));

        let (item, _) = queue
            .try_take_any_work(WorkHint::none(), &graph, &NoDiagnostics)
            .unwrap();
        assert_eq!(item.key, key(2));
    }

    #[test]
    fn hinted_key_wins() {
        let (queue, _, _) = queue();
        let graph = ProjectDependencyGraph::new();
        queue.add_or_replace(doc(1, 1));
        queue.add_or_replace(doc(2, 1));
        let hint = WorkHint {
            key: Some(key(2)),
            project: None,
        };
        let (item, _) = queue.try_take_any_work(hint, &graph, &NoDiagnostics).unwrap();
        assert_eq!(item.key, key(2));
    }

    #[test]
    fn dispose_cancels_tokens_and_releases_progress() {
        let tracker = OperationTracker::new();
        let (queue, progress, _) = queue();
        queue.add_or_replace(doc(1, 1).with_completion(tracker.begin()));
        queue.add_or_replace(doc(2, 1).with_completion(tracker.begin()));
        let (running, lease) = queue.try_take(key(1)).unwrap();

        queue.dispose();
        assert!(lease.is_cancelled());
        assert!(queue.is_empty());
        assert_eq!(tracker.outstanding(), 1);
        assert!(!queue.add_or_replace(doc(3, 1)));

        drop(running);
        queue.mark_done(&lease);
        assert_eq!(tracker.outstanding(), 0);
        assert!(!progress.in_progress());
    }

    #[test]
    fn shutdown_cancels_leases() {
        let (queue, _, shutdown) = queue();
        queue.add_or_replace(doc(1, 1));
        let (_, lease) = queue.try_take(key(1)).unwrap();
        shutdown.cancel();
        assert!(lease.is_cancelled());
    }

    #[test]
    fn guard_marks_done_when_execution_panics() {
        let (queue, progress, _) = queue();
        queue.add_or_replace(doc(1, 1));
        let (_, lease) = queue.try_take(key(1)).unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ExecutionGuard::new(&queue, lease);
            panic!("analyzer blew up");
        }));

        assert!(outcome.is_err());
        assert!(!progress.in_progress());
        assert_eq!(queue.load(), TierLoad::default());
    }

    #[tokio::test]
    async fn wait_for_work_returns_false_after_dispose() {
        let (queue, _, _) = queue();
        queue.add_or_replace(doc(1, 1));
        assert!(queue.wait_for_work().await);
        queue.dispose();
        assert!(!queue.wait_for_work().await);
    }

    #[test]
    fn pending_keys_follow_insertion_order() {
        let (queue, _, _) = queue();
        queue.add_or_replace(doc(3, 1));
        queue.add_or_replace(doc(1, 1));
        queue.add_or_replace(doc(3, 1));
        assert_eq!(queue.pending_keys(), vec![key(3), key(1)]);
        assert_eq!(
            queue.with_pending(key(1), |item| item.project_id),
            Some(ProjectId::from_raw(1))
        );
    }
}
