use crate::context::SharedContext;
use crate::processor;
use crate::propagation;
use crate::queue::WorkHint;
use crate::tier::Tier;
use crate::work_item::WorkItemKey;
use crawler_workspace::ProjectId;
use std::sync::Arc;
use tokio::time::sleep;

/// Keeps a project's compilation state warm while a tier drains it
pub trait CachePinner: Send + Sync {
    fn pin(&self, project: ProjectId);

    fn unpin(&self, project: ProjectId);
}

/// The project currently pinned by one tier
struct ProjectPin {
    pinner: Option<Arc<dyn CachePinner>>,
    current: Option<ProjectId>,
}

impl ProjectPin {
    fn new(pinner: Option<Arc<dyn CachePinner>>) -> Self {
        Self {
            pinner,
            current: None,
        }
    }

    fn switch_to(&mut self, project: ProjectId) {
        if self.current == Some(project) {
            return;
        }
        self.release();
        if let Some(pinner) = &self.pinner {
            pinner.pin(project);
            self.current = Some(project);
        }
    }

    fn release(&mut self) {
        if let (Some(pinner), Some(project)) = (&self.pinner, self.current.take()) {
            pinner.unpin(project);
        }
    }
}

impl Drop for ProjectPin {
    fn drop(&mut self) {
        self.release();
    }
}

/// Sleep out the tier's quiet period, yield to busier higher tiers and wait
/// while a global operation runs. Returns `false` on shutdown.
pub(crate) async fn wait_until_clear(cx: &SharedContext, tier: Tier) -> bool {
    let clock = cx.clock(tier);
    let backoff = cx.config.backoff(tier);
    loop {
        if cx.shutdown.is_cancelled() {
            return false;
        }

        if cx.is_paused() {
            log::debug!("{tier} tier paused");
            let mut paused = cx.paused_watch();
            tokio::select! {
                biased;
                _ = cx.shutdown.cancelled() => return false,
                _ = paused.wait_for(|paused| !*paused) => {}
            }
            clock.touch();
            continue;
        }

        let elapsed = clock.elapsed();
        if elapsed < backoff {
            let nap = (backoff - elapsed).max(cx.config.min_backoff_slice());
            tokio::select! {
                biased;
                _ = cx.shutdown.cancelled() => return false,
                _ = sleep(nap) => {}
            }
            continue;
        }

        if let Some(higher) = busy_higher_tier(cx, tier) {
            let mut load = cx.queue(higher).subscribe_load();
            tokio::select! {
                biased;
                _ = cx.shutdown.cancelled() => return false,
                _ = load.wait_for(|load| load.is_idle()) => {}
            }
            clock.touch();
            continue;
        }

        return true;
    }
}

/// First tier above `tier` with pending or executing work
fn busy_higher_tier(cx: &SharedContext, tier: Tier) -> Option<Tier> {
    tier.higher()
        .iter()
        .copied()
        .find(|higher| !cx.queue(*higher).load().is_idle())
}

/// Consumer loop of one analysis tier
pub(crate) async fn run_tier(cx: Arc<SharedContext>, tier: Tier) {
    let queue = cx.queue(tier);
    let pin_projects = matches!(tier, Tier::Normal | Tier::Low);
    let mut pin = ProjectPin::new(if pin_projects {
        cx.services.cache_pinner.clone()
    } else {
        None
    });
    let mut last_project: Option<ProjectId> = None;
    log::debug!("{tier} tier started");

    'work: loop {
        let has_work = tokio::select! {
            biased;
            _ = cx.shutdown.cancelled() => false,
            more = queue.wait_for_work() => more,
        };
        if !has_work {
            break;
        }

        let (solution, item, lease) = loop {
            if !wait_until_clear(&cx, tier).await {
                break 'work;
            }
            let solution = cx.workspace.current_solution();
            let graph = cx.graph_for(&solution);
            let active = cx.workspace.active_document();
            let hint = WorkHint {
                key: active.map(WorkItemKey::Document),
                project: active
                    .and_then(|doc| solution.owning_project(doc))
                    .or(last_project),
            };
            // Higher-tier work may have arrived after the gate
            if busy_higher_tier(&cx, tier).is_some() {
                continue;
            }
            match queue.try_take_any_work(hint, &graph, cx.services.diagnostics.as_ref()) {
                Some((item, lease)) => break (solution, item, lease),
                None => continue 'work,
            }
        };

        if cx.is_paused() {
            // A global operation began after the gate; put the item back
            queue.add_or_replace(item);
            queue.mark_done(&lease);
            continue;
        }

        last_project = Some(item.project_id);
        if pin_projects {
            pin.switch_to(item.project_id);
        }
        processor::execute(&cx, tier, solution, item, lease).await;

        if queue.is_empty() {
            pin.release();
        }
    }

    pin.release();
    queue.dispose();
    log::debug!("{tier} tier stopped");
}

/// Consumer loop of the propagation queue
pub(crate) async fn run_propagation(cx: Arc<SharedContext>) {
    let queue = cx.propagation_queue();
    log::debug!("propagation loop started");
    loop {
        let has_work = tokio::select! {
            biased;
            _ = cx.shutdown.cancelled() => false,
            more = queue.wait_for_work() => more,
        };
        if !has_work || !wait_until_clear(&cx, Tier::Propagation).await {
            break;
        }

        let solution = cx.workspace.current_solution();
        let graph = cx.graph_for(&solution);
        let Some((request, lease)) = queue.try_take_any_work(
            WorkHint::none(),
            &graph,
            cx.services.diagnostics.as_ref(),
        ) else {
            continue;
        };
        propagation::execute(&cx, &solution, &graph, request, lease);
    }
    queue.dispose();
    log::debug!("propagation loop stopped");
}

/// Cancels executing items when a global operation starts and restarts
/// every backoff window when it ends
pub(crate) async fn run_pause_listener(cx: Arc<SharedContext>) {
    let mut paused = cx.paused_watch();
    loop {
        tokio::select! {
            biased;
            _ = cx.shutdown.cancelled() => break,
            changed = paused.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        let now_paused = *paused.borrow_and_update();
        if now_paused {
            for (_, queue) in cx.tier_queues() {
                queue.cancel_running();
            }
            cx.propagation_queue().cancel_running();
        } else {
            cx.touch_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerSet;
    use crate::config::CoordinatorConfig;
    use crate::context::CoordinatorServices;
    use crate::work_item::{InvocationReasons, WorkItem};
    use crawler_workspace::{DocumentId, Language, Workspace, WorkspaceKind};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(bool, ProjectId)>>);

    impl CachePinner for Recorder {
        fn pin(&self, project: ProjectId) {
            self.0.lock().unwrap().push((true, project));
        }

        fn unpin(&self, project: ProjectId) {
            self.0.lock().unwrap().push((false, project));
        }
    }

    #[test]
    fn pin_switches_and_releases_once() {
        let recorder = Arc::new(Recorder::default());
        let a = ProjectId::from_raw(1);
        let b = ProjectId::from_raw(2);
        {
            let mut pin = ProjectPin::new(Some(recorder.clone() as Arc<dyn CachePinner>));
            pin.switch_to(a);
            pin.switch_to(a);
            pin.switch_to(b);
        }
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![(true, a), (false, a), (true, b), (false, b)]
        );
    }

    #[test]
    fn pending_or_running_higher_work_blocks_lower_tiers() {
        let cx = SharedContext::new(
            CoordinatorConfig::for_tests(),
            Arc::new(Workspace::new(WorkspaceKind::Host)),
            AnalyzerSet::new(),
            CoordinatorServices::default(),
        );
        assert_eq!(busy_higher_tier(&cx, Tier::Low), None);

        let doc = DocumentId::from_raw(1);
        let active = cx.queue(Tier::ActiveFile);
        active.add_or_replace(WorkItem::document(
            doc,
            ProjectId::from_raw(1),
            Language::Rust,
            InvocationReasons::syntax_and_semantic(),
        ));
        assert_eq!(busy_higher_tier(&cx, Tier::Normal), Some(Tier::ActiveFile));
        assert_eq!(busy_higher_tier(&cx, Tier::Low), Some(Tier::ActiveFile));
        assert_eq!(busy_higher_tier(&cx, Tier::ActiveFile), None);

        let (_, lease) = active.try_take(WorkItemKey::Document(doc)).unwrap();
        assert_eq!(busy_higher_tier(&cx, Tier::Normal), Some(Tier::ActiveFile));
        active.mark_done(&lease);
        assert_eq!(busy_higher_tier(&cx, Tier::Normal), None);
    }
}
