use crate::analyzer::{AnalyzerId, AnalyzerMetadata, AnalyzerSet, IncrementalAnalyzer};
use crate::config::CoordinatorConfig;
use crate::context::{CoordinatorServices, SharedContext};
use crate::differencing;
use crate::error::{CoordinatorError, Result};
use crate::idle;
use crate::progress::ProgressReporter;
use crate::tier::{Tier, TierLoad};
use crate::tracker::CompletionToken;
use crate::work_item::{ReanalyzeScope, WorkItem};
use crawler_workspace::{Workspace, WorkspaceEvent};
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Requests from the public API that the event pump serializes with
/// workspace events
enum Command {
    Reanalyze {
        analyzer: Option<AnalyzerId>,
        scope: ReanalyzeScope,
        high_priority: bool,
        _completion: CompletionToken,
    },
}

struct Inner {
    cx: Arc<SharedContext>,
    commands: mpsc::UnboundedSender<Command>,
    /// Count of workspace events the pump has turned into work items
    processed: watch::Receiver<u64>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cx.shutdown.cancel();
    }
}

/// Background analysis coordinator for one workspace.
///
/// Owns three idle/backoff tier loops (active file, documents, projects), a
/// propagation loop, an event pump and a global-operation listener. Cloning
/// is cheap; the loops stop on [`WorkCoordinator::shutdown`] or when the last
/// clone is dropped.
#[derive(Clone)]
pub struct WorkCoordinator {
    inner: Arc<Inner>,
}

impl WorkCoordinator {
    /// Start coordinating `workspace`. Must be called inside a tokio runtime.
    ///
    /// The current solution is enqueued as if it had just been added.
    pub fn start(
        workspace: Arc<Workspace>,
        config: CoordinatorConfig,
        analyzers: AnalyzerSet,
        services: CoordinatorServices,
    ) -> Result<Self> {
        config.validate()?;

        // Subscribe before reading the baseline so no event falls in between
        let events = workspace.subscribe();
        let baseline = workspace.published_events();
        let (processed_tx, processed) = watch::channel(baseline);
        let (commands, command_rx) = mpsc::unbounded_channel();

        log::info!(
            "starting work coordinator ({} analyzers, {:?} propagation)",
            analyzers.len(),
            config.propagation
        );
        let cx = Arc::new(SharedContext::new(config, workspace, analyzers, services));
        let solution = cx.workspace.current_solution();
        differencing::enqueue_solution(&cx, &solution, false);

        let mut tasks = Vec::with_capacity(6);
        for tier in Tier::ANALYSIS {
            tasks.push(tokio::spawn(idle::run_tier(Arc::clone(&cx), tier)));
        }
        tasks.push(tokio::spawn(idle::run_propagation(Arc::clone(&cx))));
        tasks.push(tokio::spawn(idle::run_pause_listener(Arc::clone(&cx))));
        tasks.push(tokio::spawn(run_pump(
            Arc::clone(&cx),
            events,
            command_rx,
            processed_tx,
            baseline,
        )));

        Ok(Self {
            inner: Arc::new(Inner {
                cx,
                commands,
                processed,
                tasks: Mutex::new(tasks),
            }),
        })
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.inner.cx.workspace
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.cx.config
    }

    pub fn progress(&self) -> Arc<ProgressReporter> {
        Arc::clone(&self.inner.cx.progress)
    }

    pub fn analyzers(&self) -> Arc<AnalyzerSet> {
        self.inner.cx.analyzers()
    }

    pub fn tier_load(&self, tier: Tier) -> TierLoad {
        self.inner.cx.queue(tier).load()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cx.shutdown.is_cancelled()
    }

    /// Force reanalysis of `scope`, optionally restricted to one analyzer.
    /// The scope is expanded against the solution current when the request
    /// reaches the event pump.
    pub fn reanalyze(
        &self,
        analyzer: Option<AnalyzerId>,
        scope: ReanalyzeScope,
        high_priority: bool,
    ) -> Result<()> {
        let cx = &self.inner.cx;
        if cx.shutdown.is_cancelled() {
            return Err(CoordinatorError::ShutDown);
        }
        let command = Command::Reanalyze {
            analyzer,
            scope,
            high_priority,
            _completion: cx.tracker.begin(),
        };
        self.inner
            .commands
            .send(command)
            .map_err(|_| CoordinatorError::ShutDown)
    }

    /// Put a host-built item straight onto a tier queue
    pub fn enqueue(&self, tier: Tier, item: WorkItem) -> bool {
        self.inner.cx.enqueue(tier, item)
    }

    /// Add an analyzer to the running coordinator. Returns `None` when its
    /// metadata excludes this workspace kind.
    pub fn add_analyzer(
        &self,
        metadata: AnalyzerMetadata,
        analyzer: Arc<dyn IncrementalAnalyzer>,
    ) -> Option<AnalyzerId> {
        let cx = &self.inner.cx;
        if !metadata.applies_to(cx.workspace.kind()) {
            log::debug!("analyzer '{}' does not apply to this workspace", metadata.name);
            return None;
        }
        let name = metadata.name.clone();
        let id = cx.update_analyzers(|set| set.push(metadata, analyzer));
        log::info!("analyzer '{name}' added as {id}");
        Some(id)
    }

    /// Resolves once every published workspace event has been turned into
    /// work and all that work (including propagation fan-out) has run.
    pub async fn wait_for_quiescence(&self) -> Result<()> {
        let cx = &self.inner.cx;
        let mut processed = self.inner.processed.clone();
        loop {
            let target = cx.workspace.published_events();
            let settled = async {
                let _ = processed.wait_for(|n| *n >= target).await;
                cx.tracker.wait_idle().await;
            };
            tokio::select! {
                biased;
                _ = cx.shutdown.cancelled() => {
                    return Err(cx.failure().map_or(CoordinatorError::ShutDown, |f| f.to_error()));
                }
                _ = settled => {}
            }
            if cx.workspace.published_events() == target && cx.tracker.outstanding() == 0 {
                return Ok(());
            }
        }
    }

    /// Stop every loop. With `blocking`, wait up to the configured grace
    /// period for in-flight work to observe cancellation.
    ///
    /// Returns the first analyzer failure under the fail-fast policy.
    pub async fn shutdown(&self, blocking: bool) -> Result<()> {
        let cx = &self.inner.cx;
        if !cx.shutdown.is_cancelled() {
            log::info!("shutting down work coordinator");
        }
        cx.shutdown.cancel();
        for (_, queue) in cx.tier_queues() {
            queue.dispose();
        }
        cx.propagation_queue().dispose();

        let tasks = std::mem::take(&mut *self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        if blocking && !tasks.is_empty() {
            let grace = cx.config.shutdown_grace();
            match timeout(grace, join_all(tasks)).await {
                Ok(results) => {
                    for result in results {
                        if let Err(err) = result {
                            log::warn!("coordinator task ended abnormally: {err}");
                        }
                    }
                }
                Err(_) => log::warn!(
                    "background analysis did not stop within {}ms; abandoning it",
                    grace.as_millis()
                ),
            }
        }

        match cx.failure() {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

/// Serializes workspace events and API commands into queue mutations
async fn run_pump(
    cx: Arc<SharedContext>,
    mut events: broadcast::Receiver<WorkspaceEvent>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    processed: watch::Sender<u64>,
    baseline: u64,
) {
    let mut seen = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = cx.shutdown.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    differencing::handle_event(&cx, event);
                    seen += 1;
                }
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("missed {missed} workspace events, reanalyzing the solution");
                    cx.invalidate_graph();
                    differencing::expand_reanalyze(&cx, None, &ReanalyzeScope::Solution, false);
                    seen += missed;
                }
                Err(RecvError::Closed) => break,
            },
            Some(command) = commands.recv() => match command {
                Command::Reanalyze { analyzer, scope, high_priority, _completion } => {
                    differencing::expand_reanalyze(&cx, analyzer, &scope, high_priority);
                }
            },
        }
        processed.send_replace(baseline + seen);
    }
    log::debug!("event pump stopped");
}
