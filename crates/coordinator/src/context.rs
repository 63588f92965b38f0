use crate::analyzer::AnalyzerSet;
use crate::config::{BackgroundAnalysisScope, CoordinatorConfig};
use crate::error::CoordinatorError;
use crate::global_ops::GlobalOperationService;
use crate::idle::CachePinner;
use crate::processor::{AnalyzerFault, FaultSink, LogFaultSink};
use crate::progress::ProgressReporter;
use crate::propagation::{CompilationCache, NoCompilationCache, PropagationRequest};
use crate::queue::{DiagnosticsSource, NoDiagnostics, WorkQueue};
use crate::tier::{ActivityClock, Tier};
use crate::tracker::OperationTracker;
use crate::work_item::{WorkItem, WorkItemKey};
use crawler_graph::ProjectDependencyGraph;
use crawler_syntax::TreeCache;
use crawler_workspace::{DocumentId, Solution, Workspace};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Collaborators the host plugs into a coordinator
#[derive(Clone)]
pub struct CoordinatorServices {
    pub compilation_cache: Arc<dyn CompilationCache>,
    pub diagnostics: Arc<dyn DiagnosticsSource>,
    pub fault_sink: Arc<dyn FaultSink>,
    pub cache_pinner: Option<Arc<dyn CachePinner>>,
    pub global_operations: Arc<GlobalOperationService>,
}

impl Default for CoordinatorServices {
    fn default() -> Self {
        Self {
            compilation_cache: Arc::new(NoCompilationCache),
            diagnostics: Arc::new(NoDiagnostics),
            fault_sink: Arc::new(LogFaultSink),
            cache_pinner: None,
            global_operations: GlobalOperationService::new(),
        }
    }
}

/// First analyzer failure seen under the fail-fast policy
#[derive(Debug, Clone)]
pub(crate) struct Failure {
    pub analyzer: String,
    pub target: WorkItemKey,
    pub message: String,
}

impl Failure {
    pub(crate) fn to_error(&self) -> CoordinatorError {
        CoordinatorError::AnalyzerFailed {
            analyzer: self.analyzer.clone(),
            target: self.target.to_string(),
            message: self.message.clone(),
        }
    }
}

/// State every tier loop, the event pump and the propagator share
pub(crate) struct SharedContext {
    pub config: CoordinatorConfig,
    pub workspace: Arc<Workspace>,
    pub services: CoordinatorServices,
    pub progress: Arc<ProgressReporter>,
    pub tracker: Arc<OperationTracker>,
    pub trees: TreeCache,
    pub shutdown: CancellationToken,
    analyzers: RwLock<Arc<AnalyzerSet>>,
    queues: [WorkQueue<WorkItem>; 3],
    propagation: WorkQueue<PropagationRequest>,
    clocks: [ActivityClock; 4],
    graph: Mutex<Option<Arc<ProjectDependencyGraph>>>,
    failure: Mutex<Option<Failure>>,
    paused: watch::Receiver<bool>,
}

impl SharedContext {
    pub(crate) fn new(
        config: CoordinatorConfig,
        workspace: Arc<Workspace>,
        analyzers: AnalyzerSet,
        services: CoordinatorServices,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let progress = Arc::new(ProgressReporter::new());
        let tier_queue = |tier: Tier| {
            WorkQueue::new(tier.as_str(), Some(Arc::clone(&progress)), shutdown.clone())
        };
        let queues = [
            tier_queue(Tier::ActiveFile),
            tier_queue(Tier::Normal),
            tier_queue(Tier::Low),
        ];
        let propagation = WorkQueue::new(Tier::Propagation.as_str(), None, shutdown.clone());
        let paused = services.global_operations.paused();
        Self {
            trees: TreeCache::new(config.tree_cache_capacity),
            config,
            workspace,
            progress,
            tracker: OperationTracker::new(),
            analyzers: RwLock::new(Arc::new(analyzers)),
            queues,
            propagation,
            clocks: [
                ActivityClock::new(),
                ActivityClock::new(),
                ActivityClock::new(),
                ActivityClock::new(),
            ],
            graph: Mutex::new(None),
            failure: Mutex::new(None),
            paused,
            services,
            shutdown,
        }
    }

    /// Queue of an analysis tier
    pub(crate) fn queue(&self, tier: Tier) -> &WorkQueue<WorkItem> {
        match tier {
            Tier::ActiveFile | Tier::Normal | Tier::Low => &self.queues[tier.index()],
            // Propagation output lands on the project queue
            Tier::Propagation => &self.queues[Tier::Low.index()],
        }
    }

    pub(crate) fn tier_queues(&self) -> impl Iterator<Item = (Tier, &WorkQueue<WorkItem>)> {
        Tier::ANALYSIS.into_iter().map(|tier| (tier, self.queue(tier)))
    }

    pub(crate) fn propagation_queue(&self) -> &WorkQueue<PropagationRequest> {
        &self.propagation
    }

    pub(crate) fn clock(&self, tier: Tier) -> &ActivityClock {
        &self.clocks[tier.index()]
    }

    pub(crate) fn touch_all(&self) {
        for clock in &self.clocks {
            clock.touch();
        }
    }

    pub(crate) fn analyzers(&self) -> Arc<AnalyzerSet> {
        self.analyzers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy-on-write update of the analyzer set
    pub(crate) fn update_analyzers<R>(&self, f: impl FnOnce(&mut AnalyzerSet) -> R) -> R {
        let mut guard = self.analyzers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = AnalyzerSet::clone(&guard);
        let out = f(&mut next);
        *guard = Arc::new(next);
        out
    }

    pub(crate) fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub(crate) fn paused_watch(&self) -> watch::Receiver<bool> {
        self.paused.clone()
    }

    /// Dependency graph for `solution`, rebuilt only when references changed
    pub(crate) fn graph_for(&self, solution: &Solution) -> Arc<ProjectDependencyGraph> {
        let mut cached = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        match cached.as_ref() {
            Some(graph) if graph.graph_version() == solution.graph_version() => Arc::clone(graph),
            _ => {
                let graph = Arc::new(ProjectDependencyGraph::from_solution(solution));
                *cached = Some(Arc::clone(&graph));
                graph
            }
        }
    }

    /// Drop the cached graph; solution replacements restart version numbering
    pub(crate) fn invalidate_graph(&self) {
        *self.graph.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Put `item` on an analysis tier, tracking it until it is processed
    pub(crate) fn enqueue(&self, tier: Tier, item: WorkItem) -> bool {
        let item = if item.completion.is_some() {
            item
        } else {
            item.with_completion(self.tracker.begin())
        };
        self.clock(tier).touch();
        self.queue(tier).add_or_replace(item)
    }

    pub(crate) fn enqueue_propagation(&self, mut request: PropagationRequest) -> bool {
        if request.completion.is_none() {
            request.completion = Some(self.tracker.begin());
        }
        self.clock(Tier::Propagation).touch();
        self.propagation.add_or_replace(request)
    }

    /// Whether the configured background scope covers this item
    pub(crate) fn in_scope(&self, item: &WorkItem) -> bool {
        if item.reasons.bypasses_scope() {
            return true;
        }
        let active = self.workspace.active_document();
        match (self.config.scope_for(item.language), item.key) {
            (BackgroundAnalysisScope::FullSolution, _) => true,
            (BackgroundAnalysisScope::OpenFilesAndProjects, WorkItemKey::Project(_)) => true,
            (BackgroundAnalysisScope::OpenFilesAndProjects, WorkItemKey::Document(id)) => {
                active == Some(id) || self.workspace.is_open(id)
            }
            (BackgroundAnalysisScope::ActiveFile, WorkItemKey::Document(id)) => active == Some(id),
            (BackgroundAnalysisScope::ActiveFile, WorkItemKey::Project(_)) => false,
        }
    }

    /// Enqueue a document item to the normal tier and, when it is the active
    /// document, a copy to the active-file tier
    pub(crate) fn enqueue_document(&self, item: WorkItem) {
        if !self.in_scope(&item) {
            log::debug!("{} outside background analysis scope", item.key);
            return;
        }
        let mirror = item
            .document_id()
            .filter(|id| self.wants_active_file_copy(*id))
            .map(|_| item.duplicate(self.tracker.begin()));
        self.enqueue(Tier::Normal, item);
        if let Some(copy) = mirror {
            self.enqueue(Tier::ActiveFile, copy);
        }
    }

    pub(crate) fn enqueue_project(&self, item: WorkItem) {
        if self.in_scope(&item) {
            self.enqueue(Tier::Low, item);
        }
    }

    pub(crate) fn wants_active_file_copy(&self, document: DocumentId) -> bool {
        self.workspace.tracks_active_document()
            && self.workspace.active_document() == Some(document)
            && self.analyzers().has_high_priority()
    }

    /// Remember the first fail-fast failure and stop the coordinator
    pub(crate) fn fail(&self, fault: &AnalyzerFault) {
        {
            let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
            if failure.is_none() {
                *failure = Some(Failure {
                    analyzer: fault.analyzer.clone(),
                    target: fault.target,
                    message: fault.message.clone(),
                });
            }
        }
        log::error!("halting background analysis after analyzer failure");
        self.shutdown.cancel();
    }

    pub(crate) fn failure(&self) -> Option<Failure> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
