//! # Crawler Coordinator
//!
//! Incremental background analysis for a workspace of projects.
//!
//! ## Pipeline
//!
//! ```text
//! WorkspaceEvent stream
//!     │
//!     ├──> Event pump + differencing
//!     │      ├─> member-body edit  → MemberBodyChanged (+ member handle)
//!     │      └─> whole-file edit   → SyntaxChanged + SemanticChanged
//!     │                                 └─> propagation queue
//!     │
//!     ├──> Tier queues (keyed, merging)
//!     │      ├─ active-file  (high-priority analyzers, active document)
//!     │      ├─ normal       (documents)
//!     │      └─ low          (projects)
//!     │
//!     ├──> Idle/backoff loops, one per tier
//!     │      └─ quiet period → wait for higher tiers → run one item
//!     │
//!     └──> Analyzer dispatch (fault-contained, cancellable)
//! ```
//!
//! Semantic changes are fanned out by accessibility: private members stay in
//! the files declaring their type, internal declarations reach dependents
//! with access, everything else reaches the project and its dependents.
//!
//! ## Example
//!
//! ```no_run
//! use crawler_coordinator::{AnalyzerSet, CoordinatorConfig, CoordinatorServices, WorkCoordinator};
//! use crawler_workspace::{Workspace, WorkspaceKind};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let workspace = Arc::new(Workspace::new(WorkspaceKind::Host));
//!     let coordinator = WorkCoordinator::start(
//!         workspace,
//!         CoordinatorConfig::default(),
//!         AnalyzerSet::new(),
//!         CoordinatorServices::default(),
//!     )?;
//!
//!     coordinator.wait_for_quiescence().await?;
//!     coordinator.shutdown(true).await?;
//!     Ok(())
//! }
//! ```

mod analyzer;
mod config;
mod context;
mod coordinator;
mod differencing;
mod error;
mod global_ops;
mod idle;
mod processor;
mod progress;
mod propagation;
mod queue;
mod registry;
mod tier;
mod tracker;
mod work_item;

pub use analyzer::{
    AnalysisContext, AnalysisResult, AnalyzerCapabilities, AnalyzerEntry, AnalyzerId,
    AnalyzerMetadata, AnalyzerProvider, AnalyzerSet, DocumentScope, IncrementalAnalyzer,
};
pub use config::{
    BackgroundAnalysisScope, CoordinatorConfig, FaultPolicy, PropagationMode, ENV_BACKOFF_MS,
    ENV_PROPAGATION,
};
pub use context::CoordinatorServices;
pub use coordinator::WorkCoordinator;
pub use differencing::{classify_edit, EditClassification};
pub use error::{AnalysisError, CoordinatorError, Result};
pub use global_ops::{GlobalOperationEvent, GlobalOperationGuard, GlobalOperationService};
pub use idle::CachePinner;
pub use processor::{
    AnalysisPass, AnalyzerFault, FailureDiagnostic, FaultSink, LogFaultSink, ANALYZER_FAILURE_CODE,
};
pub use progress::{ProgressEvent, ProgressReporter};
pub use propagation::{
    CompilationCache, InMemoryCompilationCache, NoCompilationCache, Planner, PropagationPlan,
    PropagationRequest,
};
pub use queue::{
    DiagnosticsSource, ExecutionGuard, ExecutionLease, NoDiagnostics, QueueEntry, WorkHint,
    WorkQueue,
};
pub use registry::AnalyzerRegistry;
pub use tier::{Tier, TierLoad};
pub use tracker::{CompletionToken, OperationTracker};
pub use work_item::{
    ActiveMember, AnalyzerFilter, InvocationReason, InvocationReasons, ReanalyzeScope, WorkItem,
    WorkItemKey,
};
