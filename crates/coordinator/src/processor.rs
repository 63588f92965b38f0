use crate::analyzer::{AnalysisContext, AnalysisResult, AnalyzerEntry, AnalyzerId, DocumentScope};
use crate::config::FaultPolicy;
use crate::context::SharedContext;
use crate::error::AnalysisError;
use crate::queue::{ExecutionGuard, ExecutionLease};
use crate::tier::Tier;
use crate::work_item::{InvocationReason, InvocationReasons, WorkItem, WorkItemKey};
use crawler_syntax::LanguageExt;
use crawler_workspace::{Document, DocumentId, DocumentKind, ProjectId, Solution};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Which hook an analyzer was running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPass {
    Syntax,
    Document,
    Member,
    Project,
    Open,
    Close,
    Reset,
    RemoveDocument,
    RemoveProject,
}

impl AnalysisPass {
    pub const fn as_str(self) -> &'static str {
        match self {
            AnalysisPass::Syntax => "syntax",
            AnalysisPass::Document => "document",
            AnalysisPass::Member => "member",
            AnalysisPass::Project => "project",
            AnalysisPass::Open => "open",
            AnalysisPass::Close => "close",
            AnalysisPass::Reset => "reset",
            AnalysisPass::RemoveDocument => "remove-document",
            AnalysisPass::RemoveProject => "remove-project",
        }
    }
}

/// Synthetic diagnostic standing in for results an analyzer failed to produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDiagnostic {
    pub code: &'static str,
    pub message: String,
    pub target: WorkItemKey,
}

pub const ANALYZER_FAILURE_CODE: &str = "CRAWLER0001";

/// One analyzer pass that returned an error or panicked
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerFault {
    pub analyzer: String,
    pub analyzer_id: AnalyzerId,
    pub target: WorkItemKey,
    pub pass: AnalysisPass,
    pub message: String,
    /// Present under [`FaultPolicy::Diagnostic`]
    pub diagnostic: Option<FailureDiagnostic>,
}

/// Receives analyzer faults
pub trait FaultSink: Send + Sync {
    fn report(&self, fault: &AnalyzerFault);
}

/// Logs faults at error level
pub struct LogFaultSink;

impl FaultSink for LogFaultSink {
    fn report(&self, fault: &AnalyzerFault) {
        log::error!(
            "analyzer '{}' failed during {} pass on {}: {}",
            fault.analyzer,
            fault.pass.as_str(),
            fault.target,
            fault.message
        );
    }
}

/// How one item run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Cancelled,
}

/// Per-item dispatch state: target, snapshot, token and collected faults
struct Dispatch<'a> {
    cx: &'a SharedContext,
    target: WorkItemKey,
    solution: &'a Arc<Solution>,
    reasons: &'a InvocationReasons,
    cancel: &'a CancellationToken,
    faults: Vec<AnalyzerFault>,
}

impl<'a> Dispatch<'a> {
    fn context(&self) -> AnalysisContext<'a> {
        AnalysisContext {
            solution: self.solution,
            reasons: self.reasons,
            cancel: self.cancel,
        }
    }

    /// Run one analyzer hook behind the cancellation token and a panic
    /// boundary. `Err(())` means the item was cancelled.
    async fn call<F>(&mut self, entry: &AnalyzerEntry, pass: AnalysisPass, hook: F) -> Result<(), ()>
    where
        F: Future<Output = AnalysisResult>,
    {
        if self.cancel.is_cancelled() {
            return Err(());
        }
        let guarded = AssertUnwindSafe(hook).catch_unwind();
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(()),
            result = guarded => result,
        };
        let message = match result {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(AnalysisError::Cancelled)) => return Err(()),
            Ok(Err(AnalysisError::Failed(err))) => format!("{err:#}"),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };

        let diagnostic = (self.cx.config.fault_policy == FaultPolicy::Diagnostic).then(|| {
            FailureDiagnostic {
                code: ANALYZER_FAILURE_CODE,
                message: format!("analyzer '{}' failed: {message}", entry.metadata.name),
                target: self.target,
            }
        });
        let fault = AnalyzerFault {
            analyzer: entry.metadata.name.clone(),
            analyzer_id: entry.id,
            target: self.target,
            pass,
            message,
            diagnostic,
        };
        self.cx.services.fault_sink.report(&fault);
        self.faults.push(fault);
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Execute one dequeued item on `tier` against the sampled `solution`
pub(crate) async fn execute(
    cx: &Arc<SharedContext>,
    tier: Tier,
    solution: Arc<Solution>,
    item: WorkItem,
    lease: ExecutionLease<WorkItemKey>,
) {
    let queue = cx.queue(tier);
    let guard = ExecutionGuard::new(queue, lease);
    let cancel = guard.lease().token().clone();
    let analyzers = cx.analyzers().applicable(tier, &item.filter);
    log::debug!(
        "{tier} tier executing {} ({} analyzers, retry={})",
        item.key,
        analyzers.len(),
        item.retry
    );

    let mut dispatch = Dispatch {
        cx,
        target: item.key,
        solution: &solution,
        reasons: &item.reasons,
        cancel: &cancel,
        faults: Vec::new(),
    };
    let outcome = match item.key {
        WorkItemKey::Document(id) => process_document(&mut dispatch, &analyzers, id, &item).await,
        WorkItemKey::Project(id) => process_project(&mut dispatch, &analyzers, id).await,
    };
    let faults = std::mem::take(&mut dispatch.faults);

    if cx.config.fault_policy == FaultPolicy::FailFast {
        if let Some(fault) = faults.first() {
            cx.fail(fault);
        }
    }

    match outcome {
        Outcome::Completed => {
            if tier == Tier::Normal && item.reasons.contains(InvocationReason::SemanticChanged) {
                refresh_owning_project(cx, &solution, &item);
            }
        }
        Outcome::Cancelled if cx.shutdown.is_cancelled() => {
            log::debug!("{tier} tier dropping {} at shutdown", item.key);
        }
        Outcome::Cancelled => {
            log::debug!("{tier} tier requeueing cancelled {}", item.key);
            // Requeue before the guard releases progress so the counter never touches zero
            queue.add_or_replace(item.with_retry(true));
        }
    }
    drop(guard);
}

async fn process_document(
    dispatch: &mut Dispatch<'_>,
    analyzers: &[AnalyzerEntry],
    id: DocumentId,
    item: &WorkItem,
) -> Outcome {
    let Some(document) = dispatch.solution.document(id).cloned() else {
        dispatch.cx.trees.remove_document(id);
        for entry in analyzers {
            if dispatch
                .call(entry, AnalysisPass::RemoveDocument, entry.analyzer.remove_document(id))
                .await
                .is_err()
            {
                return Outcome::Cancelled;
            }
        }
        return Outcome::Completed;
    };
    if document.kind() != DocumentKind::Source || item.reasons.is_removal_only() {
        return Outcome::Completed;
    }

    let reasons = &item.reasons;
    let cx = dispatch.context();
    let hooks = [
        (InvocationReason::DocumentReset, AnalysisPass::Reset),
        (InvocationReason::DocumentOpened, AnalysisPass::Open),
        (InvocationReason::DocumentClosed, AnalysisPass::Close),
    ];
    for (reason, pass) in hooks {
        if !reasons.contains(reason) {
            continue;
        }
        for entry in analyzers.iter().filter(|e| e.capabilities.lifecycle) {
            let hook = match pass {
                AnalysisPass::Reset => entry.analyzer.document_reset(&cx, &document),
                AnalysisPass::Open => entry.analyzer.document_open(&cx, &document),
                _ => entry.analyzer.document_close(&cx, &document),
            };
            if dispatch.call(entry, pass, hook).await.is_err() {
                return Outcome::Cancelled;
            }
        }
    }

    if reasons.must_refresh() || reasons.contains(InvocationReason::SyntaxChanged) {
        for entry in analyzers.iter().filter(|e| e.capabilities.syntax) {
            let hook = entry.analyzer.analyze_syntax(&cx, &document);
            if dispatch.call(entry, AnalysisPass::Syntax, hook).await.is_err() {
                return Outcome::Cancelled;
            }
        }
    }

    if let Some(scope) = document_scope(dispatch.cx, &document, item) {
        let pass = match scope {
            DocumentScope::Whole => AnalysisPass::Document,
            DocumentScope::Member(_) => AnalysisPass::Member,
        };
        for entry in analyzers.iter().filter(|e| e.capabilities.document) {
            let hook = entry.analyzer.analyze_document(&cx, &document, &scope);
            if dispatch.call(entry, pass, hook).await.is_err() {
                return Outcome::Cancelled;
            }
        }
    }

    // Keep this version parsed so the next edit can be classified cheaply
    if document.language().supports_syntax() {
        if let Err(err) = dispatch.cx.trees.get_or_parse(&document) {
            log::debug!("no tree for {}: {err}", document.path().display());
        }
    }
    Outcome::Completed
}

/// Extent of the document pass an item asks for, if any
fn document_scope(cx: &SharedContext, document: &Document, item: &WorkItem) -> Option<DocumentScope> {
    let reasons = &item.reasons;
    if reasons.contains(InvocationReason::SemanticChanged) || reasons.must_refresh() {
        return Some(DocumentScope::Whole);
    }
    if !reasons.contains(InvocationReason::MemberBodyChanged) {
        return None;
    }
    let resolved = item.active_member.as_ref().and_then(|member| {
        let tree = cx.trees.get_or_parse(document).ok()?;
        tree.resolve_member(&member.path)
            .map(|_| DocumentScope::Member(member.path.clone()))
    });
    Some(resolved.unwrap_or(DocumentScope::Whole))
}

async fn process_project(
    dispatch: &mut Dispatch<'_>,
    analyzers: &[AnalyzerEntry],
    id: ProjectId,
) -> Outcome {
    let Some(project) = dispatch.solution.project(id).cloned() else {
        for entry in analyzers {
            if dispatch
                .call(entry, AnalysisPass::RemoveProject, entry.analyzer.remove_project(id))
                .await
                .is_err()
            {
                return Outcome::Cancelled;
            }
        }
        return Outcome::Completed;
    };
    if dispatch.reasons.is_removal_only() {
        return Outcome::Completed;
    }

    let semantics_changed = dispatch.reasons.contains(InvocationReason::SemanticChanged);
    let cx = dispatch.context();
    for entry in analyzers.iter().filter(|e| e.capabilities.project) {
        let hook = entry.analyzer.analyze_project(&cx, &project, semantics_changed);
        if dispatch.call(entry, AnalysisPass::Project, hook).await.is_err() {
            return Outcome::Cancelled;
        }
    }
    Outcome::Completed
}

/// Project-level analyzers see every semantic document change
fn refresh_owning_project(cx: &SharedContext, solution: &Solution, item: &WorkItem) {
    if !solution.contains_project(item.project_id) {
        return;
    }
    let project = WorkItem::project(
        item.project_id,
        item.language,
        InvocationReasons::semantic_changed(),
    )
    .with_low_priority(item.is_low_priority)
    .with_filter(item.filter.clone());
    cx.enqueue_project(project);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalyzerCapabilities, AnalyzerMetadata, AnalyzerSet, IncrementalAnalyzer};
    use crate::config::CoordinatorConfig;
    use crate::context::CoordinatorServices;
    use async_trait::async_trait;
    use crawler_workspace::{Language, Project, Workspace, WorkspaceKind};
    use tokio::sync::Notify;

    const DOC: DocumentId = DocumentId::from_raw(1);
    const CORE: ProjectId = ProjectId::from_raw(1);

    /// Syntax pass that never finishes on its own
    #[derive(Default)]
    struct Stalls {
        started: Notify,
    }

    #[async_trait]
    impl IncrementalAnalyzer for Stalls {
        fn capabilities(&self) -> AnalyzerCapabilities {
            AnalyzerCapabilities {
                syntax: true,
                ..AnalyzerCapabilities::none()
            }
        }

        async fn analyze_syntax(&self, _cx: &AnalysisContext<'_>, _document: &Document) -> AnalysisResult {
            self.started.notify_one();
            std::future::pending().await
        }
    }

    fn context() -> (SharedContext, Arc<Stalls>) {
        let workspace = Arc::new(Workspace::new(WorkspaceKind::Host));
        workspace
            .add_project(
                Project::new(CORE, "core", Language::Rust)
                    .with_document(Document::new(DOC, CORE, "src/lib.rs", "pub fn a() {}\n")),
            )
            .unwrap();
        let analyzer = Arc::new(Stalls::default());
        let mut set = AnalyzerSet::new();
        set.push(
            AnalyzerMetadata::new("stalls"),
            analyzer.clone() as Arc<dyn IncrementalAnalyzer>,
        );
        let cx = SharedContext::new(
            CoordinatorConfig::for_tests(),
            workspace,
            set,
            CoordinatorServices::default(),
        );
        (cx, analyzer)
    }

    /// Run one normal-tier item and call `cancel` once its syntax pass started
    async fn execute_then(
        cx: SharedContext,
        analyzer: &Stalls,
        cancel: impl FnOnce(&SharedContext),
    ) -> Arc<SharedContext> {
        let cx = Arc::new(cx);
        let queue = cx.queue(Tier::Normal);
        queue.add_or_replace(WorkItem::document(
            DOC,
            CORE,
            Language::Rust,
            InvocationReasons::syntax_and_semantic(),
        ));
        let (item, lease) = queue.try_take(WorkItemKey::Document(DOC)).unwrap();
        let solution = cx.workspace.current_solution();

        tokio::join!(execute(&cx, Tier::Normal, solution, item, lease), async {
            analyzer.started.notified().await;
            cancel(&cx);
        });
        cx
    }

    #[tokio::test]
    async fn cancelled_item_is_requeued_for_retry() {
        let (cx, analyzer) = context();
        let cx = execute_then(cx, &analyzer, |cx| cx.queue(Tier::Normal).cancel_running()).await;

        let queue = cx.queue(Tier::Normal);
        assert_eq!(queue.with_pending(WorkItemKey::Document(DOC), |item| item.retry), Some(true));
        assert_eq!(queue.load().executing, 0);
    }

    #[tokio::test]
    async fn shutdown_drops_the_running_item() {
        let (cx, analyzer) = context();
        let cx = execute_then(cx, &analyzer, |cx| cx.shutdown.cancel()).await;

        let queue = cx.queue(Tier::Normal);
        assert_eq!(queue.with_pending(WorkItemKey::Document(DOC), |item| item.retry), None);
        assert!(queue.is_empty());
    }
}
