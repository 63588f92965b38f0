use crate::error::{Result, WorkspaceError};
use crate::events::{OptionChange, WorkspaceChange, WorkspaceChangeKind, WorkspaceEvent};
use crate::ids::{DocumentId, ProjectId};
use crate::solution::{Document, DocumentKind, Project, Solution};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Kind of corpus instance; analyzer providers declare which kinds they serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceKind {
    Host,
    Preview,
    MiscellaneousFiles,
}

#[derive(Debug, Default)]
struct DocumentTracking {
    open: BTreeSet<DocumentId>,
    active: Option<DocumentId>,
}

/// Owner of the current solution snapshot.
///
/// Every mutation swaps the snapshot and publishes the matching
/// [`WorkspaceEvent`] while the write lock is held, so subscribers observe
/// changes in snapshot order.
pub struct Workspace {
    kind: WorkspaceKind,
    solution: RwLock<Arc<Solution>>,
    events: broadcast::Sender<WorkspaceEvent>,
    tracking: Mutex<DocumentTracking>,
    tracks_active_document: bool,
    published: AtomicU64,
}

impl Workspace {
    pub fn new(kind: WorkspaceKind) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            kind,
            solution: RwLock::new(Arc::new(Solution::new())),
            events,
            tracking: Mutex::new(DocumentTracking::default()),
            tracks_active_document: true,
            published: AtomicU64::new(0),
        }
    }

    /// Hosts without an active-editor concept disable the active-file tier
    #[must_use]
    pub fn with_active_document_tracking(mut self, enabled: bool) -> Self {
        self.tracks_active_document = enabled;
        self
    }

    pub fn kind(&self) -> WorkspaceKind {
        self.kind
    }

    pub fn tracks_active_document(&self) -> bool {
        self.tracks_active_document
    }

    pub fn current_solution(&self) -> Arc<Solution> {
        self.solution
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.events.subscribe()
    }

    /// Number of events published so far; subscribers compare it with what
    /// they have consumed to tell whether they caught up
    pub fn published_events(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    pub fn add_solution(&self, solution: Solution) -> Arc<Solution> {
        self.replace_solution(WorkspaceChangeKind::SolutionAdded, solution)
    }

    pub fn set_solution(&self, solution: Solution) -> Arc<Solution> {
        self.replace_solution(WorkspaceChangeKind::SolutionChanged, solution)
    }

    pub fn reload_solution(&self, solution: Solution) -> Arc<Solution> {
        self.replace_solution(WorkspaceChangeKind::SolutionReloaded, solution)
    }

    pub fn clear_solution(&self) -> Arc<Solution> {
        self.replace_solution(WorkspaceChangeKind::SolutionCleared, Solution::new())
    }

    pub fn remove_solution(&self) -> Arc<Solution> {
        self.replace_solution(WorkspaceChangeKind::SolutionRemoved, Solution::new())
    }

    pub fn add_project(&self, project: Project) -> Result<Arc<Solution>> {
        let id = project.id();
        self.apply(WorkspaceChangeKind::ProjectAdded, Some(id), None, |s| {
            s.with_project(project)
        })
    }

    /// Replace a project's configuration and documents
    pub fn update_project(&self, project: Project) -> Result<Arc<Solution>> {
        let id = project.id();
        if !self.current_solution().contains_project(id) {
            return Err(WorkspaceError::ProjectNotFound(id));
        }
        self.apply(WorkspaceChangeKind::ProjectChanged, Some(id), None, |s| {
            s.with_project(project)
        })
    }

    pub fn reload_project(&self, project: Project) -> Result<Arc<Solution>> {
        let id = project.id();
        self.apply(WorkspaceChangeKind::ProjectReloaded, Some(id), None, |s| {
            s.with_project(project)
        })
    }

    pub fn remove_project(&self, id: ProjectId) -> Result<Arc<Solution>> {
        self.apply(WorkspaceChangeKind::ProjectRemoved, Some(id), None, |s| {
            s.without_project(id)
        })
    }

    pub fn add_document(&self, document: Document) -> Result<Arc<Solution>> {
        let kind = match document.kind() {
            DocumentKind::Source => WorkspaceChangeKind::DocumentAdded,
            DocumentKind::Additional => WorkspaceChangeKind::AdditionalDocumentAdded,
            DocumentKind::AnalyzerConfig => WorkspaceChangeKind::AnalyzerConfigDocumentAdded,
        };
        let (project, id) = (document.project_id(), document.id());
        self.apply(kind, Some(project), Some(id), |s| s.with_document(document))
    }

    pub fn remove_document(&self, id: DocumentId) -> Result<Arc<Solution>> {
        let (kind, project) = self.document_change(id, |kind| match kind {
            DocumentKind::Source => WorkspaceChangeKind::DocumentRemoved,
            DocumentKind::Additional => WorkspaceChangeKind::AdditionalDocumentRemoved,
            DocumentKind::AnalyzerConfig => WorkspaceChangeKind::AnalyzerConfigDocumentRemoved,
        })?;
        {
            let mut tracking = self.lock_tracking();
            tracking.open.remove(&id);
            if tracking.active == Some(id) {
                tracking.active = None;
            }
        }
        self.apply(kind, Some(project), Some(id), |s| s.without_document(id))
    }

    pub fn change_document_text(
        &self,
        id: DocumentId,
        text: impl Into<Arc<str>>,
    ) -> Result<Arc<Solution>> {
        let (kind, project) = self.document_change(id, |kind| match kind {
            DocumentKind::Source => WorkspaceChangeKind::DocumentChanged,
            DocumentKind::Additional => WorkspaceChangeKind::AdditionalDocumentChanged,
            DocumentKind::AnalyzerConfig => WorkspaceChangeKind::AnalyzerConfigDocumentChanged,
        })?;
        let text = text.into();
        self.apply(kind, Some(project), Some(id), |s| {
            s.with_document_text(id, text)
        })
    }

    pub fn reload_document(
        &self,
        id: DocumentId,
        text: impl Into<Arc<str>>,
    ) -> Result<Arc<Solution>> {
        let (kind, project) = self.document_change(id, |kind| match kind {
            DocumentKind::Source => WorkspaceChangeKind::DocumentReloaded,
            DocumentKind::Additional => WorkspaceChangeKind::AdditionalDocumentReloaded,
            DocumentKind::AnalyzerConfig => WorkspaceChangeKind::AnalyzerConfigDocumentReloaded,
        })?;
        let text = text.into();
        self.apply(kind, Some(project), Some(id), |s| {
            s.with_document_text(id, text)
        })
    }

    /// Returns `false` when the document was already open
    pub fn open_document(&self, id: DocumentId) -> Result<bool> {
        if !self.current_solution().contains_document(id) {
            return Err(WorkspaceError::DocumentNotFound(id));
        }
        let newly_opened = self.lock_tracking().open.insert(id);
        if newly_opened {
            self.publish(WorkspaceEvent::DocumentOpened(id));
        }
        Ok(newly_opened)
    }

    pub fn close_document(&self, id: DocumentId) -> bool {
        let closed = {
            let mut tracking = self.lock_tracking();
            let closed = tracking.open.remove(&id);
            if closed && tracking.active == Some(id) {
                tracking.active = None;
            }
            closed
        };
        if closed {
            self.publish(WorkspaceEvent::DocumentClosed(id));
        }
        closed
    }

    pub fn set_active_document(&self, id: Option<DocumentId>) {
        if !self.tracks_active_document {
            return;
        }
        let changed = {
            let mut tracking = self.lock_tracking();
            let changed = tracking.active != id;
            tracking.active = id;
            changed
        };
        if changed {
            self.publish(WorkspaceEvent::ActiveDocumentChanged(id));
        }
    }

    pub fn notify_buffer_changed(&self) {
        self.publish(WorkspaceEvent::BufferChanged);
    }

    pub fn notify_option_changed(&self, option: OptionChange) {
        self.publish(WorkspaceEvent::OptionChanged(option));
    }

    pub fn is_open(&self, id: DocumentId) -> bool {
        self.lock_tracking().open.contains(&id)
    }

    pub fn open_documents(&self) -> Vec<DocumentId> {
        self.lock_tracking().open.iter().copied().collect()
    }

    pub fn active_document(&self) -> Option<DocumentId> {
        self.lock_tracking().active
    }

    fn publish(&self, event: WorkspaceEvent) {
        self.published.fetch_add(1, Ordering::AcqRel);
        let _ = self.events.send(event);
    }

    fn replace_solution(&self, kind: WorkspaceChangeKind, solution: Solution) -> Arc<Solution> {
        let mut guard = self.solution.write().unwrap_or_else(PoisonError::into_inner);
        let old_solution = guard.clone();
        let new_solution = Arc::new(solution);
        *guard = new_solution.clone();
        if matches!(
            kind,
            WorkspaceChangeKind::SolutionCleared | WorkspaceChangeKind::SolutionRemoved
        ) {
            *self.lock_tracking() = DocumentTracking::default();
        }
        self.publish(WorkspaceEvent::Changed(WorkspaceChange {
            kind,
            old_solution,
            new_solution: new_solution.clone(),
            project_id: None,
            document_id: None,
        }));
        new_solution
    }

    fn apply(
        &self,
        kind: WorkspaceChangeKind,
        project_id: Option<ProjectId>,
        document_id: Option<DocumentId>,
        update: impl FnOnce(&Solution) -> Result<Solution>,
    ) -> Result<Arc<Solution>> {
        let mut guard = self.solution.write().unwrap_or_else(PoisonError::into_inner);
        let old_solution = guard.clone();
        let new_solution = Arc::new(update(&old_solution)?);
        *guard = new_solution.clone();
        log::debug!(
            "workspace change {kind:?} (solution v{} -> v{})",
            old_solution.version(),
            new_solution.version()
        );
        self.publish(WorkspaceEvent::Changed(WorkspaceChange {
            kind,
            old_solution,
            new_solution: new_solution.clone(),
            project_id,
            document_id,
        }));
        Ok(new_solution)
    }

    fn document_change(
        &self,
        id: DocumentId,
        kind_for: impl FnOnce(DocumentKind) -> WorkspaceChangeKind,
    ) -> Result<(WorkspaceChangeKind, ProjectId)> {
        let solution = self.current_solution();
        let document = solution
            .document(id)
            .ok_or(WorkspaceError::DocumentNotFound(id))?;
        Ok((kind_for(document.kind()), document.project_id()))
    }

    fn lock_tracking(&self) -> std::sync::MutexGuard<'_, DocumentTracking> {
        self.tracking.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Language;

    fn workspace_with_doc() -> (Workspace, DocumentId) {
        let workspace = Workspace::new(WorkspaceKind::Host);
        let p = ProjectId::from_raw(1);
        let d = DocumentId::from_raw(1);
        workspace
            .add_project(Project::new(p, "core", Language::Rust))
            .unwrap();
        workspace
            .add_document(Document::new(d, p, "src/lib.rs", "fn a() {}"))
            .unwrap();
        (workspace, d)
    }

    #[test]
    fn text_change_publishes_before_and_after_snapshots() {
        let (workspace, d) = workspace_with_doc();
        let mut events = workspace.subscribe();
        workspace.change_document_text(d, "fn b() {}").unwrap();

        let Ok(WorkspaceEvent::Changed(change)) = events.try_recv() else {
            panic!("expected a change event");
        };
        assert_eq!(change.kind, WorkspaceChangeKind::DocumentChanged);
        assert_eq!(change.document_id, Some(d));
        assert_eq!(change.old_solution.document(d).unwrap().text(), "fn a() {}");
        assert_eq!(change.new_solution.document(d).unwrap().text(), "fn b() {}");
    }

    #[test]
    fn open_close_and_active_tracking() {
        let (workspace, d) = workspace_with_doc();
        let mut events = workspace.subscribe();

        assert!(workspace.open_document(d).unwrap());
        assert!(!workspace.open_document(d).unwrap());
        workspace.set_active_document(Some(d));
        assert_eq!(workspace.active_document(), Some(d));
        assert!(workspace.close_document(d));
        assert_eq!(workspace.active_document(), None);

        assert!(matches!(events.try_recv(), Ok(WorkspaceEvent::DocumentOpened(id)) if id == d));
        assert!(matches!(
            events.try_recv(),
            Ok(WorkspaceEvent::ActiveDocumentChanged(Some(id))) if id == d
        ));
        assert!(matches!(events.try_recv(), Ok(WorkspaceEvent::DocumentClosed(id)) if id == d));
    }

    #[test]
    fn active_tracking_can_be_disabled() {
        let workspace = Workspace::new(WorkspaceKind::Host).with_active_document_tracking(false);
        workspace.set_active_document(Some(DocumentId::from_raw(3)));
        assert_eq!(workspace.active_document(), None);
    }

    #[test]
    fn failed_update_leaves_snapshot_untouched() {
        let (workspace, _) = workspace_with_doc();
        let before = workspace.current_solution().version();
        let err = workspace.change_document_text(DocumentId::from_raw(99), "x");
        assert!(err.is_err());
        assert_eq!(workspace.current_solution().version(), before);
    }
}
