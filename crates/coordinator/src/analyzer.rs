use crate::error::AnalysisError;
use crate::tier::Tier;
use crate::work_item::{AnalyzerFilter, InvocationReasons};
use async_trait::async_trait;
use crawler_syntax::MemberPath;
use crawler_workspace::{
    Document, DocumentId, OptionChange, Project, ProjectId, Solution, Workspace, WorkspaceKind,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub type AnalysisResult = std::result::Result<(), AnalysisError>;

/// Slot index of an analyzer inside one coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AnalyzerId(usize);

impl AnalyzerId {
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AnalyzerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "analyzer#{}", self.0)
    }
}

/// Which hooks an analyzer actually implements. The dispatcher only calls
/// what is declared here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AnalyzerCapabilities {
    pub syntax: bool,
    pub document: bool,
    pub project: bool,
    /// open / close / reset hooks
    pub lifecycle: bool,
}

impl AnalyzerCapabilities {
    pub const fn none() -> Self {
        Self {
            syntax: false,
            document: false,
            project: false,
            lifecycle: false,
        }
    }

    pub const fn all() -> Self {
        Self {
            syntax: true,
            document: true,
            project: true,
            lifecycle: true,
        }
    }

    #[must_use]
    pub const fn with_syntax(mut self) -> Self {
        self.syntax = true;
        self
    }

    #[must_use]
    pub const fn with_document(mut self) -> Self {
        self.document = true;
        self
    }

    #[must_use]
    pub const fn with_project(mut self) -> Self {
        self.project = true;
        self
    }

    #[must_use]
    pub const fn with_lifecycle(mut self) -> Self {
        self.lifecycle = true;
        self
    }
}

/// Extent of a document pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentScope {
    Whole,
    /// Only the body of this member changed
    Member(MemberPath),
}

/// Everything one pass may look at. The solution is the snapshot sampled
/// when the work item was dequeued.
pub struct AnalysisContext<'a> {
    pub solution: &'a Arc<Solution>,
    pub reasons: &'a InvocationReasons,
    pub cancel: &'a CancellationToken,
}

impl AnalysisContext<'_> {
    /// `Err(Cancelled)` once the pass should stop
    pub fn check_cancelled(&self) -> AnalysisResult {
        if self.cancel.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A pluggable unit implementing one or more analysis passes.
///
/// Every hook has a no-op default; [`IncrementalAnalyzer::capabilities`]
/// tells the dispatcher which ones are worth calling.
#[async_trait]
pub trait IncrementalAnalyzer: Send + Sync {
    fn capabilities(&self) -> AnalyzerCapabilities;

    async fn analyze_syntax(&self, _cx: &AnalysisContext<'_>, _document: &Document) -> AnalysisResult {
        Ok(())
    }

    async fn analyze_document(
        &self,
        _cx: &AnalysisContext<'_>,
        _document: &Document,
        _scope: &DocumentScope,
    ) -> AnalysisResult {
        Ok(())
    }

    async fn analyze_project(
        &self,
        _cx: &AnalysisContext<'_>,
        _project: &Project,
        _semantics_changed: bool,
    ) -> AnalysisResult {
        Ok(())
    }

    async fn document_open(&self, _cx: &AnalysisContext<'_>, _document: &Document) -> AnalysisResult {
        Ok(())
    }

    async fn document_close(&self, _cx: &AnalysisContext<'_>, _document: &Document) -> AnalysisResult {
        Ok(())
    }

    /// Cached state for the document must be thrown away (reload)
    async fn document_reset(&self, _cx: &AnalysisContext<'_>, _document: &Document) -> AnalysisResult {
        Ok(())
    }

    /// The document no longer exists in the solution
    async fn remove_document(&self, _document: DocumentId) -> AnalysisResult {
        Ok(())
    }

    /// The project no longer exists in the solution
    async fn remove_project(&self, _project: ProjectId) -> AnalysisResult {
        Ok(())
    }

    /// Whether flipping `option` invalidates this analyzer's results
    fn needs_reanalysis_on_option_changed(&self, _option: &OptionChange) -> bool {
        false
    }
}

/// Static description of an analyzer provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzerMetadata {
    pub name: String,
    /// Empty means every workspace kind
    pub workspace_kinds: Vec<WorkspaceKind>,
    /// Also runs in the active-file tier for the active document
    pub high_priority_for_active_file: bool,
}

impl AnalyzerMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workspace_kinds: Vec::new(),
            high_priority_for_active_file: false,
        }
    }

    #[must_use]
    pub fn high_priority(mut self) -> Self {
        self.high_priority_for_active_file = true;
        self
    }

    #[must_use]
    pub fn for_kinds(mut self, kinds: impl IntoIterator<Item = WorkspaceKind>) -> Self {
        self.workspace_kinds = kinds.into_iter().collect();
        self
    }

    pub fn applies_to(&self, kind: WorkspaceKind) -> bool {
        self.workspace_kinds.is_empty() || self.workspace_kinds.contains(&kind)
    }
}

/// Factory registered once per process; creates one analyzer per workspace
pub trait AnalyzerProvider: Send + Sync {
    fn metadata(&self) -> AnalyzerMetadata;

    fn create(&self, workspace: &Arc<Workspace>) -> Arc<dyn IncrementalAnalyzer>;
}

#[derive(Clone)]
pub struct AnalyzerEntry {
    pub id: AnalyzerId,
    pub metadata: AnalyzerMetadata,
    pub capabilities: AnalyzerCapabilities,
    pub analyzer: Arc<dyn IncrementalAnalyzer>,
}

impl fmt::Debug for AnalyzerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerEntry")
            .field("id", &self.id)
            .field("name", &self.metadata.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Ordered analyzers of one coordinator; ids are slot indices
#[derive(Debug, Clone, Default)]
pub struct AnalyzerSet {
    entries: Vec<AnalyzerEntry>,
}

impl AnalyzerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an analyzer, returning its slot id
    pub fn push(
        &mut self,
        metadata: AnalyzerMetadata,
        analyzer: Arc<dyn IncrementalAnalyzer>,
    ) -> AnalyzerId {
        let id = AnalyzerId(self.entries.len());
        let capabilities = analyzer.capabilities();
        self.entries.push(AnalyzerEntry {
            id,
            metadata,
            capabilities,
            analyzer,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: AnalyzerId) -> Option<&AnalyzerEntry> {
        self.entries.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnalyzerEntry> {
        self.entries.iter()
    }

    pub fn find(&self, name: &str) -> Option<AnalyzerId> {
        self.entries
            .iter()
            .find(|e| e.metadata.name == name)
            .map(|e| e.id)
    }

    pub fn has_high_priority(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.metadata.high_priority_for_active_file)
    }

    /// Tier set intersected with the item's restriction
    pub fn applicable(&self, tier: Tier, filter: &AnalyzerFilter) -> Vec<AnalyzerEntry> {
        self.entries
            .iter()
            .filter(|e| tier != Tier::ActiveFile || e.metadata.high_priority_for_active_file)
            .filter(|e| filter.allows(e.id))
            .cloned()
            .collect()
    }
}
