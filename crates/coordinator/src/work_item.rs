use crate::analyzer::AnalyzerId;
use crate::queue::QueueEntry;
use crate::tracker::CompletionToken;
use crawler_syntax::MemberPath;
use crawler_workspace::{DocumentId, Language, ProjectId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// What a work item is about: one document or one project, never both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemKey {
    Document(DocumentId),
    Project(ProjectId),
}

impl fmt::Display for WorkItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItemKey::Document(id) => id.fmt(f),
            WorkItemKey::Project(id) => id.fmt(f),
        }
    }
}

/// Why reanalysis was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationReason {
    DocumentAdded,
    DocumentRemoved,
    DocumentOpened,
    DocumentClosed,
    /// Document content replaced wholesale; analyzers drop cached state
    DocumentReset,
    SyntaxChanged,
    SemanticChanged,
    /// Only the body of the tracked member changed
    MemberBodyChanged,
    ProjectAdded,
    ProjectRemoved,
    ProjectConfigurationChanged,
    AdditionalDocumentChanged,
    AnalyzerConfigChanged,
    SolutionRemoved,
    Reanalyze,
}

/// Set of [`InvocationReason`]s; merging is set union
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct InvocationReasons(BTreeSet<InvocationReason>);

impl InvocationReasons {
    pub fn new(reasons: impl IntoIterator<Item = InvocationReason>) -> Self {
        Self(reasons.into_iter().collect())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn document_added() -> Self {
        use InvocationReason::*;
        Self::new([DocumentAdded, SyntaxChanged, SemanticChanged])
    }

    pub fn document_removed() -> Self {
        Self::new([InvocationReason::DocumentRemoved])
    }

    pub fn document_opened() -> Self {
        Self::new([InvocationReason::DocumentOpened])
    }

    pub fn document_closed() -> Self {
        Self::new([InvocationReason::DocumentClosed])
    }

    pub fn document_reset() -> Self {
        use InvocationReason::*;
        Self::new([DocumentReset, SyntaxChanged, SemanticChanged])
    }

    /// Whole-file edit
    pub fn syntax_and_semantic() -> Self {
        use InvocationReason::*;
        Self::new([SyntaxChanged, SemanticChanged])
    }

    /// Edit confined to one member body
    pub fn member_body_changed() -> Self {
        use InvocationReason::*;
        Self::new([SyntaxChanged, MemberBodyChanged])
    }

    pub fn semantic_changed() -> Self {
        Self::new([InvocationReason::SemanticChanged])
    }

    pub fn project_added() -> Self {
        use InvocationReason::*;
        Self::new([ProjectAdded, SyntaxChanged, SemanticChanged])
    }

    pub fn project_removed() -> Self {
        Self::new([InvocationReason::ProjectRemoved])
    }

    pub fn project_configuration_changed() -> Self {
        use InvocationReason::*;
        Self::new([ProjectConfigurationChanged, SyntaxChanged, SemanticChanged])
    }

    pub fn additional_document_changed() -> Self {
        use InvocationReason::*;
        Self::new([AdditionalDocumentChanged, SemanticChanged])
    }

    pub fn analyzer_config_changed() -> Self {
        use InvocationReason::*;
        Self::new([AnalyzerConfigChanged, SemanticChanged])
    }

    pub fn solution_removed() -> Self {
        Self::new([InvocationReason::SolutionRemoved])
    }

    pub fn reanalyze() -> Self {
        use InvocationReason::*;
        Self::new([Reanalyze, SyntaxChanged, SemanticChanged])
    }

    pub fn contains(&self, reason: InvocationReason) -> bool {
        self.0.contains(&reason)
    }

    pub fn insert(&mut self, reason: InvocationReason) {
        self.0.insert(reason);
    }

    pub fn union_with(&mut self, other: &InvocationReasons) {
        self.0.extend(other.0.iter().copied());
    }

    #[must_use]
    pub fn union(mut self, other: &InvocationReasons) -> Self {
        self.union_with(other);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = InvocationReason> + '_ {
        self.0.iter().copied()
    }

    /// Open/close: lifecycle hooks plus a full syntax and document refresh
    pub fn must_refresh(&self) -> bool {
        self.contains(InvocationReason::DocumentOpened)
            || self.contains(InvocationReason::DocumentClosed)
    }

    /// Only removal notifications, no passes
    pub fn is_removal_only(&self) -> bool {
        !self.is_empty()
            && self.0.iter().all(|r| {
                matches!(
                    r,
                    InvocationReason::DocumentRemoved
                        | InvocationReason::ProjectRemoved
                        | InvocationReason::SolutionRemoved
                )
            })
    }

    /// Item must reach the queue even when the analysis scope excludes it
    pub fn bypasses_scope(&self) -> bool {
        self.is_removal_only()
            || self.must_refresh()
            || self.contains(InvocationReason::DocumentReset)
    }
}

impl FromIterator<InvocationReason> for InvocationReasons {
    fn from_iter<I: IntoIterator<Item = InvocationReason>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// What a forced reanalysis covers; expanded against the solution current
/// when the request is consumed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReanalyzeScope {
    Solution,
    Projects(BTreeSet<ProjectId>),
    Documents(BTreeSet<DocumentId>),
}

impl ReanalyzeScope {
    pub fn projects(ids: impl IntoIterator<Item = ProjectId>) -> Self {
        Self::Projects(ids.into_iter().collect())
    }

    pub fn documents(ids: impl IntoIterator<Item = DocumentId>) -> Self {
        Self::Documents(ids.into_iter().collect())
    }
}

/// Member whose body changed, with the document versions around the edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveMember {
    pub path: MemberPath,
    pub old_version: u64,
    pub new_version: u64,
}

/// Restriction of a work item to a subset of analyzers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum AnalyzerFilter {
    #[default]
    All,
    Only(BTreeSet<AnalyzerId>),
}

impl AnalyzerFilter {
    pub fn only(id: AnalyzerId) -> Self {
        Self::Only(BTreeSet::from([id]))
    }

    pub fn allows(&self, id: AnalyzerId) -> bool {
        match self {
            AnalyzerFilter::All => true,
            AnalyzerFilter::Only(ids) => ids.contains(&id),
        }
    }

    /// Union; an unrestricted side wins
    #[must_use]
    pub fn union(self, other: AnalyzerFilter) -> Self {
        match (self, other) {
            (AnalyzerFilter::Only(mut a), AnalyzerFilter::Only(b)) => {
                a.extend(b);
                AnalyzerFilter::Only(a)
            }
            _ => AnalyzerFilter::All,
        }
    }
}

/// Pending analysis for one key
#[derive(Debug)]
pub struct WorkItem {
    pub key: WorkItemKey,
    pub project_id: ProjectId,
    pub language: Language,
    pub reasons: InvocationReasons,
    pub is_low_priority: bool,
    pub active_member: Option<ActiveMember>,
    pub filter: AnalyzerFilter,
    /// Set when the item is requeued after a non-shutdown cancellation
    pub retry: bool,
    pub(crate) completion: Option<CompletionToken>,
}

impl WorkItem {
    pub fn document(
        document: DocumentId,
        project: ProjectId,
        language: Language,
        reasons: InvocationReasons,
    ) -> Self {
        Self::new(WorkItemKey::Document(document), project, language, reasons)
    }

    pub fn project(project: ProjectId, language: Language, reasons: InvocationReasons) -> Self {
        Self::new(WorkItemKey::Project(project), project, language, reasons)
    }

    fn new(
        key: WorkItemKey,
        project_id: ProjectId,
        language: Language,
        reasons: InvocationReasons,
    ) -> Self {
        Self {
            key,
            project_id,
            language,
            reasons,
            is_low_priority: false,
            active_member: None,
            filter: AnalyzerFilter::All,
            retry: false,
            completion: None,
        }
    }

    #[must_use]
    pub fn with_low_priority(mut self, low: bool) -> Self {
        self.is_low_priority = low;
        self
    }

    #[must_use]
    pub fn with_active_member(mut self, member: Option<ActiveMember>) -> Self {
        self.active_member = member;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: AnalyzerFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_completion(mut self, token: CompletionToken) -> Self {
        self.completion = Some(token);
        self
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        match self.key {
            WorkItemKey::Document(id) => Some(id),
            WorkItemKey::Project(_) => None,
        }
    }

    /// Copy for another tier queue; the copy carries its own completion token
    pub(crate) fn duplicate(&self, token: CompletionToken) -> Self {
        Self {
            key: self.key,
            project_id: self.project_id,
            language: self.language,
            reasons: self.reasons.clone(),
            is_low_priority: self.is_low_priority,
            active_member: self.active_member.clone(),
            filter: self.filter.clone(),
            retry: self.retry,
            completion: Some(token),
        }
    }
}

/// `newer` contributes its edit-tracking; `older` only contributes a member
/// handle when `newer` is not an edit itself.
fn merge_active_member(older: &WorkItem, newer: &WorkItem) -> Option<ActiveMember> {
    let newer_edits = newer.reasons.contains(InvocationReason::SyntaxChanged);
    let older_edits = older.reasons.contains(InvocationReason::SyntaxChanged);
    match (&older.active_member, &newer.active_member) {
        (Some(old), Some(new)) if old.path == new.path => Some(ActiveMember {
            path: new.path.clone(),
            old_version: old.old_version.min(new.old_version),
            new_version: old.new_version.max(new.new_version),
        }),
        (Some(_), Some(_)) => None,
        (Some(old), None) if !newer_edits => Some(old.clone()),
        (None, Some(new)) if !older_edits => Some(new.clone()),
        _ => None,
    }
}

impl QueueEntry for WorkItem {
    type Key = WorkItemKey;

    fn key(&self) -> WorkItemKey {
        self.key
    }

    fn project_id(&self) -> ProjectId {
        self.project_id
    }

    fn is_low_priority(&self) -> bool {
        self.is_low_priority
    }

    fn merge(self, newer: WorkItem) -> WorkItem {
        let active_member = merge_active_member(&self, &newer);
        let reasons = self.reasons.union(&newer.reasons);
        let filter = self.filter.union(newer.filter);
        // `self.completion` drops here: the superseded token is disposed
        WorkItem {
            key: newer.key,
            project_id: newer.project_id,
            language: newer.language,
            reasons,
            is_low_priority: self.is_low_priority && newer.is_low_priority,
            active_member,
            filter,
            retry: self.retry || newer.retry,
            completion: newer.completion,
        }
    }
}
