use crate::ids::{DocumentId, ProjectId};
use crate::language::Language;
use crate::solution::Solution;
use std::sync::Arc;

/// Kind of corpus mutation reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkspaceChangeKind {
    SolutionAdded,
    SolutionChanged,
    SolutionReloaded,
    SolutionRemoved,
    SolutionCleared,
    ProjectAdded,
    ProjectChanged,
    ProjectReloaded,
    ProjectRemoved,
    DocumentAdded,
    DocumentChanged,
    DocumentReloaded,
    DocumentRemoved,
    AdditionalDocumentAdded,
    AdditionalDocumentChanged,
    AdditionalDocumentReloaded,
    AdditionalDocumentRemoved,
    AnalyzerConfigDocumentAdded,
    AnalyzerConfigDocumentChanged,
    AnalyzerConfigDocumentReloaded,
    AnalyzerConfigDocumentRemoved,
}

impl WorkspaceChangeKind {
    pub fn is_additional_document(self) -> bool {
        matches!(
            self,
            Self::AdditionalDocumentAdded
                | Self::AdditionalDocumentChanged
                | Self::AdditionalDocumentReloaded
                | Self::AdditionalDocumentRemoved
        )
    }

    pub fn is_analyzer_config_document(self) -> bool {
        matches!(
            self,
            Self::AnalyzerConfigDocumentAdded
                | Self::AnalyzerConfigDocumentChanged
                | Self::AnalyzerConfigDocumentReloaded
                | Self::AnalyzerConfigDocumentRemoved
        )
    }
}

/// Before/after snapshot pair for one corpus mutation
#[derive(Debug, Clone)]
pub struct WorkspaceChange {
    pub kind: WorkspaceChangeKind,
    pub old_solution: Arc<Solution>,
    pub new_solution: Arc<Solution>,
    pub project_id: Option<ProjectId>,
    pub document_id: Option<DocumentId>,
}

/// An option flip the analyzers may want to react to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionChange {
    pub name: String,
    pub language: Option<Language>,
}

impl OptionChange {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: None,
        }
    }

    #[must_use]
    pub fn for_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }
}

/// Notification published by a [`crate::Workspace`]
#[derive(Debug, Clone)]
pub enum WorkspaceEvent {
    Changed(WorkspaceChange),
    DocumentOpened(DocumentId),
    DocumentClosed(DocumentId),
    ActiveDocumentChanged(Option<DocumentId>),
    /// A buffer the coordinator does not analyze changed (typing elsewhere)
    BufferChanged,
    OptionChanged(OptionChange),
}
