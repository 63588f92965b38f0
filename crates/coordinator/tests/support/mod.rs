#![allow(dead_code)]

use async_trait::async_trait;
use crawler_coordinator::{
    AnalysisContext, AnalysisResult, AnalyzerCapabilities, AnalyzerMetadata, AnalyzerSet,
    CoordinatorConfig, CoordinatorServices, DocumentScope, IncrementalAnalyzer, InvocationReasons,
    WorkCoordinator,
};
use crawler_workspace::{
    Document, DocumentId, Language, OptionChange, Project, ProjectId, Workspace, WorkspaceKind,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Syntax(DocumentId),
    Document(DocumentId, DocumentScope),
    Project(ProjectId, bool),
    Open(DocumentId),
    Close(DocumentId),
    Reset(DocumentId),
    RemoveDocument(DocumentId),
    RemoveProject(ProjectId),
}

#[derive(Debug, Clone)]
pub struct Record {
    pub at: Instant,
    pub call: Call,
    pub reasons: InvocationReasons,
}

/// Analyzer that records every hook it receives
#[derive(Default)]
pub struct Recorder {
    records: Mutex<Vec<Record>>,
    syntax_delay: Option<Duration>,
    option: Option<String>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Syntax passes take `delay` of (virtual) time
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            syntax_delay: Some(delay),
            ..Self::default()
        })
    }

    /// Asks for reanalysis when the option named `name` flips
    pub fn watching_option(name: &str) -> Arc<Self> {
        Arc::new(Self {
            option: Some(name.to_string()),
            ..Self::default()
        })
    }

    fn push(&self, call: Call, reasons: &InvocationReasons) {
        self.records.lock().unwrap().push(Record {
            at: Instant::now(),
            call,
            reasons: reasons.clone(),
        });
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.records().into_iter().map(|r| r.call).collect()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }

    /// Documents that received a document pass
    pub fn analyzed_documents(&self) -> BTreeSet<DocumentId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Document(id, _) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Projects that received a project pass
    pub fn analyzed_projects(&self) -> BTreeSet<ProjectId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Project(id, _) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }
}

#[async_trait]
impl IncrementalAnalyzer for Recorder {
    fn capabilities(&self) -> AnalyzerCapabilities {
        AnalyzerCapabilities::all()
    }

    async fn analyze_syntax(&self, cx: &AnalysisContext<'_>, document: &Document) -> AnalysisResult {
        self.push(Call::Syntax(document.id()), cx.reasons);
        if let Some(delay) = self.syntax_delay {
            tokio::time::sleep(delay).await;
            cx.check_cancelled()?;
        }
        Ok(())
    }

    async fn analyze_document(
        &self,
        cx: &AnalysisContext<'_>,
        document: &Document,
        scope: &DocumentScope,
    ) -> AnalysisResult {
        self.push(Call::Document(document.id(), scope.clone()), cx.reasons);
        Ok(())
    }

    async fn analyze_project(
        &self,
        cx: &AnalysisContext<'_>,
        project: &Project,
        semantics_changed: bool,
    ) -> AnalysisResult {
        self.push(Call::Project(project.id(), semantics_changed), cx.reasons);
        Ok(())
    }

    async fn document_open(&self, cx: &AnalysisContext<'_>, document: &Document) -> AnalysisResult {
        self.push(Call::Open(document.id()), cx.reasons);
        Ok(())
    }

    async fn document_close(&self, cx: &AnalysisContext<'_>, document: &Document) -> AnalysisResult {
        self.push(Call::Close(document.id()), cx.reasons);
        Ok(())
    }

    async fn document_reset(&self, cx: &AnalysisContext<'_>, document: &Document) -> AnalysisResult {
        self.push(Call::Reset(document.id()), cx.reasons);
        Ok(())
    }

    async fn remove_document(&self, document: DocumentId) -> AnalysisResult {
        self.push(Call::RemoveDocument(document), &InvocationReasons::empty());
        Ok(())
    }

    async fn remove_project(&self, project: ProjectId) -> AnalysisResult {
        self.push(Call::RemoveProject(project), &InvocationReasons::empty());
        Ok(())
    }

    fn needs_reanalysis_on_option_changed(&self, option: &OptionChange) -> bool {
        self.option.as_deref() == Some(option.name.as_str())
    }
}

pub fn project(id: u32, name: &str) -> Project {
    Project::new(ProjectId::from_raw(id), name, Language::Rust)
}

pub fn document(id: u32, project: u32, path: &str, text: &str) -> Document {
    Document::new(DocumentId::from_raw(id), ProjectId::from_raw(project), path, text)
}

pub fn doc_id(id: u32) -> DocumentId {
    DocumentId::from_raw(id)
}

pub fn project_id(id: u32) -> ProjectId {
    ProjectId::from_raw(id)
}

/// Workspace pre-populated with `projects`
pub fn workspace(projects: Vec<Project>) -> Arc<Workspace> {
    let workspace = Arc::new(Workspace::new(WorkspaceKind::Host));
    for project in projects {
        workspace.add_project(project).unwrap();
    }
    workspace
}

pub fn analyzers(entries: Vec<(AnalyzerMetadata, Arc<dyn IncrementalAnalyzer>)>) -> AnalyzerSet {
    let mut set = AnalyzerSet::new();
    for (metadata, analyzer) in entries {
        set.push(metadata, analyzer);
    }
    set
}

/// Coordinator with a single recording analyzer, settled on the initial solution
pub async fn start_recording(
    workspace: &Arc<Workspace>,
    config: CoordinatorConfig,
    services: CoordinatorServices,
) -> (WorkCoordinator, Arc<Recorder>) {
    let recorder = Recorder::new();
    let set = analyzers(vec![(
        AnalyzerMetadata::new("recorder"),
        recorder.clone() as Arc<dyn IncrementalAnalyzer>,
    )]);
    let coordinator = WorkCoordinator::start(Arc::clone(workspace), config, set, services).unwrap();
    coordinator.wait_for_quiescence().await.unwrap();
    recorder.clear();
    (coordinator, recorder)
}
