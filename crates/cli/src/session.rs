use crate::analyzers::{self, Builtin};
use crate::loader::load_solution;
use crate::manifest::Manifest;
use crate::report::{Findings, Report};
use crate::sync::{FileSync, SyncAction};
use anyhow::Result;
use crawler_coordinator::{
    AnalyzerRegistry, CoordinatorConfig, CoordinatorServices, FaultSink, ProgressReporter,
    WorkCoordinator,
};
use crawler_graph::ProjectDependencyGraph;
use crawler_workspace::{ProjectId, Workspace, WorkspaceKind};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A loaded workspace with its coordinator and the built-ins' results
pub struct Session {
    workspace: Arc<Workspace>,
    registry: AnalyzerRegistry,
    coordinator: WorkCoordinator,
    findings: Arc<Findings>,
    sync: FileSync,
}

impl Session {
    /// Scan `root`, publish the solution and start analyzing it
    pub fn start(
        root: &Path,
        manifest: &Manifest,
        builtins: &[Builtin],
        config: CoordinatorConfig,
        track_active_document: bool,
    ) -> Result<Self> {
        let (solution, index) = load_solution(manifest, root)?;
        let workspace = Arc::new(
            Workspace::new(WorkspaceKind::Host).with_active_document_tracking(track_active_document),
        );
        workspace.add_solution(solution);
        log::info!(
            "Loaded {} documents in {} projects",
            index.document_count(),
            index.projects().len()
        );

        let findings = Arc::new(Findings::new());
        let registry = analyzers::registry(builtins, &findings);
        let services = CoordinatorServices {
            fault_sink: Arc::clone(&findings) as Arc<dyn FaultSink>,
            ..CoordinatorServices::default()
        };
        let coordinator = registry.register(Arc::clone(&workspace), config, services)?;

        Ok(Self {
            workspace,
            registry,
            coordinator,
            findings,
            sync: FileSync::new(index),
        })
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    pub fn progress(&self) -> Arc<ProgressReporter> {
        self.coordinator.progress()
    }

    pub fn report(&self) -> Report {
        self.findings.snapshot()
    }

    /// Mirror one changed path; a changed or added source file becomes the
    /// active document
    pub fn handle_path(&mut self, path: &Path) -> Result<Option<SyncAction>> {
        let action = self.sync.apply(&self.workspace, path)?;
        if let Some(SyncAction::Added(id) | SyncAction::Changed(id)) = &action {
            self.workspace.set_active_document(Some(*id));
        }
        Ok(action)
    }

    pub fn root(&self) -> &Path {
        self.sync.index().root()
    }

    /// Wait until every queued item has run
    pub async fn settle(&self) -> Result<()> {
        self.coordinator.wait_for_quiescence().await?;
        Ok(())
    }

    pub async fn shutdown(self) -> Result<()> {
        self.registry.unregister(&self.workspace, true).await?;
        Ok(())
    }
}

/// One-shot analysis of every project in `manifest`
pub async fn analyze(root: &Path, manifest: &Manifest, builtins: &[Builtin]) -> Result<Report> {
    let session = Session::start(root, manifest, builtins, CoordinatorConfig::for_batch(), false)?;
    session.settle().await?;
    let report = session.report();
    session.shutdown().await?;
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEntry {
    pub name: String,
    pub references: Vec<String>,
    pub direct_dependents: Vec<String>,
    pub transitive_dependents: Vec<String>,
}

/// Project dependency graph keyed by project name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphView {
    /// Dependencies before dependents
    pub build_order: Vec<String>,
    pub projects: Vec<GraphEntry>,
}

pub fn graph(root: &Path, manifest: &Manifest) -> Result<GraphView> {
    let (solution, _) = load_solution(manifest, root)?;
    let graph = ProjectDependencyGraph::from_solution(&solution);
    let names: HashMap<ProjectId, String> = solution
        .projects()
        .map(|p| (p.id(), p.name().to_string()))
        .collect();
    let named = |ids: Vec<ProjectId>| -> Vec<String> {
        let mut out: Vec<String> = ids.iter().filter_map(|id| names.get(id).cloned()).collect();
        out.sort();
        out
    };

    let mut projects: Vec<GraphEntry> = graph
        .snapshot()
        .projects
        .into_iter()
        .filter_map(|node| {
            Some(GraphEntry {
                name: names.get(&node.id)?.clone(),
                references: named(node.references),
                direct_dependents: named(node.direct_dependents),
                transitive_dependents: named(node.transitive_dependents),
            })
        })
        .collect();
    projects.sort_by(|a, b| a.name.cmp(&b.name));

    let build_order = graph
        .topologically_sorted()?
        .into_iter()
        .filter_map(|id| names.get(&id).cloned())
        .collect();
    Ok(GraphView {
        build_order,
        projects,
    })
}

pub fn render_graph(view: &GraphView) -> String {
    let mut out = format!("Build order: {}\n", view.build_order.join(" -> "));
    for entry in &view.projects {
        out.push_str(&format!("\n{}\n", entry.name));
        if !entry.references.is_empty() {
            out.push_str(&format!("  references: {}\n", entry.references.join(", ")));
        }
        if !entry.direct_dependents.is_empty() {
            out.push_str(&format!(
                "  dependents: {} (transitive: {})\n",
                entry.direct_dependents.join(", "),
                entry.transitive_dependents.join(", ")
            ));
        }
    }
    out
}
