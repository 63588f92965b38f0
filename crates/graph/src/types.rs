use crawler_workspace::ProjectId;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::HashMap;

/// Directed project reference graph (edge `a -> b`: `a` references `b`)
#[derive(Debug, Clone, Default)]
pub struct ProjectDependencyGraph {
    /// Node weight is the project id; edges carry no data
    pub(crate) graph: DiGraph<ProjectId, ()>,

    /// ProjectId -> NodeIndex mapping for fast lookup
    pub(crate) index: HashMap<ProjectId, NodeIndex>,

    /// Solution graph version this graph was built from
    pub(crate) graph_version: u64,
}

impl ProjectDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a project node (idempotent)
    pub fn add_project(&mut self, project: ProjectId) -> NodeIndex {
        if let Some(idx) = self.index.get(&project) {
            return *idx;
        }
        let idx = self.graph.add_node(project);
        self.index.insert(project, idx);
        idx
    }

    /// Record that `from` references `to`
    pub fn add_reference(&mut self, from: ProjectId, to: ProjectId) {
        let from_idx = self.add_project(from);
        let to_idx = self.add_project(to);
        if self.graph.find_edge(from_idx, to_idx).is_none() {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    pub fn contains(&self, project: ProjectId) -> bool {
        self.index.contains_key(&project)
    }

    pub fn project_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn reference_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn graph_version(&self) -> u64 {
        self.graph_version
    }
}

/// Serializable view of the graph (CLI output, diagnostics)
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub projects: Vec<ProjectNode>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjectNode {
    pub id: ProjectId,
    pub references: Vec<ProjectId>,
    pub direct_dependents: Vec<ProjectId>,
    pub transitive_dependents: Vec<ProjectId>,
}
