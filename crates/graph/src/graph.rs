use crate::error::{GraphError, Result};
use crate::types::{GraphSnapshot, ProjectDependencyGraph, ProjectNode};
use crawler_workspace::ProjectId;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::visit::{Bfs, Reversed};
use petgraph::Direction;

impl ProjectDependencyGraph {
    /// Projects that reference `project` directly
    pub fn direct_dependents(&self, project: ProjectId) -> Vec<ProjectId> {
        self.neighbors(project, Direction::Incoming)
    }

    /// Projects that reference `project` directly or through other projects
    pub fn transitive_dependents(&self, project: ProjectId) -> Vec<ProjectId> {
        let Some(&start) = self.index.get(&project) else {
            return Vec::new();
        };
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, start);
        let mut out = Vec::new();
        while let Some(node) = bfs.next(reversed) {
            if node != start {
                out.push(self.graph[node]);
            }
        }
        out.sort_unstable();
        out
    }

    /// Projects `project` references directly
    pub fn direct_dependencies(&self, project: ProjectId) -> Vec<ProjectId> {
        self.neighbors(project, Direction::Outgoing)
    }

    pub fn transitive_dependencies(&self, project: ProjectId) -> Vec<ProjectId> {
        let Some(&start) = self.index.get(&project) else {
            return Vec::new();
        };
        let mut bfs = Bfs::new(&self.graph, start);
        let mut out = Vec::new();
        while let Some(node) = bfs.next(&self.graph) {
            if node != start {
                out.push(self.graph[node]);
            }
        }
        out.sort_unstable();
        out
    }

    /// True when `dependent` reaches `dependency` through references
    pub fn depends_on(&self, dependent: ProjectId, dependency: ProjectId) -> Result<bool> {
        let from = self
            .index
            .get(&dependent)
            .ok_or(GraphError::ProjectNotFound(dependent))?;
        let to = self
            .index
            .get(&dependency)
            .ok_or(GraphError::ProjectNotFound(dependency))?;
        if from == to {
            return Ok(false);
        }
        Ok(has_path_connecting(&self.graph, *from, *to, None))
    }

    /// Dependencies before dependents
    pub fn topologically_sorted(&self) -> Result<Vec<ProjectId>> {
        let mut order = toposort(&self.graph, None)
            .map_err(|cycle| GraphError::Cycle(self.graph[cycle.node_id()]))?;
        order.reverse();
        Ok(order.into_iter().map(|idx| self.graph[idx]).collect())
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let mut ids: Vec<ProjectId> = self.index.keys().copied().collect();
        ids.sort_unstable();
        let projects = ids
            .into_iter()
            .map(|id| ProjectNode {
                id,
                references: self.direct_dependencies(id),
                direct_dependents: self.direct_dependents(id),
                transitive_dependents: self.transitive_dependents(id),
            })
            .collect();
        GraphSnapshot { projects }
    }

    fn neighbors(&self, project: ProjectId, direction: Direction) -> Vec<ProjectId> {
        let Some(&idx) = self.index.get(&project) else {
            return Vec::new();
        };
        let mut out: Vec<ProjectId> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n])
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}
