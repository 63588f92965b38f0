use crate::types::ProjectDependencyGraph;
use crawler_workspace::Solution;

impl ProjectDependencyGraph {
    /// Build the reference graph of a solution snapshot.
    ///
    /// References to projects missing from the snapshot are skipped; they
    /// re-appear once the referenced project is added.
    pub fn from_solution(solution: &Solution) -> Self {
        let mut graph = ProjectDependencyGraph::new();
        graph.graph_version = solution.graph_version();

        for project in solution.projects() {
            graph.add_project(project.id());
        }

        for project in solution.projects() {
            for reference in project.references() {
                if !solution.contains_project(*reference) {
                    log::debug!(
                        "{} references unknown {}, skipping edge",
                        project.id(),
                        reference
                    );
                    continue;
                }
                graph.add_reference(project.id(), *reference);
            }
        }

        log::debug!(
            "Built project graph: {} projects, {} references",
            graph.project_count(),
            graph.reference_count()
        );

        graph
    }
}

#[cfg(test)]
mod tests {
    use crate::ProjectDependencyGraph;
    use crawler_workspace::{Language, Project, ProjectId, Solution};

    #[test]
    fn builds_from_solution_and_skips_dangling_references() {
        let core = ProjectId::from_raw(1);
        let app = ProjectId::from_raw(2);
        let ghost = ProjectId::from_raw(9);
        let solution = Solution::new()
            .with_project(Project::new(core, "core", Language::Rust))
            .unwrap()
            .with_project(
                Project::new(app, "app", Language::Rust)
                    .with_reference(core)
                    .with_reference(ghost),
            )
            .unwrap();

        let graph = ProjectDependencyGraph::from_solution(&solution);
        assert_eq!(graph.project_count(), 2);
        assert_eq!(graph.reference_count(), 1);
        assert_eq!(graph.direct_dependents(core), vec![app]);
        assert!(!graph.contains(ghost));
        assert_eq!(graph.graph_version(), solution.graph_version());
    }
}
