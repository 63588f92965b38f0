use crawler_workspace::ProjectId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Project not in graph: {0}")]
    ProjectNotFound(ProjectId),

    #[error("Reference cycle through {0}")]
    Cycle(ProjectId),
}
