use crate::ids::{DocumentId, ProjectId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkspaceError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceError {
    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("Document already exists: {0}")]
    DuplicateDocument(DocumentId),

    #[error("Invalid project reference: {from} -> {to}")]
    InvalidReference { from: ProjectId, to: ProjectId },
}
