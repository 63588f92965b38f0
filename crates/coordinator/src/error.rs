use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Workspace error: {0}")]
    Workspace(#[from] crawler_workspace::WorkspaceError),

    #[error("Graph error: {0}")]
    Graph(#[from] crawler_graph::GraphError),

    #[error("Syntax error: {0}")]
    Syntax(#[from] crawler_syntax::SyntaxError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Analyzer {analyzer} failed on {target}: {message}")]
    AnalyzerFailed {
        analyzer: String,
        target: String,
        message: String,
    },

    #[error("Coordinator is shut down")]
    ShutDown,

    #[error("{0}")]
    Other(String),
}

impl CoordinatorError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Outcome of one analyzer pass that did not complete
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The pass observed its cancellation token; never reported as a fault
    #[error("analysis cancelled")]
    Cancelled,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl AnalysisError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Cancelled)
    }
}
