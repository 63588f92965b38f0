use crawler_workspace::Language;
use thiserror::Error;

/// Result type for syntax operations
pub type Result<T> = std::result::Result<T, SyntaxError>;

/// Errors that can occur while building a syntax tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    /// No tree-sitter grammar for this language
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(Language),

    /// Parser gave up (timeout or cancellation inside tree-sitter)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Grammar could not be loaded into the parser
    #[error("Tree-sitter error: {0}")]
    TreeSitterError(String),
}

impl SyntaxError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitterError(msg.into())
    }
}
