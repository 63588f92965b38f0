use crate::error::{Result, SyntaxError};
use crawler_workspace::Language;

/// Grammar lookup for the languages the syntax layer understands
pub trait LanguageExt {
    /// Whether a cheap tree can be built for this language
    fn supports_syntax(self) -> bool;

    /// Get Tree-sitter language instance
    fn tree_sitter_language(self) -> Result<tree_sitter::Language>;
}

impl LanguageExt for Language {
    fn supports_syntax(self) -> bool {
        matches!(
            self,
            Language::Rust | Language::Python | Language::JavaScript | Language::TypeScript
        )
    }

    fn tree_sitter_language(self) -> Result<tree_sitter::Language> {
        match self {
            Language::Rust => Ok(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Ok(tree_sitter_python::LANGUAGE.into()),
            Language::JavaScript => Ok(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript => Ok(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            _ => Err(SyntaxError::UnsupportedLanguage(self)),
        }
    }
}
