//! # Crawler Syntax
//!
//! Cheap, tree-sitter backed syntax summaries used to classify edits.
//!
//! ## Architecture
//!
//! ```text
//! Document text
//!     │
//!     ├──> Tree-sitter Parsing → AST
//!     │
//!     ├──> Declaration Extraction
//!     │    ├─> kind, name, byte range, body range
//!     │    ├─> accessibility (pub / pub(crate) / _name / private / export)
//!     │    └─> member path (container chain + ordinal)
//!     │
//!     └──> SyntaxTree
//!          ├─> outline (function bodies elided)
//!          ├─> member_at / resolve_member
//!          └─> symbol_at → ChangedSymbol
//! ```
//!
//! Two versions of a file whose outlines are equal differ only inside
//! function bodies; the edit can then be attributed to one member.
//!
//! ## Example
//!
//! ```rust
//! use crawler_syntax::{text_change, SyntaxTree};
//! use crawler_workspace::Language;
//!
//! let before = "fn total() -> u32 { 1 }";
//! let after = "fn total() -> u32 { 2 }";
//!
//! let old = SyntaxTree::parse(Language::Rust, before).unwrap();
//! let new = SyntaxTree::parse(Language::Rust, after).unwrap();
//! assert!(old.same_outline(&new));
//!
//! let change = text_change(before, after).unwrap();
//! let member = new.member_at(change.new_range).unwrap();
//! assert_eq!(member.name, "total");
//! ```

mod ast_analyzer;
mod cache;
mod diff;
mod error;
mod language;
mod tree;
mod types;

pub use ast_analyzer::AstAnalyzer;
pub use cache::{TreeCache, DEFAULT_TREE_CACHE_CAPACITY};
pub use diff::text_change;
pub use error::{Result, SyntaxError};
pub use language::LanguageExt;
pub use tree::SyntaxTree;
pub use types::{
    Accessibility, ChangedSymbol, ContainerSymbol, Declaration, DeclarationKind, MemberPath,
    PathSegment, TextChange, TextRange,
};
