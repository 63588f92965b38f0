//! # Crawler Workspace
//!
//! Immutable corpus snapshots and the change notifications the background
//! analysis coordinator consumes.
//!
//! ## Model
//!
//! ```text
//! Workspace (host)
//!     │
//!     ├──> Solution snapshot (immutable, cheap to clone)
//!     │      └─> Project[]  (references, friends, options)
//!     │             └─> Document[] (source, additional, analyzer config)
//!     │
//!     └──> WorkspaceEvent stream (broadcast)
//!            ├─ Changed(kind, old solution, new solution)
//!            ├─ DocumentOpened / DocumentClosed / ActiveDocumentChanged
//!            └─ BufferChanged / OptionChanged
//! ```
//!
//! ## Example
//!
//! ```rust
//! use crawler_workspace::{Document, Language, Project, ProjectId, DocumentId, Workspace, WorkspaceKind};
//!
//! let workspace = Workspace::new(WorkspaceKind::Host);
//! let project = ProjectId::from_raw(1);
//! workspace
//!     .add_project(Project::new(project, "core", Language::Rust))
//!     .unwrap();
//! workspace
//!     .add_document(Document::new(DocumentId::from_raw(1), project, "src/lib.rs", "pub fn a() {}"))
//!     .unwrap();
//! assert_eq!(workspace.current_solution().documents().count(), 1);
//! ```

mod error;
mod events;
mod host;
mod ids;
mod language;
mod solution;

pub use error::{Result, WorkspaceError};
pub use events::{OptionChange, WorkspaceChange, WorkspaceChangeKind, WorkspaceEvent};
pub use host::{Workspace, WorkspaceKind};
pub use ids::{DocumentId, ProjectId};
pub use language::Language;
pub use solution::{Document, DocumentKind, Project, Solution};
