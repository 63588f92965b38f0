//! # Crawler Graph
//!
//! Project-to-project reference graph used to decide how far a semantic
//! change has to ripple.
//!
//! ## Architecture
//!
//! ```text
//! Solution snapshot
//!     │
//!     ├──> Graph Builder
//!     │      └─ one node per project, one edge per reference
//!     │
//!     └──> ProjectDependencyGraph (petgraph)
//!            ├─ Edges: project ──references──> dependency
//!            ├─ direct / transitive dependents (incoming walk)
//!            └─ direct / transitive dependencies (outgoing walk)
//! ```

mod builder;
mod error;
mod graph;
mod types;

pub use error::{GraphError, Result};
pub use types::{GraphSnapshot, ProjectDependencyGraph, ProjectNode};
