use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_PROJECT_ID: AtomicU32 = AtomicU32::new(1 << 20);
static NEXT_DOCUMENT_ID: AtomicU32 = AtomicU32::new(1 << 20);

/// Identity of a project, stable across solution snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(u32);

impl ProjectId {
    /// Wrap a caller-chosen raw id (tests, manifests)
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Allocate a fresh id that does not collide with small raw ids
    pub fn next() -> Self {
        Self(NEXT_PROJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project#{}", self.0)
    }
}

/// Identity of a document, stable across solution snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(u32);

impl DocumentId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "document#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_ids_are_unique_and_above_raw_range() {
        let a = ProjectId::next();
        let b = ProjectId::next();
        assert_ne!(a, b);
        assert!(a.as_raw() >= 1 << 20);
        assert_eq!(DocumentId::from_raw(7).to_string(), "document#7");
    }
}
