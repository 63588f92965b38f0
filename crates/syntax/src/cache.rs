use crate::error::Result;
use crate::tree::SyntaxTree;
use crawler_workspace::{Document, DocumentId};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

/// Default number of parsed document versions kept around
pub const DEFAULT_TREE_CACHE_CAPACITY: usize = 512;

/// LRU of parsed trees keyed by document version.
///
/// A hit for the pre-edit version is what makes a tree "cheaply available"
/// to differencing.
pub struct TreeCache {
    inner: Mutex<LruCache<(DocumentId, u64), Arc<SyntaxTree>>>,
}

impl TreeCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, document: DocumentId, version: u64) -> Option<Arc<SyntaxTree>> {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(&(document, version)).cloned()
    }

    pub fn insert(&self, document: DocumentId, version: u64, tree: Arc<SyntaxTree>) {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put((document, version), tree);
    }

    /// Cached tree for this document version, parsing on miss
    pub fn get_or_parse(&self, document: &Document) -> Result<Arc<SyntaxTree>> {
        if let Some(tree) = self.get(document.id(), document.version()) {
            return Ok(tree);
        }
        let tree = Arc::new(SyntaxTree::parse(document.language(), document.text())?);
        self.insert(document.id(), document.version(), Arc::clone(&tree));
        Ok(tree)
    }

    /// Drop every cached version of `document`
    pub fn remove_document(&self, document: DocumentId) {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let stale: Vec<_> = cache
            .iter()
            .filter(|((id, _), _)| *id == document)
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TreeCache {
    fn default() -> Self {
        Self::new(DEFAULT_TREE_CACHE_CAPACITY)
    }
}
