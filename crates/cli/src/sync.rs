use crate::loader::{load_document, read_document_text, FileIndex};
use anyhow::Result;
use crawler_workspace::{DocumentId, Workspace};
use std::path::{Component, Path, PathBuf};

/// What a filesystem change turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Added(DocumentId),
    Changed(DocumentId),
    Removed(Vec<DocumentId>),
}

/// Mirrors filesystem changes into a [`Workspace`]
pub struct FileSync {
    index: FileIndex,
}

impl FileSync {
    pub fn new(index: FileIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    /// Re-read `path` and publish the matching workspace change. Returns
    /// `None` when nothing observable changed.
    pub fn apply(&mut self, workspace: &Workspace, path: &Path) -> Result<Option<SyncAction>> {
        if path.is_file() {
            return match self.index.document(path) {
                Some(id) => self.refresh(workspace, id, path),
                None => self.add(workspace, path),
            };
        }
        if path.exists() {
            return Ok(None);
        }
        self.remove(workspace, path)
    }

    fn refresh(&mut self, workspace: &Workspace, id: DocumentId, path: &Path) -> Result<Option<SyncAction>> {
        let Some(text) = read_document_text(path) else {
            return Ok(None);
        };
        let solution = workspace.current_solution();
        if solution.document(id).is_some_and(|doc| doc.text() == text) {
            return Ok(None);
        }
        workspace.change_document_text(id, text)?;
        log::debug!("{} changed", self.index.relative(path).display());
        Ok(Some(SyncAction::Changed(id)))
    }

    fn add(&mut self, workspace: &Workspace, path: &Path) -> Result<Option<SyncAction>> {
        let Some(owner) = self.index.owner_of(path).cloned() else {
            return Ok(None);
        };
        if in_hidden_dir(&owner.dir, path) {
            return Ok(None);
        }
        let Some(document) = load_document(&self.index, &owner, path) else {
            return Ok(None);
        };
        let id = document.id();
        workspace.add_document(document)?;
        self.index.insert(path.to_path_buf(), id);
        log::debug!("{} added to '{}'", self.index.relative(path).display(), owner.name);
        Ok(Some(SyncAction::Added(id)))
    }

    /// `path` may be a file or a whole directory
    fn remove(&mut self, workspace: &Workspace, path: &Path) -> Result<Option<SyncAction>> {
        let gone: Vec<PathBuf> = match self.index.document(path) {
            Some(_) => vec![path.to_path_buf()],
            None => self
                .index
                .paths()
                .filter(|known| known.starts_with(path))
                .cloned()
                .collect(),
        };
        if gone.is_empty() {
            return Ok(None);
        }

        let mut removed = Vec::with_capacity(gone.len());
        for known in gone {
            if let Some(id) = self.index.remove(&known) {
                workspace.remove_document(id)?;
                log::debug!("{} removed", self.index.relative(&known).display());
                removed.push(id);
            }
        }
        removed.sort_unstable();
        Ok(Some(SyncAction::Removed(removed)))
    }
}

fn in_hidden_dir(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    let Some(parent) = relative.parent() else {
        return false;
    };
    parent.components().any(|c| match c {
        Component::Normal(name) => name.to_str().is_some_and(|n| n.starts_with('.')),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_directories_are_skipped() {
        let root = Path::new("/repo/core");
        assert!(in_hidden_dir(root, Path::new("/repo/core/.git/HEAD")));
        assert!(!in_hidden_dir(root, Path::new("/repo/core/.editorconfig")));
        assert!(!in_hidden_dir(root, Path::new("/repo/core/src/lib.rs")));
    }
}
