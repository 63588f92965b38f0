use crate::manifest::Manifest;
use anyhow::{Context, Result};
use crawler_workspace::{Document, DocumentId, DocumentKind, Language, Project, ProjectId, Solution};
use ignore::WalkBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const MAX_FILE_SIZE: u64 = 1024 * 1024;

const ADDITIONAL_EXTENSIONS: &[&str] = &["md", "txt", "json", "toml", "yaml", "yml"];

/// Directory owned by one project
#[derive(Debug, Clone)]
pub struct ProjectRoot {
    pub id: ProjectId,
    pub name: String,
    pub language: Language,
    /// Absolute directory
    pub dir: PathBuf,
}

/// Maps files on disk to projects and documents
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    root: PathBuf,
    projects: Vec<ProjectRoot>,
    documents: HashMap<PathBuf, DocumentId>,
}

impl FileIndex {
    /// Manifest directory every document path is relative to
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn projects(&self) -> &[ProjectRoot] {
        &self.projects
    }

    pub fn project_named(&self, name: &str) -> Option<&ProjectRoot> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn document(&self, path: &Path) -> Option<DocumentId> {
        self.documents.get(path).copied()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.documents.keys()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Project with the deepest directory containing `path`
    pub fn owner_of(&self, path: &Path) -> Option<&ProjectRoot> {
        self.projects
            .iter()
            .filter(|p| path.starts_with(&p.dir))
            .max_by_key(|p| p.dir.components().count())
    }

    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    pub(crate) fn insert(&mut self, path: PathBuf, id: DocumentId) {
        self.documents.insert(path, id);
    }

    pub(crate) fn remove(&mut self, path: &Path) -> Option<DocumentId> {
        self.documents.remove(path)
    }
}

/// Role of `path` inside a project of `language`, or `None` to skip it
pub fn classify(path: &Path, language: Language) -> Option<DocumentKind> {
    let name = path.file_name()?.to_str()?;
    if name == ".editorconfig" {
        return Some(DocumentKind::AnalyzerConfig);
    }
    if Language::from_path(path) == language {
        return Some(DocumentKind::Source);
    }
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    ADDITIONAL_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(DocumentKind::Additional)
}

/// Read a candidate file, skipping oversized and non-UTF-8 content
pub fn read_document_text(path: &Path) -> Option<String> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }
    if metadata.len() > MAX_FILE_SIZE {
        log::debug!(
            "Skipping large file: {} ({} bytes)",
            path.display(),
            metadata.len()
        );
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(err) => {
            log::debug!("Skipping unreadable file {}: {err}", path.display());
            None
        }
    }
}

/// Build a document for `path` owned by `owner`
pub(crate) fn load_document(index: &FileIndex, owner: &ProjectRoot, path: &Path) -> Option<Document> {
    let kind = classify(path, owner.language)?;
    let text = read_document_text(path)?;
    Some(Document::new(DocumentId::next(), owner.id, index.relative(path), text).with_kind(kind))
}

/// Scan every project directory named by `manifest` (relative to `root`)
pub fn load_solution(manifest: &Manifest, root: &Path) -> Result<(Solution, FileIndex)> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", root.display()))?;

    let mut index = FileIndex {
        root: root.clone(),
        ..FileIndex::default()
    };
    for entry in &manifest.projects {
        let dir = root.join(&entry.dir);
        let dir = dir
            .canonicalize()
            .with_context(|| format!("project '{}': missing directory {}", entry.name, dir.display()))?;
        index.projects.push(ProjectRoot {
            id: ProjectId::next(),
            name: entry.name.clone(),
            language: entry.language()?,
            dir,
        });
    }

    let mut solution = Solution::new();
    for entry in &manifest.projects {
        let Some(owner) = index.project_named(&entry.name).cloned() else {
            continue;
        };
        let references = entry
            .references
            .iter()
            .filter_map(|name| index.project_named(name).map(|p| p.id));
        let mut project = Project::new(owner.id, &owner.name, owner.language)
            .with_assembly_name(entry.assembly.clone().unwrap_or_else(|| entry.name.clone()))
            .with_references(references);
        for friend in &entry.friends {
            project = project.with_friend(friend);
        }

        for path in scan_dir(&owner.dir) {
            // Files under a nested project belong to that project
            if index.owner_of(&path).map(|p| p.id) != Some(owner.id) {
                continue;
            }
            if let Some(document) = load_document(&index, &owner, &path) {
                index.insert(path, document.id());
                project = project.with_document(document);
            }
        }
        log::info!(
            "Loaded project '{}' ({} documents)",
            owner.name,
            project.all_documents().count()
        );
        solution = solution.with_project(project)?;
    }
    Ok((solution, index))
}

fn scan_dir(dir: &Path) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(dir)
        .hidden(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .filter_entry(|entry| {
            let hidden = entry.file_name().to_str().is_some_and(|n| n.starts_with('.'));
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(hidden && is_dir && entry.depth() > 0)
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_some_and(|t| t.is_file()) => {
                files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(err) => log::warn!("Error walking directory: {err}"),
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_by_project_language() {
        let rust = Language::Rust;
        assert_eq!(classify(Path::new("src/lib.rs"), rust), Some(DocumentKind::Source));
        assert_eq!(classify(Path::new("README.md"), rust), Some(DocumentKind::Additional));
        assert_eq!(
            classify(Path::new(".editorconfig"), rust),
            Some(DocumentKind::AnalyzerConfig)
        );
        assert_eq!(classify(Path::new("web/app.ts"), rust), None);
        assert_eq!(classify(Path::new("logo.png"), rust), None);
    }

    #[test]
    fn deepest_directory_owns_a_path() {
        let outer = ProjectRoot {
            id: ProjectId::from_raw(1),
            name: "outer".into(),
            language: Language::Rust,
            dir: PathBuf::from("/repo"),
        };
        let inner = ProjectRoot {
            id: ProjectId::from_raw(2),
            name: "inner".into(),
            language: Language::Rust,
            dir: PathBuf::from("/repo/inner"),
        };
        let index = FileIndex {
            root: PathBuf::from("/repo"),
            projects: vec![outer, inner],
            documents: HashMap::new(),
        };

        let owner = |p: &str| index.owner_of(Path::new(p)).map(|r| r.name.clone());
        assert_eq!(owner("/repo/inner/src/lib.rs").as_deref(), Some("inner"));
        assert_eq!(owner("/repo/src/lib.rs").as_deref(), Some("outer"));
        assert_eq!(owner("/elsewhere/lib.rs"), None);
    }
}
