use crate::error::{Result, WorkspaceError};
use crate::ids::{DocumentId, ProjectId};
use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Role a text file plays inside its project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Analyzable source file
    Source,
    /// Non-source input the analyzers may read (resources, docs)
    Additional,
    /// Analyzer configuration (e.g. `.editorconfig`, lint config)
    AnalyzerConfig,
}

/// One text unit belonging to exactly one project
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    project_id: ProjectId,
    path: PathBuf,
    kind: DocumentKind,
    language: Language,
    text: Arc<str>,
    version: u64,
}

impl Document {
    pub fn new(
        id: DocumentId,
        project_id: ProjectId,
        path: impl Into<PathBuf>,
        text: impl Into<Arc<str>>,
    ) -> Self {
        let path = path.into();
        Self {
            id,
            project_id,
            language: Language::from_path(&path),
            path,
            kind: DocumentKind::Source,
            text: text.into(),
            version: 1,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = kind;
        self
    }

    /// New snapshot of this document with replaced text and a bumped version
    #[must_use]
    pub fn with_text(&self, text: impl Into<Arc<str>>) -> Self {
        Self {
            text: text.into(),
            version: self.version + 1,
            ..self.clone()
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn shared_text(&self) -> Arc<str> {
        self.text.clone()
    }

    /// Syntax version: bumped on every text change
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Named group of documents compiled together
#[derive(Debug, Clone)]
pub struct Project {
    id: ProjectId,
    name: String,
    assembly_name: String,
    language: Language,
    references: Vec<ProjectId>,
    internals_visible_to: BTreeSet<String>,
    documents: BTreeMap<DocumentId, Arc<Document>>,
    version: u64,
}

impl Project {
    pub fn new(id: ProjectId, name: impl Into<String>, language: Language) -> Self {
        let name = name.into();
        Self {
            id,
            assembly_name: name.clone(),
            name,
            language,
            references: Vec::new(),
            internals_visible_to: BTreeSet::new(),
            documents: BTreeMap::new(),
            version: 1,
        }
    }

    #[must_use]
    pub fn with_assembly_name(mut self, assembly_name: impl Into<String>) -> Self {
        self.assembly_name = assembly_name.into();
        self
    }

    #[must_use]
    pub fn with_reference(mut self, project: ProjectId) -> Self {
        if !self.references.contains(&project) {
            self.references.push(project);
        }
        self
    }

    #[must_use]
    pub fn with_references(mut self, projects: impl IntoIterator<Item = ProjectId>) -> Self {
        for project in projects {
            self = self.with_reference(project);
        }
        self
    }

    /// Grant another assembly access to this project's internal symbols
    #[must_use]
    pub fn with_friend(mut self, assembly_name: impl Into<String>) -> Self {
        self.internals_visible_to.insert(assembly_name.into());
        self
    }

    pub fn id(&self) -> ProjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assembly_name(&self) -> &str {
        &self.assembly_name
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Projects this project references (its dependencies)
    pub fn references(&self) -> &[ProjectId] {
        &self.references
    }

    pub fn internals_visible_to(&self) -> &BTreeSet<String> {
        &self.internals_visible_to
    }

    /// True when `other` is this project or a declared friend of it
    pub fn grants_internals_to(&self, other: &Project) -> bool {
        self.id == other.id || self.internals_visible_to.contains(&other.assembly_name)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn document(&self, id: DocumentId) -> Option<&Arc<Document>> {
        self.documents.get(&id)
    }

    /// Source documents only
    pub fn documents(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.documents
            .values()
            .filter(|doc| doc.kind() == DocumentKind::Source)
    }

    /// Source, additional and analyzer-config documents
    pub fn all_documents(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.documents.values()
    }

    pub fn document_ids(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.documents().map(|doc| doc.id())
    }

    /// Compares everything except the documents (references, friends, names)
    pub fn same_configuration(&self, other: &Project) -> bool {
        self.name == other.name
            && self.assembly_name == other.assembly_name
            && self.language == other.language
            && self.references == other.references
            && self.internals_visible_to == other.internals_visible_to
    }

    #[must_use]
    pub fn with_document(mut self, document: Document) -> Self {
        self.insert_document(Arc::new(document));
        self
    }

    fn insert_document(&mut self, document: Arc<Document>) {
        self.documents.insert(document.id(), document);
        self.version += 1;
    }

    fn remove_document(&mut self, id: DocumentId) -> Option<Arc<Document>> {
        let removed = self.documents.remove(&id);
        if removed.is_some() {
            self.version += 1;
        }
        removed
    }
}

/// Immutable snapshot of every project and document at one point in time
#[derive(Debug, Clone, Default)]
pub struct Solution {
    version: u64,
    graph_version: u64,
    projects: Arc<BTreeMap<ProjectId, Arc<Project>>>,
    document_owners: Arc<HashMap<DocumentId, ProjectId>>,
}

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped on every change
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Bumped only when the project set or project references change
    pub fn graph_version(&self) -> u64 {
        self.graph_version
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn project(&self, id: ProjectId) -> Option<&Arc<Project>> {
        self.projects.get(&id)
    }

    pub fn projects(&self) -> impl Iterator<Item = &Arc<Project>> {
        self.projects.values()
    }

    pub fn project_ids(&self) -> impl Iterator<Item = ProjectId> + '_ {
        self.projects.keys().copied()
    }

    pub fn contains_project(&self, id: ProjectId) -> bool {
        self.projects.contains_key(&id)
    }

    pub fn owning_project(&self, document: DocumentId) -> Option<ProjectId> {
        self.document_owners.get(&document).copied()
    }

    /// Any document kind
    pub fn document(&self, id: DocumentId) -> Option<&Arc<Document>> {
        let owner = self.document_owners.get(&id)?;
        self.projects.get(owner)?.document(id)
    }

    pub fn contains_document(&self, id: DocumentId) -> bool {
        self.document(id).is_some()
    }

    /// Every source document across all projects
    pub fn documents(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.projects.values().flat_map(|project| project.documents())
    }

    /// Add a project or replace the one with the same id
    pub fn with_project(&self, project: Project) -> Result<Self> {
        if project.references().contains(&project.id()) {
            return Err(WorkspaceError::InvalidReference {
                from: project.id(),
                to: project.id(),
            });
        }
        for doc in project.all_documents() {
            match self.document_owners.get(&doc.id()) {
                Some(owner) if *owner != project.id() => {
                    return Err(WorkspaceError::DuplicateDocument(doc.id()));
                }
                _ => {}
            }
        }

        let graph_changed = self
            .projects
            .get(&project.id())
            .map_or(true, |old| old.references() != project.references());

        let mut next = self.bumped(graph_changed);
        let owners = Arc::make_mut(&mut next.document_owners);
        if let Some(old) = self.projects.get(&project.id()) {
            for id in old.documents.keys() {
                owners.remove(id);
            }
        }
        for id in project.documents.keys() {
            owners.insert(*id, project.id());
        }
        Arc::make_mut(&mut next.projects).insert(project.id(), Arc::new(project));
        Ok(next)
    }

    pub fn without_project(&self, id: ProjectId) -> Result<Self> {
        let project = self
            .projects
            .get(&id)
            .ok_or(WorkspaceError::ProjectNotFound(id))?;
        let mut next = self.bumped(true);
        let owners = Arc::make_mut(&mut next.document_owners);
        for doc_id in project.documents.keys() {
            owners.remove(doc_id);
        }
        Arc::make_mut(&mut next.projects).remove(&id);
        Ok(next)
    }

    /// Add a document or replace the one with the same id
    pub fn with_document(&self, document: Document) -> Result<Self> {
        let project_id = document.project_id();
        if !self.projects.contains_key(&project_id) {
            return Err(WorkspaceError::ProjectNotFound(project_id));
        }
        if let Some(owner) = self.document_owners.get(&document.id()) {
            if *owner != project_id {
                return Err(WorkspaceError::DuplicateDocument(document.id()));
            }
        }

        let mut next = self.bumped(false);
        Arc::make_mut(&mut next.document_owners).insert(document.id(), project_id);
        next.update_project(project_id, |project| {
            project.insert_document(Arc::new(document));
        });
        Ok(next)
    }

    pub fn without_document(&self, id: DocumentId) -> Result<Self> {
        let owner = self
            .owning_project(id)
            .ok_or(WorkspaceError::DocumentNotFound(id))?;
        let mut next = self.bumped(false);
        Arc::make_mut(&mut next.document_owners).remove(&id);
        next.update_project(owner, |project| {
            project.remove_document(id);
        });
        Ok(next)
    }

    pub fn with_document_text(&self, id: DocumentId, text: impl Into<Arc<str>>) -> Result<Self> {
        let document = self
            .document(id)
            .ok_or(WorkspaceError::DocumentNotFound(id))?;
        let updated = document.with_text(text);
        self.with_document(updated)
    }

    fn bumped(&self, graph_changed: bool) -> Self {
        let mut next = self.clone();
        next.version += 1;
        if graph_changed {
            next.graph_version += 1;
        }
        next
    }

    fn update_project(&mut self, id: ProjectId, update: impl FnOnce(&mut Project)) {
        if let Some(project) = Arc::make_mut(&mut self.projects).get_mut(&id) {
            update(Arc::make_mut(project));
        }
    }
}
