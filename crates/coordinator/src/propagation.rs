use crate::config::PropagationMode;
use crate::context::SharedContext;
use crate::queue::{ExecutionGuard, ExecutionLease, QueueEntry};
use crate::tracker::CompletionToken;
use crate::work_item::{InvocationReasons, WorkItem, WorkItemKey};
use crawler_graph::ProjectDependencyGraph;
use crawler_syntax::{Accessibility, ChangedSymbol, LanguageExt, TreeCache};
use crawler_workspace::{DocumentId, ProjectId, Solution};
use std::collections::{BTreeSet, HashSet};
use std::sync::{PoisonError, RwLock};

/// Whether a project's compilation is already built and cached.
///
/// Only materialized compilations can prove they lack access to a
/// project's internals; everything else is enqueued conservatively.
pub trait CompilationCache: Send + Sync {
    fn is_materialized(&self, project: ProjectId) -> bool;
}

/// Nothing is ever materialized
pub struct NoCompilationCache;

impl CompilationCache for NoCompilationCache {
    fn is_materialized(&self, _project: ProjectId) -> bool {
        false
    }
}

/// Compilation cache probe backed by an explicit set of projects
#[derive(Debug, Default)]
pub struct InMemoryCompilationCache {
    materialized: RwLock<HashSet<ProjectId>>,
}

impl InMemoryCompilationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_materialized(&self, project: ProjectId) {
        self.materialized
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(project);
    }

    pub fn evict(&self, project: ProjectId) {
        self.materialized
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&project);
    }
}

impl CompilationCache for InMemoryCompilationCache {
    fn is_materialized(&self, project: ProjectId) -> bool {
        self.materialized
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&project)
    }
}

/// A semantic change waiting for a fan-out decision
#[derive(Debug)]
pub struct PropagationRequest {
    pub project: ProjectId,
    pub document: Option<DocumentId>,
    /// `None` when the edit could not be attributed to a declaration
    pub symbol: Option<ChangedSymbol>,
    pub(crate) completion: Option<CompletionToken>,
}

impl PropagationRequest {
    pub fn new(project: ProjectId, document: Option<DocumentId>, symbol: Option<ChangedSymbol>) -> Self {
        Self {
            project,
            document,
            symbol,
            completion: None,
        }
    }
}

impl QueueEntry for PropagationRequest {
    type Key = WorkItemKey;

    fn key(&self) -> WorkItemKey {
        match self.document {
            Some(id) => WorkItemKey::Document(id),
            None => WorkItemKey::Project(self.project),
        }
    }

    fn project_id(&self) -> ProjectId {
        self.project
    }

    fn is_low_priority(&self) -> bool {
        false
    }

    fn merge(self, newer: Self) -> Self {
        // Two different declarations changed: fall back to the widest fan-out
        let symbol = if self.symbol == newer.symbol {
            newer.symbol
        } else {
            None
        };
        Self {
            project: newer.project,
            document: newer.document,
            symbol,
            completion: newer.completion,
        }
    }
}

/// Targets chosen for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationPlan {
    /// Documents to reanalyze on the normal tier
    pub documents: BTreeSet<DocumentId>,
    /// Projects to reanalyze in full
    pub projects: BTreeSet<ProjectId>,
}

/// Inputs of one fan-out decision
pub struct Planner<'a> {
    pub solution: &'a Solution,
    pub graph: &'a ProjectDependencyGraph,
    pub mode: PropagationMode,
    pub compilations: &'a dyn CompilationCache,
    pub trees: &'a TreeCache,
}

impl Planner<'_> {
    pub fn plan(&self, project: ProjectId, document: Option<DocumentId>, symbol: Option<&ChangedSymbol>) -> PropagationPlan {
        let mut plan = PropagationPlan::default();
        if !self.solution.contains_project(project) {
            return plan;
        }
        let Some(symbol) = symbol else {
            self.public(project, &mut plan);
            return plan;
        };

        match (&symbol.container, symbol.accessibility) {
            (Some(container), Accessibility::Private) => {
                self.type_files(project, &container.name, document, &mut plan);
            }
            (Some(container), Accessibility::Internal | Accessibility::ProtectedInternal) => {
                match container.accessibility {
                    Some(Accessibility::Private) => {
                        self.type_files(project, &container.name, document, &mut plan)
                    }
                    // A visible container does not widen the member's own visibility
                    _ => self.internal(project, &mut plan),
                }
            }
            (None, Accessibility::Private) if symbol.kind.is_type() => {
                self.type_files(project, &symbol.name, document, &mut plan);
            }
            (None, Accessibility::Private) => plan.documents.extend(document),
            (None, Accessibility::Internal) => self.internal(project, &mut plan),
            _ => self.public(project, &mut plan),
        }
        plan
    }

    /// Files of `project` contributing to type `name`, plus the edited file
    fn type_files(&self, project: ProjectId, name: &str, changed: Option<DocumentId>, plan: &mut PropagationPlan) {
        plan.documents.extend(changed);
        let Some(project) = self.solution.project(project) else {
            return;
        };
        for document in project.documents() {
            if !document.language().supports_syntax() {
                continue;
            }
            match self.trees.get_or_parse(document) {
                Ok(tree) if tree.declares_type(name) => {
                    plan.documents.insert(document.id());
                }
                Ok(_) => {}
                Err(err) => log::debug!("skipping {} for type lookup: {err}", document.path().display()),
            }
        }
    }

    fn dependents(&self, project: ProjectId) -> Vec<ProjectId> {
        match self.mode {
            PropagationMode::Direct => self.graph.direct_dependents(project),
            PropagationMode::Transitive => self.graph.transitive_dependents(project),
        }
    }

    /// Owning project plus dependents able to see its internals
    fn internal(&self, project: ProjectId, plan: &mut PropagationPlan) {
        plan.projects.insert(project);
        let Some(owner) = self.solution.project(project) else {
            return;
        };
        for dependent in self.dependents(project) {
            let Some(candidate) = self.solution.project(dependent) else {
                continue;
            };
            if !self.compilations.is_materialized(dependent) {
                plan.projects.insert(dependent);
            } else if owner.grants_internals_to(candidate)
                || owner.assembly_name() == candidate.assembly_name()
            {
                plan.projects.insert(dependent);
            } else {
                log::debug!("{dependent} cannot see internals of {project}, not propagating");
            }
        }
    }

    fn public(&self, project: ProjectId, plan: &mut PropagationPlan) {
        plan.projects.insert(project);
        plan.projects.extend(
            self.dependents(project)
                .into_iter()
                .filter(|dependent| self.solution.contains_project(*dependent)),
        );
    }
}

/// Decide and enqueue the fan-out of one request
pub(crate) fn execute(
    cx: &SharedContext,
    solution: &Solution,
    graph: &ProjectDependencyGraph,
    request: PropagationRequest,
    lease: ExecutionLease<WorkItemKey>,
) {
    let _guard = ExecutionGuard::new(cx.propagation_queue(), lease);
    let planner = Planner {
        solution,
        graph,
        mode: cx.config.propagation,
        compilations: cx.services.compilation_cache.as_ref(),
        trees: &cx.trees,
    };
    let plan = planner.plan(request.project, request.document, request.symbol.as_ref());
    log::debug!(
        "propagating change in {} ({}): {} documents, {} projects",
        request.project,
        request
            .symbol
            .as_ref()
            .map_or_else(|| "unresolved".to_string(), |s| format!("{:?} {}", s.accessibility, s.name)),
        plan.documents.len(),
        plan.projects.len()
    );

    for id in &plan.documents {
        let Some(document) = solution.document(*id) else {
            continue;
        };
        let item = WorkItem::document(
            *id,
            document.project_id(),
            document.language(),
            InvocationReasons::semantic_changed(),
        );
        cx.enqueue_document(item);
    }

    for id in &plan.projects {
        let Some(project) = solution.project(*id) else {
            continue;
        };
        for document in project.documents() {
            if Some(document.id()) == request.document {
                continue;
            }
            let item = WorkItem::document(
                document.id(),
                *id,
                document.language(),
                InvocationReasons::semantic_changed(),
            )
            .with_low_priority(true);
            cx.enqueue_document(item);
        }
        cx.enqueue_project(WorkItem::project(
            *id,
            project.language(),
            InvocationReasons::semantic_changed(),
        ));
    }
    // `request` drops here, after its follow-ups hold their own tokens
}
