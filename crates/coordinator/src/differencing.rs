use crate::analyzer::AnalyzerId;
use crate::config::BackgroundAnalysisScope;
use crate::context::SharedContext;
use crate::propagation::PropagationRequest;
use crate::tier::Tier;
use crate::work_item::{
    ActiveMember, AnalyzerFilter, InvocationReasons, ReanalyzeScope, WorkItem, WorkItemKey,
};
use crawler_syntax::{text_change, ChangedSymbol, LanguageExt, TreeCache};
use crawler_workspace::{
    Document, DocumentId, DocumentKind, OptionChange, Project, Solution, WorkspaceChange,
    WorkspaceChangeKind, WorkspaceEvent,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// How one document edit is reanalyzed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditClassification {
    pub reasons: InvocationReasons,
    /// Set for edits confined to one member body
    pub active_member: Option<ActiveMember>,
    /// Declaration enclosing a whole-file edit, when it could be found
    pub symbol: Option<ChangedSymbol>,
}

impl EditClassification {
    pub fn is_member_scoped(&self) -> bool {
        self.active_member.is_some()
    }
}

/// Classify the edit turning `old` into `new`. `None` when nothing changed.
///
/// An edit is member-scoped only when the pre-edit tree is already cached,
/// neither version has parse errors, the outlines match and the edit sits in
/// the body of the same member in both versions. Everything else is a
/// whole-file edit.
pub fn classify_edit(trees: &TreeCache, old: &Document, new: &Document) -> Option<EditClassification> {
    if old.version() == new.version() && Arc::ptr_eq(&old.shared_text(), &new.shared_text()) {
        return None;
    }
    let Some(change) = text_change(old.text(), new.text()) else {
        if let Some(tree) = trees.get(old.id(), old.version()) {
            trees.insert(new.id(), new.version(), tree);
        }
        return None;
    };

    let new_tree = if new.language().supports_syntax() {
        trees.get_or_parse(new).ok()
    } else {
        None
    };

    if let (Some(old_tree), Some(new_tree)) = (trees.get(old.id(), old.version()), &new_tree) {
        if !old_tree.has_errors() && !new_tree.has_errors() && old_tree.same_outline(new_tree) {
            let before = old_tree.member_at(change.old_range);
            let after = new_tree.member_at(change.new_range);
            if let (Some(before), Some(after)) = (before, after) {
                if before.path == after.path {
                    return Some(EditClassification {
                        reasons: InvocationReasons::member_body_changed(),
                        active_member: Some(ActiveMember {
                            path: after.path.clone(),
                            old_version: old.version(),
                            new_version: new.version(),
                        }),
                        symbol: None,
                    });
                }
            }
        }
    }

    let symbol = new_tree
        .filter(|tree| !tree.has_errors())
        .and_then(|tree| tree.symbol_at(change.new_range));
    Some(EditClassification {
        reasons: InvocationReasons::syntax_and_semantic(),
        active_member: None,
        symbol,
    })
}

/// Turn one workspace notification into work items
pub(crate) fn handle_event(cx: &SharedContext, event: WorkspaceEvent) {
    match event {
        WorkspaceEvent::Changed(change) => handle_change(cx, &change),
        WorkspaceEvent::DocumentOpened(id) => {
            enqueue_existing(cx, id, InvocationReasons::document_opened());
        }
        WorkspaceEvent::DocumentClosed(id) => {
            enqueue_existing(cx, id, InvocationReasons::document_closed());
        }
        WorkspaceEvent::ActiveDocumentChanged(id) => active_document_changed(cx, id),
        WorkspaceEvent::BufferChanged => cx.touch_all(),
        WorkspaceEvent::OptionChanged(option) => option_changed(cx, &option),
    }
}

fn handle_change(cx: &SharedContext, change: &WorkspaceChange) {
    use WorkspaceChangeKind as Kind;

    let old = &change.old_solution;
    let new = &change.new_solution;
    match change.kind {
        Kind::SolutionAdded => {
            cx.invalidate_graph();
            enqueue_solution(cx, new, false);
        }
        Kind::SolutionReloaded => {
            cx.invalidate_graph();
            cx.trees.clear();
            enqueue_solution(cx, new, true);
        }
        Kind::SolutionChanged => {
            cx.invalidate_graph();
            diff_solution(cx, old, new);
        }
        Kind::SolutionRemoved | Kind::SolutionCleared => {
            cx.invalidate_graph();
            cx.trees.clear();
            for project in old.projects() {
                enqueue_removal(cx, project, &InvocationReasons::solution_removed());
            }
        }
        Kind::ProjectAdded | Kind::ProjectChanged | Kind::ProjectReloaded | Kind::ProjectRemoved => {
            let Some(id) = change.project_id else {
                diff_solution(cx, old, new);
                return;
            };
            match (old.project(id), new.project(id)) {
                (Some(before), Some(after)) if change.kind == Kind::ProjectReloaded => {
                    for document in before.documents() {
                        cx.trees.remove_document(document.id());
                    }
                    enqueue_full_project(
                        cx,
                        after,
                        |_| InvocationReasons::document_reset(),
                        InvocationReasons::project_configuration_changed(),
                    );
                }
                (Some(before), Some(after)) => diff_project(cx, before, after),
                (None, Some(after)) => enqueue_full_project(
                    cx,
                    after,
                    |_| InvocationReasons::document_added(),
                    InvocationReasons::project_added(),
                ),
                (Some(before), None) => enqueue_removal(cx, before, &InvocationReasons::empty()),
                (None, None) => {}
            }
        }
        Kind::DocumentAdded | Kind::DocumentRemoved | Kind::DocumentChanged | Kind::DocumentReloaded => {
            let Some(id) = change.document_id else {
                return;
            };
            match (old.document(id), new.document(id)) {
                (Some(before), Some(after)) if change.kind == Kind::DocumentReloaded => {
                    cx.trees.remove_document(before.id());
                    cx.enqueue_document(document_item(after, InvocationReasons::document_reset()));
                    propagate_unresolved(cx, after);
                }
                (Some(before), Some(after)) => diff_document(cx, before, after),
                (None, Some(after)) => {
                    cx.enqueue_document(document_item(after, InvocationReasons::document_added()));
                    propagate_unresolved(cx, after);
                }
                (Some(before), None) => {
                    cx.trees.remove_document(id);
                    cx.enqueue_document(document_item(before, InvocationReasons::document_removed()));
                    propagate_unresolved(cx, before);
                }
                (None, None) => {}
            }
        }
        kind if kind.is_additional_document() || kind.is_analyzer_config_document() => {
            let reasons = if kind.is_additional_document() {
                InvocationReasons::additional_document_changed()
            } else {
                InvocationReasons::analyzer_config_changed()
            };
            let project = change
                .project_id
                .and_then(|id| new.project(id).or_else(|| old.project(id)));
            if let Some(project) = project {
                enqueue_full_project(cx, project, |_| reasons.clone(), reasons.clone());
            }
        }
        _ => {}
    }
}

fn document_item(document: &Document, reasons: InvocationReasons) -> WorkItem {
    WorkItem::document(document.id(), document.project_id(), document.language(), reasons)
}

/// Document-level work for a document of the current solution
fn enqueue_existing(cx: &SharedContext, id: DocumentId, reasons: InvocationReasons) {
    let solution = cx.workspace.current_solution();
    match solution.document(id) {
        Some(document) if document.kind() == DocumentKind::Source => {
            cx.enqueue_document(document_item(document, reasons));
        }
        _ => log::debug!("ignoring lifecycle event for unknown {id}"),
    }
}

/// Every document and project of `solution`
pub(crate) fn enqueue_solution(cx: &SharedContext, solution: &Solution, reset_open: bool) {
    for project in solution.projects() {
        enqueue_full_project(
            cx,
            project,
            |document| {
                let added = InvocationReasons::document_added();
                if reset_open && cx.workspace.is_open(document.id()) {
                    added.union(&InvocationReasons::document_reset())
                } else {
                    added
                }
            },
            InvocationReasons::project_added(),
        );
    }
}

fn enqueue_full_project(
    cx: &SharedContext,
    project: &Project,
    document_reasons: impl Fn(&Document) -> InvocationReasons,
    project_reasons: InvocationReasons,
) {
    for document in project.documents() {
        cx.enqueue_document(document_item(document, document_reasons(document)));
    }
    cx.enqueue_project(WorkItem::project(project.id(), project.language(), project_reasons));
}

/// Removal notifications for a project and all its documents
fn enqueue_removal(cx: &SharedContext, project: &Project, extra: &InvocationReasons) {
    for document in project.documents() {
        cx.trees.remove_document(document.id());
        let reasons = InvocationReasons::document_removed().union(extra);
        cx.enqueue_document(document_item(document, reasons));
    }
    let reasons = InvocationReasons::project_removed().union(extra);
    cx.enqueue_project(WorkItem::project(project.id(), project.language(), reasons));
}

fn diff_solution(cx: &SharedContext, old: &Solution, new: &Solution) {
    for project in new.projects() {
        match old.project(project.id()) {
            None => enqueue_full_project(
                cx,
                project,
                |_| InvocationReasons::document_added(),
                InvocationReasons::project_added(),
            ),
            Some(before) if !Arc::ptr_eq(before, project) => diff_project(cx, before, project),
            Some(_) => {}
        }
    }
    for project in old.projects() {
        if !new.contains_project(project.id()) {
            enqueue_removal(cx, project, &InvocationReasons::empty());
        }
    }
}

fn diff_project(cx: &SharedContext, old: &Project, new: &Project) {
    if !old.same_configuration(new) {
        log::debug!("{} configuration changed", new.name());
        enqueue_full_project(
            cx,
            new,
            |_| InvocationReasons::project_configuration_changed(),
            InvocationReasons::project_configuration_changed(),
        );
        cx.enqueue_propagation(PropagationRequest::new(new.id(), None, None));
        return;
    }

    let mut project_reasons = InvocationReasons::empty();
    for document in new.all_documents() {
        let before = old.document(document.id());
        if before.is_some_and(|before| Arc::ptr_eq(before, document)) {
            continue;
        }
        match (document.kind(), before) {
            (DocumentKind::Source, Some(before)) => diff_document(cx, before, document),
            (DocumentKind::Source, None) => {
                cx.enqueue_document(document_item(document, InvocationReasons::document_added()));
                propagate_unresolved(cx, document);
            }
            (DocumentKind::Additional, _) => {
                project_reasons.union_with(&InvocationReasons::additional_document_changed());
            }
            (DocumentKind::AnalyzerConfig, _) => {
                project_reasons.union_with(&InvocationReasons::analyzer_config_changed());
            }
        }
    }
    for document in old.all_documents() {
        if new.document(document.id()).is_some() {
            continue;
        }
        match document.kind() {
            DocumentKind::Source => {
                cx.trees.remove_document(document.id());
                cx.enqueue_document(document_item(document, InvocationReasons::document_removed()));
                propagate_unresolved(cx, document);
            }
            DocumentKind::Additional => {
                project_reasons.union_with(&InvocationReasons::additional_document_changed());
            }
            DocumentKind::AnalyzerConfig => {
                project_reasons.union_with(&InvocationReasons::analyzer_config_changed());
            }
        }
    }

    if !project_reasons.is_empty() {
        enqueue_full_project(cx, new, |_| project_reasons.clone(), project_reasons.clone());
    }
}

/// Per-file edit: member-scoped or whole-file work plus propagation
pub(crate) fn diff_document(cx: &SharedContext, old: &Document, new: &Document) {
    let Some(edit) = classify_edit(&cx.trees, old, new) else {
        return;
    };
    let member_scoped = edit.is_member_scoped();
    log::debug!(
        "{} edited ({})",
        new.path().display(),
        if member_scoped { "member body" } else { "whole file" }
    );
    let item = document_item(new, edit.reasons).with_active_member(edit.active_member);
    cx.enqueue_document(item);
    if !member_scoped {
        cx.enqueue_propagation(PropagationRequest::new(
            new.project_id(),
            Some(new.id()),
            edit.symbol,
        ));
    }
}

fn propagate_unresolved(cx: &SharedContext, document: &Document) {
    cx.enqueue_propagation(PropagationRequest::new(
        document.project_id(),
        Some(document.id()),
        None,
    ));
}

fn active_document_changed(cx: &SharedContext, id: Option<DocumentId>) {
    let Some(id) = id else {
        return;
    };
    let solution = cx.workspace.current_solution();
    let Some(document) = solution.document(id) else {
        return;
    };
    if cx.config.scope_for(document.language()) == BackgroundAnalysisScope::ActiveFile {
        // Newly in scope: analyze it now
        cx.enqueue_document(document_item(document, InvocationReasons::syntax_and_semantic()));
        return;
    }
    if !cx.wants_active_file_copy(id) {
        return;
    }
    let tracker = &cx.tracker;
    let pending = cx
        .queue(Tier::Normal)
        .with_pending(WorkItemKey::Document(id), |item| item.duplicate(tracker.begin()));
    if let Some(copy) = pending {
        cx.enqueue(Tier::ActiveFile, copy);
    }
}

fn option_changed(cx: &SharedContext, option: &OptionChange) {
    let analyzers = cx.analyzers();
    let scope = match option.language {
        Some(language) => {
            let solution = cx.workspace.current_solution();
            ReanalyzeScope::projects(
                solution
                    .projects()
                    .filter(|p| p.language() == language)
                    .map(|p| p.id()),
            )
        }
        None => ReanalyzeScope::Solution,
    };
    for entry in analyzers.iter() {
        if entry.analyzer.needs_reanalysis_on_option_changed(option) {
            log::debug!("option '{}' invalidates '{}'", option.name, entry.metadata.name);
            expand_reanalyze(cx, Some(entry.id), &scope, false);
        }
    }
}

/// Enqueue a forced reanalysis over the solution current right now
pub(crate) fn expand_reanalyze(
    cx: &SharedContext,
    analyzer: Option<AnalyzerId>,
    scope: &ReanalyzeScope,
    high_priority: bool,
) {
    let solution = cx.workspace.current_solution();
    let filter = analyzer.map_or(AnalyzerFilter::All, AnalyzerFilter::only);
    let mut documents = BTreeSet::new();
    let mut projects = BTreeSet::new();
    match scope {
        ReanalyzeScope::Solution => {
            for project in solution.projects() {
                projects.insert(project.id());
                documents.extend(project.document_ids());
            }
        }
        ReanalyzeScope::Projects(ids) => {
            for project in ids.iter().filter_map(|id| solution.project(*id)) {
                projects.insert(project.id());
                documents.extend(project.document_ids());
            }
        }
        ReanalyzeScope::Documents(ids) => documents.extend(ids.iter().copied()),
    }

    for document in documents.iter().filter_map(|id| solution.document(*id)) {
        if document.kind() != DocumentKind::Source {
            continue;
        }
        let item = document_item(document, InvocationReasons::reanalyze())
            .with_filter(filter.clone())
            .with_low_priority(!high_priority);
        cx.enqueue_document(item);
    }
    for project in projects.iter().filter_map(|id| solution.project(*id)) {
        let item = WorkItem::project(project.id(), project.language(), InvocationReasons::reanalyze())
            .with_filter(filter.clone())
            .with_low_priority(!high_priority);
        cx.enqueue_project(item);
    }
}
