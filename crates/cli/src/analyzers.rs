//! Built-in analyzers shipped with the `crawler` binary

use crate::report::{Finding, Findings, ProjectOutline};
use anyhow::bail;
use async_trait::async_trait;
use crawler_coordinator::{
    AnalysisContext, AnalysisResult, AnalyzerCapabilities, AnalyzerMetadata, AnalyzerProvider,
    AnalyzerRegistry, DocumentScope, IncrementalAnalyzer,
};
use crawler_syntax::{Accessibility, LanguageExt, SyntaxTree, TreeCache};
use crawler_workspace::{Document, DocumentId, Project, ProjectId, Workspace};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SYNTAX_ERRORS: &str = "syntax-errors";
pub const TODO_MARKERS: &str = "todo-markers";
pub const PROJECT_OUTLINE: &str = "project-outline";

const MARKERS: &[&str] = &["TODO", "FIXME"];
const OUTLINE_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    SyntaxErrors,
    TodoMarkers,
    ProjectOutline,
}

impl Builtin {
    pub const ALL: [Builtin; 3] = [
        Builtin::SyntaxErrors,
        Builtin::TodoMarkers,
        Builtin::ProjectOutline,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Builtin::SyntaxErrors => SYNTAX_ERRORS,
            Builtin::TodoMarkers => TODO_MARKERS,
            Builtin::ProjectOutline => PROJECT_OUTLINE,
        }
    }

    pub fn from_name(name: &str) -> anyhow::Result<Self> {
        match Self::ALL.into_iter().find(|b| b.name() == name) {
            Some(builtin) => Ok(builtin),
            None => bail!(
                "unknown analyzer '{name}' (expected one of: {SYNTAX_ERRORS}, {TODO_MARKERS}, {PROJECT_OUTLINE})"
            ),
        }
    }
}

/// Creates one built-in analyzer per workspace, all writing into `findings`
pub struct BuiltinProvider {
    builtin: Builtin,
    findings: Arc<Findings>,
}

impl BuiltinProvider {
    pub fn new(builtin: Builtin, findings: Arc<Findings>) -> Self {
        Self { builtin, findings }
    }
}

impl AnalyzerProvider for BuiltinProvider {
    fn metadata(&self) -> AnalyzerMetadata {
        let metadata = AnalyzerMetadata::new(self.builtin.name());
        match self.builtin {
            Builtin::SyntaxErrors => metadata.high_priority(),
            _ => metadata,
        }
    }

    fn create(&self, _workspace: &Arc<Workspace>) -> Arc<dyn IncrementalAnalyzer> {
        let findings = Arc::clone(&self.findings);
        match self.builtin {
            Builtin::SyntaxErrors => Arc::new(SyntaxErrors { findings }),
            Builtin::TodoMarkers => Arc::new(TodoMarkers { findings }),
            Builtin::ProjectOutline => Arc::new(OutlineAnalyzer {
                findings,
                trees: TreeCache::new(OUTLINE_CACHE_CAPACITY),
            }),
        }
    }
}

/// Registry holding the selected built-ins
pub fn registry(builtins: &[Builtin], findings: &Arc<Findings>) -> AnalyzerRegistry {
    builtins.iter().fold(AnalyzerRegistry::new(), |registry, builtin| {
        registry.with_provider(Arc::new(BuiltinProvider::new(*builtin, Arc::clone(findings))))
    })
}

/// Reports documents tree-sitter could only parse with error recovery
struct SyntaxErrors {
    findings: Arc<Findings>,
}

#[async_trait]
impl IncrementalAnalyzer for SyntaxErrors {
    fn capabilities(&self) -> AnalyzerCapabilities {
        AnalyzerCapabilities::none().with_syntax()
    }

    async fn analyze_syntax(&self, cx: &AnalysisContext<'_>, document: &Document) -> AnalysisResult {
        if !document.language().supports_syntax() {
            return Ok(());
        }
        cx.check_cancelled()?;
        let tree = SyntaxTree::parse(document.language(), document.text())
            .map_err(anyhow::Error::from)?;
        let findings = if tree.has_errors() {
            vec![Finding {
                path: document.path().to_path_buf(),
                line: None,
                analyzer: SYNTAX_ERRORS,
                message: format!("{} source does not parse cleanly", document.language()),
            }]
        } else {
            Vec::new()
        };
        self.findings.replace_document(SYNTAX_ERRORS, document.id(), findings);
        Ok(())
    }

    async fn remove_document(&self, document: DocumentId) -> AnalysisResult {
        self.findings.remove_document(SYNTAX_ERRORS, document);
        Ok(())
    }
}

/// Collects `TODO` / `FIXME` comments
struct TodoMarkers {
    findings: Arc<Findings>,
}

#[async_trait]
impl IncrementalAnalyzer for TodoMarkers {
    fn capabilities(&self) -> AnalyzerCapabilities {
        AnalyzerCapabilities::none().with_document()
    }

    async fn analyze_document(
        &self,
        cx: &AnalysisContext<'_>,
        document: &Document,
        scope: &DocumentScope,
    ) -> AnalysisResult {
        cx.check_cancelled()?;
        // Line numbers after the edit may have shifted, so a member pass rescans too
        if let DocumentScope::Member(path) = scope {
            log::trace!(
                "{TODO_MARKERS}: rescanning {} after an edit in {:?}",
                document.path().display(),
                path.leaf_name()
            );
        }
        let findings = scan_markers(document.text())
            .into_iter()
            .map(|(line, message)| Finding {
                path: document.path().to_path_buf(),
                line: Some(line),
                analyzer: TODO_MARKERS,
                message,
            })
            .collect();
        self.findings.replace_document(TODO_MARKERS, document.id(), findings);
        Ok(())
    }

    async fn remove_document(&self, document: DocumentId) -> AnalysisResult {
        self.findings.remove_document(TODO_MARKERS, document);
        Ok(())
    }
}

/// `(1-based line, text from the marker on)` for every marker occurrence
pub fn scan_markers(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let hit = MARKERS
            .iter()
            .filter_map(|marker| find_word(line, marker))
            .min();
        if let Some(start) = hit {
            out.push((idx + 1, line[start..].trim_end().to_string()));
        }
    }
    out
}

fn find_word(line: &str, word: &str) -> Option<usize> {
    line.match_indices(word).map(|(i, _)| i).find(|&i| {
        let before = line[..i].chars().next_back();
        let after = line[i + word.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric() || c == '_')
            && !after.is_some_and(|c| c.is_alphanumeric() || c == '_')
    })
}

/// Declaration counts per project
struct OutlineAnalyzer {
    findings: Arc<Findings>,
    trees: TreeCache,
}

#[async_trait]
impl IncrementalAnalyzer for OutlineAnalyzer {
    fn capabilities(&self) -> AnalyzerCapabilities {
        AnalyzerCapabilities::none().with_project()
    }

    async fn analyze_project(
        &self,
        cx: &AnalysisContext<'_>,
        project: &Project,
        _semantics_changed: bool,
    ) -> AnalysisResult {
        let mut outline = ProjectOutline {
            project: project.name().to_string(),
            documents: 0,
            declarations: BTreeMap::new(),
            public: 0,
        };
        for document in project.documents() {
            cx.check_cancelled()?;
            outline.documents += 1;
            if !document.language().supports_syntax() {
                continue;
            }
            let tree = match self.trees.get_or_parse(document) {
                Ok(tree) => tree,
                Err(err) => {
                    log::debug!("{PROJECT_OUTLINE}: skipping {}: {err}", document.path().display());
                    continue;
                }
            };
            for declaration in tree.declarations() {
                *outline.declarations.entry(declaration.kind.as_str()).or_default() += 1;
                if declaration.accessibility == Accessibility::Public {
                    outline.public += 1;
                }
            }
        }
        self.findings.set_outline(project.id(), outline);
        Ok(())
    }

    async fn remove_document(&self, document: DocumentId) -> AnalysisResult {
        self.trees.remove_document(document);
        Ok(())
    }

    async fn remove_project(&self, project: ProjectId) -> AnalysisResult {
        self.findings.remove_project(project);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn markers_need_word_boundaries() {
        let text = "fn a() {}\n// TODO: split this\nlet todos = 1; // TODOS\n/* FIXME */\n";
        assert_eq!(
            scan_markers(text),
            vec![
                (2, "TODO: split this".to_string()),
                (4, "FIXME */".to_string()),
            ]
        );
    }

    #[test]
    fn builtin_names_round_trip() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()).unwrap(), builtin);
        }
        assert!(Builtin::from_name("spellcheck").is_err());
    }

    #[test]
    fn only_syntax_errors_is_high_priority() {
        let findings = Arc::new(Findings::new());
        let high: Vec<_> = Builtin::ALL
            .into_iter()
            .filter(|b| {
                BuiltinProvider::new(*b, Arc::clone(&findings))
                    .metadata()
                    .high_priority_for_active_file
            })
            .collect();
        assert_eq!(high, vec![Builtin::SyntaxErrors]);
    }
}
