use crawler_coordinator::{AnalyzerFault, FaultSink, LogFaultSink};
use crawler_workspace::{DocumentId, ProjectId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// One document-level result of a built-in analyzer
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Finding {
    pub path: PathBuf,
    /// 1-based; absent for whole-document findings
    pub line: Option<usize>,
    pub analyzer: &'static str,
    pub message: String,
}

/// Declaration counts for one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectOutline {
    pub project: String,
    pub documents: usize,
    pub declarations: BTreeMap<&'static str, usize>,
    pub public: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub findings: Vec<Finding>,
    pub outlines: Vec<ProjectOutline>,
    pub faults: Vec<AnalyzerFault>,
}

/// Shared sink the built-in analyzers write into. Results are replaced per
/// (analyzer, document) and per project, so the store always mirrors the
/// latest pass.
#[derive(Default)]
pub struct Findings {
    documents: Mutex<HashMap<(&'static str, DocumentId), Vec<Finding>>>,
    outlines: Mutex<HashMap<ProjectId, ProjectOutline>>,
    faults: Mutex<Vec<AnalyzerFault>>,
}

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_document(&self, analyzer: &'static str, document: DocumentId, findings: Vec<Finding>) {
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        if findings.is_empty() {
            documents.remove(&(analyzer, document));
        } else {
            documents.insert((analyzer, document), findings);
        }
    }

    pub fn remove_document(&self, analyzer: &'static str, document: DocumentId) {
        self.replace_document(analyzer, document, Vec::new());
    }

    pub fn set_outline(&self, project: ProjectId, outline: ProjectOutline) {
        self.outlines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(project, outline);
    }

    pub fn remove_project(&self, project: ProjectId) {
        self.outlines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&project);
    }

    pub fn finding_count(&self) -> usize {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn snapshot(&self) -> Report {
        let mut findings: Vec<Finding> = self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flatten()
            .cloned()
            .collect();
        findings.sort();

        let mut outlines: Vec<ProjectOutline> = self
            .outlines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        outlines.sort_by(|a, b| a.project.cmp(&b.project));

        Report {
            findings,
            outlines,
            faults: self.faults.lock().unwrap_or_else(PoisonError::into_inner).clone(),
        }
    }
}

impl FaultSink for Findings {
    fn report(&self, fault: &AnalyzerFault) {
        LogFaultSink.report(fault);
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fault.clone());
    }
}

/// Plain-text rendering for terminals
pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    if report.findings.is_empty() {
        out.push_str("No findings.\n");
    }
    for finding in &report.findings {
        let location = match finding.line {
            Some(line) => format!("{}:{line}", finding.path.display()),
            None => finding.path.display().to_string(),
        };
        out.push_str(&format!("{location}: [{}] {}\n", finding.analyzer, finding.message));
    }

    if !report.outlines.is_empty() {
        out.push_str("\nProjects:\n");
    }
    for outline in &report.outlines {
        let kinds = outline
            .declarations
            .iter()
            .map(|(kind, count)| format!("{kind}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&format!(
            "  {} ({} documents, {} public): {kinds}\n",
            outline.project, outline.documents, outline.public
        ));
    }

    for fault in &report.faults {
        out.push_str(&format!(
            "\nanalyzer '{}' failed on {}: {}",
            fault.analyzer, fault.target, fault.message
        ));
    }
    if !report.faults.is_empty() {
        out.push('\n');
    }
    out
}
