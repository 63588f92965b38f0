mod support;

use crawler_coordinator::{
    CoordinatorConfig, CoordinatorServices, DocumentScope, InMemoryCompilationCache,
    InvocationReason, InvocationReasons, Tier, WorkItem,
};
use crawler_workspace::Language;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use support::{doc_id, document, project, project_id, start_recording, workspace, Call};
use tokio::time::{sleep, Instant};

#[tokio::test(start_paused = true)]
async fn syntax_item_runs_once_after_the_backoff_window() {
    let ws = workspace(vec![
        project(1, "core").with_document(document(1, 1, "src/lib.rs", "pub fn a() {}\n"))
    ]);
    let config = CoordinatorConfig {
        normal_backoff_ms: 100,
        ..CoordinatorConfig::for_tests()
    };
    let (coordinator, recorder) = start_recording(&ws, config, CoordinatorServices::default()).await;

    let enqueued_at = Instant::now();
    let item = WorkItem::document(
        doc_id(1),
        project_id(1),
        Language::Rust,
        InvocationReasons::new([InvocationReason::SyntaxChanged]),
    );
    assert!(coordinator.enqueue(Tier::Normal, item));

    sleep(Duration::from_millis(95)).await;
    assert!(recorder.calls().is_empty(), "ran inside the backoff window");

    coordinator.wait_for_quiescence().await.unwrap();
    let records = recorder.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].call, Call::Syntax(doc_id(1)));
    assert!(records[0].at.duration_since(enqueued_at) >= Duration::from_millis(100));

    coordinator.shutdown(true).await.unwrap();
}

const ENGINE: &str = "pub struct Engine {\n    speed: u32,\n}\n\nimpl Engine {\n    pub fn run(&self) -> u32 {\n        self.speed\n    }\n}\n";

#[tokio::test(start_paused = true)]
async fn edits_inside_one_window_merge_into_one_execution() {
    let ws = workspace(vec![
        project(1, "core").with_document(document(1, 1, "src/engine.rs", ENGINE))
    ]);
    let (coordinator, recorder) =
        start_recording(&ws, CoordinatorConfig::for_tests(), CoordinatorServices::default()).await;

    // Body edit, then a signature edit, back to back
    let body_edit = ENGINE.replace("self.speed\n", "self.speed + 1\n");
    ws.change_document_text(doc_id(1), body_edit.clone()).unwrap();
    let signature_edit = body_edit.replace("pub fn run(&self)", "pub fn run(&self, boost: u32)");
    ws.change_document_text(doc_id(1), signature_edit).unwrap();
    coordinator.wait_for_quiescence().await.unwrap();

    let syntax: Vec<_> = recorder
        .records()
        .into_iter()
        .filter(|r| r.call == Call::Syntax(doc_id(1)))
        .collect();
    assert_eq!(syntax.len(), 1);
    assert_eq!(
        syntax[0].reasons,
        InvocationReasons::new([
            InvocationReason::SyntaxChanged,
            InvocationReason::SemanticChanged,
            InvocationReason::MemberBodyChanged,
        ])
    );
    assert_eq!(recorder.count(&Call::Document(doc_id(1), DocumentScope::Whole)), 1);

    coordinator.shutdown(true).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn private_field_rename_stays_in_its_project() {
    let impl_file = "impl Engine {\n    pub fn stop(&self) {}\n}\n";
    let ws = workspace(vec![
        project(1, "core")
            .with_document(document(1, 1, "src/engine.rs", ENGINE))
            .with_document(document(2, 1, "src/stop.rs", impl_file))
            .with_document(document(3, 1, "src/util.rs", "pub fn helper() {}\n")),
        project(2, "app")
            .with_reference(project_id(1))
            .with_document(document(4, 2, "src/main.rs", "fn main() {}\n")),
    ]);
    let (coordinator, recorder) =
        start_recording(&ws, CoordinatorConfig::for_tests(), CoordinatorServices::default()).await;

    let renamed = ENGINE.replacen("speed: u32", "velocity: u32", 1);
    ws.change_document_text(doc_id(1), renamed).unwrap();
    coordinator.wait_for_quiescence().await.unwrap();

    assert_eq!(recorder.analyzed_documents(), BTreeSet::from([doc_id(1), doc_id(2)]));
    assert!(!recorder.analyzed_projects().contains(&project_id(2)));
    assert!(recorder.calls().iter().all(|call| !matches!(
        call,
        Call::Document(id, _) | Call::Syntax(id) if *id == doc_id(4)
    )));

    coordinator.shutdown(true).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn internal_type_change_reaches_dependents_with_access() {
    let motor = "struct Motor {}\n\npub fn build() {}\n";
    let ws = workspace(vec![
        project(1, "p")
            .with_friend("q")
            .with_document(document(1, 1, "src/motor.rs", motor)),
        project(2, "q")
            .with_reference(project_id(1))
            .with_document(document(2, 2, "src/q.rs", "pub fn q() {}\n")),
        project(3, "r")
            .with_reference(project_id(1))
            .with_document(document(3, 3, "src/r.rs", "pub fn r() {}\n")),
        project(4, "s")
            .with_reference(project_id(1))
            .with_document(document(4, 4, "src/s.rs", "pub fn s() {}\n")),
    ]);

    let compilations = Arc::new(InMemoryCompilationCache::new());
    compilations.mark_materialized(project_id(2));
    compilations.mark_materialized(project_id(4));
    let services = CoordinatorServices {
        compilation_cache: compilations,
        ..CoordinatorServices::default()
    };
    let (coordinator, recorder) = start_recording(&ws, CoordinatorConfig::for_tests(), services).await;

    ws.change_document_text(doc_id(1), motor.replace("Motor", "Motors")).unwrap();
    coordinator.wait_for_quiescence().await.unwrap();

    assert_eq!(
        recorder.analyzed_projects(),
        BTreeSet::from([project_id(1), project_id(2), project_id(3)])
    );
    let documents = recorder.analyzed_documents();
    assert!(documents.contains(&doc_id(2)));
    assert!(documents.contains(&doc_id(3)));
    assert!(!documents.contains(&doc_id(4)));

    coordinator.shutdown(true).await.unwrap();
}
