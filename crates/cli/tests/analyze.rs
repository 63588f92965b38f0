use crawler_cli::{analyze, Builtin, Finding, Manifest, Session, SyncAction};
use crawler_coordinator::CoordinatorConfig;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn fixture() -> (TempDir, Manifest) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "crawler.toml",
        "[[project]]\nname = \"core\"\ndir = \"core\"\n\n[[project]]\nname = \"app\"\ndir = \"app\"\nreferences = [\"core\"]\n",
    );
    write(root, "core/src/lib.rs", "pub fn a() {}\n// TODO: document a\n");
    write(root, "core/src/broken.rs", "pub fn broken( {\n");
    write(root, "core/README.md", "TODO in prose is not scanned\n");
    write(root, "app/src/main.rs", "fn main() {}\n");
    let manifest = Manifest::load(root.join("crawler.toml")).unwrap();
    (dir, manifest)
}

fn located(findings: &[Finding], analyzer: &str) -> Vec<(PathBuf, Option<usize>)> {
    findings
        .iter()
        .filter(|f| f.analyzer == analyzer)
        .map(|f| (f.path.clone(), f.line))
        .collect()
}

#[tokio::test]
async fn one_shot_analysis_reports_every_builtin() {
    let (dir, manifest) = fixture();
    let report = analyze(dir.path(), &manifest, &Builtin::ALL).await.unwrap();

    assert_eq!(
        located(&report.findings, "todo-markers"),
        vec![(PathBuf::from("core/src/lib.rs"), Some(2))]
    );
    assert_eq!(
        located(&report.findings, "syntax-errors"),
        vec![(PathBuf::from("core/src/broken.rs"), None)]
    );
    assert!(report.faults.is_empty());

    let outlines: BTreeMap<_, _> = report
        .outlines
        .iter()
        .map(|o| (o.project.as_str(), o))
        .collect();
    assert_eq!(outlines.len(), 2);
    assert_eq!(outlines["core"].documents, 2);
    assert_eq!(outlines["app"].documents, 1);
    assert_eq!(outlines["app"].declarations.get("fn"), Some(&1));
    assert_eq!(outlines["app"].public, 0);
}

#[tokio::test]
async fn selection_limits_the_builtins() {
    let (dir, manifest) = fixture();
    let report = analyze(dir.path(), &manifest, &[Builtin::TodoMarkers]).await.unwrap();

    assert!(report.findings.iter().all(|f| f.analyzer == "todo-markers"));
    assert_eq!(report.findings.len(), 1);
    assert!(report.outlines.is_empty());
}

#[tokio::test]
async fn session_follows_filesystem_changes() {
    let (dir, manifest) = fixture();
    let mut session = Session::start(
        dir.path(),
        &manifest,
        &Builtin::ALL,
        CoordinatorConfig::for_tests(),
        true,
    )
    .unwrap();
    session.settle().await.unwrap();
    assert_eq!(located(&session.report().findings, "todo-markers").len(), 1);

    let root = session.root().to_path_buf();

    // Resolve the marker
    let lib = root.join("core/src/lib.rs");
    fs::write(&lib, "pub fn a() {}\n// documented\n").unwrap();
    let action = session.handle_path(&lib).unwrap();
    assert!(matches!(action, Some(SyncAction::Changed(_))));
    assert_eq!(session.workspace().active_document(), action.and_then(|a| match a {
        SyncAction::Changed(id) => Some(id),
        _ => None,
    }));
    session.settle().await.unwrap();
    assert!(located(&session.report().findings, "todo-markers").is_empty());

    // Unchanged content is not an edit
    assert_eq!(session.handle_path(&lib).unwrap(), None);

    // New file with a marker
    let extra = root.join("core/src/extra.rs");
    fs::write(&extra, "// FIXME: wire up\npub fn extra() {}\n").unwrap();
    assert!(matches!(session.handle_path(&extra).unwrap(), Some(SyncAction::Added(_))));
    session.settle().await.unwrap();
    assert_eq!(
        located(&session.report().findings, "todo-markers"),
        vec![(PathBuf::from("core/src/extra.rs"), Some(1))]
    );

    // Deleting the broken file clears its finding
    let broken = root.join("core/src/broken.rs");
    fs::remove_file(&broken).unwrap();
    assert!(matches!(session.handle_path(&broken).unwrap(), Some(SyncAction::Removed(ids)) if ids.len() == 1));
    session.settle().await.unwrap();
    assert!(located(&session.report().findings, "syntax-errors").is_empty());

    session.shutdown().await.unwrap();
}
