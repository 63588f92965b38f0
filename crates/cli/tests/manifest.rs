use crawler_cli::{graph, load_solution, Manifest};
use crawler_workspace::DocumentKind;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "crawler.toml",
        r#"
[[project]]
name = "core"
dir = "core"
friends = ["app"]

[[project]]
name = "app"
dir = "app"
references = ["core"]

[[project]]
name = "plugin"
dir = "core/plugin"
references = ["core"]
"#,
    );
    write(root, "core/src/lib.rs", "pub fn a() {}\n");
    write(root, "core/README.md", "# core\n");
    write(root, "core/.editorconfig", "root = true\n");
    write(root, "core/logo.png", "not really a png");
    write(root, "core/.cache/stale.rs", "pub fn stale() {}\n");
    write(root, "core/plugin/src/lib.rs", "pub fn plug() {}\n");
    write(root, "app/src/main.rs", "fn main() {}\n");
    dir
}

fn kinds_of(solution: &crawler_workspace::Solution, project: &str) -> Vec<(PathBuf, DocumentKind)> {
    let project = solution.projects().find(|p| p.name() == project).unwrap();
    let mut docs: Vec<_> = project
        .all_documents()
        .map(|d| (d.path().to_path_buf(), d.kind()))
        .collect();
    docs.sort_by(|a, b| a.0.cmp(&b.0));
    docs
}

#[test]
fn loads_projects_and_classifies_documents() {
    let dir = fixture();
    let manifest = Manifest::load(dir.path().join("crawler.toml")).unwrap();
    let (solution, index) = load_solution(&manifest, dir.path()).unwrap();

    assert_eq!(solution.projects().count(), 3);
    assert_eq!(
        kinds_of(&solution, "core"),
        vec![
            (PathBuf::from("core/.editorconfig"), DocumentKind::AnalyzerConfig),
            (PathBuf::from("core/README.md"), DocumentKind::Additional),
            (PathBuf::from("core/src/lib.rs"), DocumentKind::Source),
        ]
    );
    assert_eq!(
        kinds_of(&solution, "plugin"),
        vec![(PathBuf::from("core/plugin/src/lib.rs"), DocumentKind::Source)]
    );
    assert_eq!(index.document_count(), 5);
}

#[test]
fn references_and_friends_follow_the_manifest() {
    let dir = fixture();
    let manifest = Manifest::load(dir.path().join("crawler.toml")).unwrap();
    let (solution, index) = load_solution(&manifest, dir.path()).unwrap();

    let core = index.project_named("core").unwrap().id;
    let app = solution.projects().find(|p| p.name() == "app").unwrap();
    assert_eq!(app.references(), &[core]);
    let core = solution.project(core).unwrap();
    assert!(core.grants_internals_to(app));
}

#[test]
fn graph_lists_dependents_by_name() {
    let dir = fixture();
    let manifest = Manifest::load(dir.path().join("crawler.toml")).unwrap();
    let view = graph(dir.path(), &manifest).unwrap();

    assert_eq!(view.build_order.first().map(String::as_str), Some("core"));
    let core = view.projects.iter().find(|p| p.name == "core").unwrap();
    assert_eq!(core.direct_dependents, vec!["app".to_string(), "plugin".to_string()]);
    assert!(core.references.is_empty());
    let app = view.projects.iter().find(|p| p.name == "app").unwrap();
    assert_eq!(app.references, vec!["core".to_string()]);
}

#[test]
fn missing_project_directory_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "crawler.toml", "[[project]]\nname = \"ghost\"\ndir = \"ghost\"\n");
    let manifest = Manifest::load(dir.path().join("crawler.toml")).unwrap();
    assert!(load_solution(&manifest, dir.path()).is_err());
    assert!(Manifest::load(dir.path().join("missing.toml")).is_err());
}
