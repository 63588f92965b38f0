//! # Crawler CLI
//!
//! Hosts a [`crawler_workspace::Workspace`] built from a `crawler.toml`
//! manifest and drives the background coordinator with a few built-in
//! analyzers.
//!
//! - `analyze`: scan, analyze everything once, print the report
//! - `watch`: keep the workspace in sync with the filesystem and re-analyze
//!   incrementally
//! - `graph`: print the project dependency graph

pub mod analyzers;
pub mod loader;
pub mod manifest;
pub mod report;
pub mod session;
pub mod sync;
pub mod watch;

use anyhow::Result;
use std::io::{self, Write};

pub use analyzers::{Builtin, BuiltinProvider};
pub use loader::{load_solution, FileIndex, ProjectRoot};
pub use manifest::{Manifest, ProjectEntry, MANIFEST_FILE};
pub use report::{render_text, Finding, Findings, ProjectOutline, Report};
pub use session::{analyze, graph, render_graph, GraphEntry, GraphView, Session};
pub use sync::{FileSync, SyncAction};
pub use watch::WatchOptions;

/// Write one line to stdout; a closed pipe (`crawler analyze | head`) is not an error
pub fn print_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}
