use crate::report::render_text;
use crate::session::Session;
use anyhow::{Context, Result};
use crawler_coordinator::ProgressEvent;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};

const EVENT_BUFFER: usize = 1024;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Coalescing window for filesystem bursts
    pub debounce: Duration,
    /// Print the full report after every analysis burst
    pub print_reports: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            print_reports: true,
        }
    }
}

/// Mirror filesystem changes under the session root until Ctrl-C
pub async fn run(mut session: Session, options: WatchOptions) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel::<notify::Result<Event>>(EVENT_BUFFER);
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = event_tx.blocking_send(res);
        },
        NotifyConfig::default().with_poll_interval(POLL_INTERVAL),
    )
    .context("Failed to create filesystem watcher")?;
    watcher
        .watch(session.root(), RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", session.root().display()))?;
    log::info!("Watching {}", session.root().display());

    let mut progress = session.progress().subscribe();
    let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
    let mut flush_at: Option<Instant> = None;
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        let deadline = flush_at.unwrap_or_else(Instant::now);
        tokio::select! {
            _ = &mut interrupted => {
                log::info!("Interrupted; shutting down");
                break;
            }
            Some(res) = event_rx.recv() => match res {
                Ok(event) if is_relevant(&event.kind) => {
                    pending.extend(event.paths);
                    flush_at = Some(Instant::now() + options.debounce);
                }
                Ok(_) => {}
                Err(err) => log::warn!("Watcher error: {err}"),
            },
            _ = sleep_until(deadline), if flush_at.is_some() => {
                flush_at = None;
                for path in std::mem::take(&mut pending) {
                    if let Err(err) = session.handle_path(&path) {
                        log::warn!("Failed to sync {}: {err:#}", path.display());
                    }
                }
            }
            event = progress.recv() => match event {
                Ok(ProgressEvent::Started) => log::info!("Analyzing..."),
                Ok(ProgressEvent::Stopped) => {
                    let report = session.report();
                    log::info!(
                        "Analysis idle: {} findings, {} faults",
                        report.findings.len(),
                        report.faults.len()
                    );
                    if options.print_reports {
                        crate::print_stdout(render_text(&report).trim_end())?;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    drop(watcher);
    session.shutdown().await
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}
