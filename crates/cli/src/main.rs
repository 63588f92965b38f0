use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crawler_cli::{
    print_stdout, render_graph, render_text, Builtin, Manifest, Session, WatchOptions, MANIFEST_FILE,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "crawler")]
#[command(about = "Incremental background analysis for multi-project workspaces", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Workspace manifest
    #[arg(short, long, global = true, default_value = MANIFEST_FILE)]
    manifest: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every project once and print the findings
    Analyze {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        selection: AnalyzerSelection,
    },

    /// Keep analyzing as files change
    Watch {
        /// Coalescing window for filesystem bursts (ms)
        #[arg(long, default_value_t = 200)]
        debounce_ms: u64,

        /// Only log summaries; do not print the report after each burst
        #[arg(long)]
        no_report: bool,

        #[command(flatten)]
        selection: AnalyzerSelection,
    },

    /// Print the project dependency graph
    Graph {
        /// Emit the graph as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct AnalyzerSelection {
    /// Built-in analyzer to run; repeatable (default: all)
    #[arg(long = "analyzer", value_name = "NAME")]
    analyzers: Vec<String>,
}

impl AnalyzerSelection {
    fn resolve(&self) -> Result<Vec<Builtin>> {
        if self.analyzers.is_empty() {
            return Ok(Builtin::ALL.to_vec());
        }
        self.analyzers.iter().map(|name| Builtin::from_name(name)).collect()
    }
}

fn manifest_root(manifest: &Path) -> PathBuf {
    match manifest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let manifest = Manifest::load(&cli.manifest)?;
    let root = manifest_root(&cli.manifest);

    match cli.command {
        Commands::Analyze { json, selection } => {
            let builtins = selection.resolve()?;
            let report = crawler_cli::analyze(&root, &manifest, &builtins).await?;
            let output = if json {
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?
            } else {
                render_text(&report).trim_end().to_string()
            };
            print_stdout(&output)?;
        }
        Commands::Watch {
            debounce_ms,
            no_report,
            selection,
        } => {
            let builtins = selection.resolve()?;
            let config = manifest.coordinator_config()?;
            let session = Session::start(&root, &manifest, &builtins, config, true)?;
            let options = WatchOptions {
                debounce: Duration::from_millis(debounce_ms),
                print_reports: !no_report,
            };
            crawler_cli::watch::run(session, options).await?;
        }
        Commands::Graph { json } => {
            let view = crawler_cli::graph(&root, &manifest)?;
            let output = if json {
                serde_json::to_string_pretty(&view).context("Failed to serialize graph")?
            } else {
                render_graph(&view).trim_end().to_string()
            };
            print_stdout(&output)?;
        }
    }

    Ok(())
}
