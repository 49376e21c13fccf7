//! `depot`: run walks, propagation and artifact changes against the
//! configured repositories.

use clap::{Parser, Subcommand};
use depot_engine::{Engine, JobStatus, PropagationReport, RepositoryId};
use miette::{IntoDiagnostic, Result, miette};
use std::fmt::Debug;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "depot", version, about)]
struct Cli {
    /// More logging. Repeat for more (-v, -vv, -vvv). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log as JSON lines instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file. Defaults to `depot.toml` in the user config
    /// directory.
    #[arg(short, long, global = true, env = "DEPOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an operation over every artifact location of a repository.
    Walk {
        /// Repository as `storage:repository`.
        #[arg(value_parser = parse_repository)]
        repository: RepositoryId,
        /// Directory to start from, relative to the repository root. Defaults
        /// to the root.
        #[arg(long)]
        start: Option<PathBuf>,
        /// One of the registered walk operations.
        #[arg(short, long, default_value = "metadata")]
        operation: String,
        /// Redo work even when its output already exists.
        #[arg(long)]
        force: bool,
    },
    /// Regenerate metadata at a path and update every group containing it.
    Propagate {
        #[arg(value_parser = parse_repository)]
        repository: RepositoryId,
        path: PathBuf,
    },
    /// Store a local file as an artifact.
    Store {
        #[arg(value_parser = parse_repository)]
        repository: RepositoryId,
        path: PathBuf,
        file: PathBuf,
    },
    /// Delete an artifact file or a version directory.
    Delete {
        #[arg(value_parser = parse_repository)]
        repository: RepositoryId,
        path: PathBuf,
    },
    /// Show group membership, ancestors and cycles.
    Graph,
    /// List registered layouts and walk operations.
    Layouts,
}

fn parse_repository(value: &str) -> std::result::Result<RepositoryId, String> {
    value.parse().map_err(|err: depot_engine::error::Error| err.to_string())
}

/// `exn` errors render their whole tree with `Debug`.
fn diagnose(err: impl Debug) -> miette::Report {
    miette!("{err:?}")
}

fn init_tracing(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

/// Cancel every running job on Ctrl-C. Cancelled runs stop at their next
/// checkpoint and report what they finished.
fn cancel_on_interrupt(engine: &Arc<Engine>) {
    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("interrupted, cancelling running jobs");
        for job in engine.jobs().list() {
            if job.status == JobStatus::Running {
                engine.cancel(job.id);
            }
        }
    });
}

fn print_propagation(report: &PropagationReport) {
    println!("{} {}", report.origin, report.scope.base.display());
    for group in &report.updated {
        println!("  updated {group}");
    }
    for failure in &report.failed {
        println!("  failed  {}: {}", failure.repository, failure.error);
    }
    for cycle in &report.cycles {
        let cycle: Vec<String> = cycle.iter().map(ToString::to_string).collect();
        println!("  cycle   {}", cycle.join(" -> "));
    }
    if report.cancelled {
        println!("  cancelled before every group was updated");
    }
}

fn print_graph(engine: &Engine) {
    let graph = engine.catalog().graph();
    for repository in engine.catalog().repositories() {
        let id = repository.id();
        println!("{id} ({}, {})", repository.kind(), repository.layout().alias());
        for member in graph.members(id) {
            println!("  member   {member}");
        }
        for ancestor in graph.ancestors(id) {
            println!("  included {ancestor}");
        }
    }
    for cycle in graph.cycles() {
        let cycle: Vec<String> = cycle.iter().map(ToString::to_string).collect();
        println!("cycle: {}", cycle.join(", "));
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let config = depot_config::load(cli.config.as_deref()).map_err(diagnose)?;
    let engine = Arc::new(Engine::from_config(&config).map_err(diagnose)?);
    cancel_on_interrupt(&engine);

    match cli.command {
        Commands::Walk {
            repository,
            start,
            operation,
            force,
        } => {
            let start = start.unwrap_or_default();
            let report = engine.walk(&repository, &start, &operation, force).await.map_err(diagnose)?;
            println!(
                "{repository}: {} directories, {} locations, {} skipped, {} failed",
                report.directories,
                report.locations,
                report.skipped,
                report.failures.len()
            );
            for failure in &report.failures {
                println!("  {failure}");
            }
            Ok(report.is_success())
        },
        Commands::Propagate { repository, path } => {
            let path = engine.path(&repository, &path).map_err(diagnose)?;
            let report = engine.propagate(&path).await.map_err(diagnose)?;
            print_propagation(&report);
            Ok(report.is_success())
        },
        Commands::Store {
            repository,
            path,
            file,
        } => {
            let data = tokio::fs::read(&file).await.into_diagnostic()?;
            let path = engine.path(&repository, &path).map_err(diagnose)?;
            let report = engine.store_artifact(&path, &data).await.map_err(diagnose)?;
            print_propagation(&report);
            Ok(report.is_success())
        },
        Commands::Delete { repository, path } => {
            let path = engine.path(&repository, &path).map_err(diagnose)?;
            let report = engine.delete(&path).await.map_err(diagnose)?;
            print_propagation(&report);
            Ok(report.is_success())
        },
        Commands::Graph => {
            print_graph(&engine);
            Ok(true)
        },
        Commands::Layouts => {
            for alias in engine.layouts().aliases() {
                println!("layout    {alias}");
            }
            for name in engine.operations().names() {
                println!("operation {name}");
            }
            Ok(true)
        },
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);
    Ok(match run(cli).await? {
        true => ExitCode::SUCCESS,
        false => ExitCode::FAILURE,
    })
}
