//! lockgraph CLI - inspect, validate and resolve lock documents

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lockgraph::{Settings, PROJECT_FILE};
use std::path::{Path, PathBuf};

mod check;
mod context;
mod inspect;
mod logging;
mod resolve;

#[derive(Parser)]
#[command(name = "lockgraph")]
#[command(version)]
#[command(about = "Inspect, validate and resolve lock documents", long_about = None)]
struct Cli {
    /// Settings file (defaults to lockgraph.toml next to the project or lock document)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a lock document
    Inspect {
        /// Path to the lock document
        lock: PathBuf,
    },

    /// Check whether a lock document still matches its project
    Check {
        /// Path to the project declaration
        #[arg(long, default_value = PROJECT_FILE)]
        project: PathBuf,

        /// Lock document (defaults to the one in the project directory)
        #[arg(long)]
        lock: Option<PathBuf>,
    },

    /// Resolve a project's libraries for one target
    Resolve {
        /// Path to the project declaration
        #[arg(long, default_value = PROJECT_FILE)]
        project: PathBuf,

        /// Target framework, e.g. "net452"
        #[arg(short, long)]
        framework: String,

        /// Runtime identifier, e.g. "win7-x64"
        #[arg(short, long)]
        runtime: Option<String>,
    },

    /// Load a dependency context from a lock document and write it back
    Context {
        /// Path to the lock document
        lock: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep compilation options and the compile-time target
        #[arg(long)]
        preserve_compilation_context: bool,
    },

    /// Resolve a project and write its dependency context
    Export {
        /// Path to the project declaration
        #[arg(long, default_value = PROJECT_FILE)]
        project: PathBuf,

        /// Target framework, e.g. "net452"
        #[arg(short, long)]
        framework: String,

        /// Runtime identifier, e.g. "win7-x64"
        #[arg(short, long)]
        runtime: Option<String>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Keep compilation options and the compile-time target
        #[arg(long)]
        preserve_compilation_context: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Inspect { lock } => {
            let settings = load_settings(config, parent_dir(&lock))?;
            let summary = inspect::inspect(&lock, &settings.retry.policy())?;
            print!("{summary}");
        }

        Commands::Check { project, lock } => {
            let options = check::CheckOptions { project, lock };
            let outcome = check::check(&options, config)?;
            match outcome.staleness {
                None => println!("{} is up to date", outcome.lock.display()),
                Some(staleness) => bail!("{} is stale: {staleness}", outcome.lock.display()),
            }
        }

        Commands::Resolve {
            project,
            framework,
            runtime,
        } => {
            let options = resolve::ResolveOptions {
                project,
                framework,
                runtime,
            };
            let context = resolve::resolve(&options, config)?;
            print!("{}", resolve::describe(&context));
        }

        Commands::Context {
            lock,
            output,
            preserve_compilation_context,
        } => {
            let settings = load_settings(config, parent_dir(&lock))?;
            let options = context::ContextOptions {
                lock,
                output,
                preserve_compilation_context,
            };
            context::rewrite(&options, &settings.retry.policy())?;
        }

        Commands::Export {
            project,
            framework,
            runtime,
            output,
            preserve_compilation_context,
        } => {
            let options = resolve::ExportOptions {
                resolve: resolve::ResolveOptions {
                    project,
                    framework,
                    runtime,
                },
                output,
                preserve_compilation_context,
            };
            let context = resolve::export(&options, config)?;
            println!(
                "Wrote {} libraries to {}",
                context.runtime_libraries.len(),
                options.output.display()
            );
        }
    }

    Ok(())
}

/// Settings from `--config`, or from `lockgraph.toml` in `dir` when present.
pub(crate) fn load_settings(config: Option<&Path>, dir: &Path) -> Result<Settings> {
    match config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from '{}'", path.display())),
        None => Settings::discover(dir).context("failed to load settings"),
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}
