use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod cmd;

#[derive(Parser)]
#[command(name = "proofloop")]
#[command(version, about = "Drive a coding agent through a verified task graph")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new proofloop project
    Init,
    /// Validate the task graph and settings
    Validate,
    /// List tasks in the graph
    List,
    /// Show the status of every task
    Status,
    /// Show which task would run next
    Next,
    /// Run the loop until every task is completed or the run stalls
    Run {
        /// Retries per task before a split is requested (overrides proofloop.toml)
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Create file stubs for a task
    Scaffold {
        /// Task id
        task: String,
    },
    /// Split a task into sub-tasks read from a file
    Split {
        /// Task id
        task: String,
        /// JSON file with the sub-tasks (same format as decomposer output)
        #[arg(long)]
        from: PathBuf,
    },
    /// Show the run log
    Log {
        /// Only entries for this task
        #[arg(long)]
        task: Option<String>,
        /// Number of most recent entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Reset all progress (ledger and run log)
    Reset {
        #[arg(long)]
        force: bool,
    },
}

/// Install the stderr subscriber and, when the project has a log directory,
/// a daily JSON file layer. The guard must live until exit.
fn init_tracing(verbose: bool, project_dir: &Path) -> Option<WorkerGuard> {
    let default_filter = if verbose {
        "proofloop=debug"
    } else {
        "proofloop=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let log_dir = proofloop::config::state_dir(project_dir).join("logs");
    let (file_layer, guard) = if log_dir.is_dir() {
        let appender = tracing_appender::rolling::daily(&log_dir, "proofloop.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().json().with_writer(writer)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let _guard = init_tracing(cli.verbose, &project_dir);

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Validate => cmd::cmd_validate(&project_dir)?,
        Commands::List => cmd::cmd_list(&project_dir)?,
        Commands::Status => cmd::cmd_status(&project_dir)?,
        Commands::Next => cmd::cmd_next(&project_dir)?,
        Commands::Run { max_attempts } => {
            cmd::cmd_run(&project_dir, cli.verbose, *max_attempts).await?
        }
        Commands::Scaffold { task } => cmd::cmd_scaffold(&project_dir, task)?,
        Commands::Split { task, from } => cmd::cmd_split(&project_dir, task, from)?,
        Commands::Log { task, limit } => cmd::cmd_log(&project_dir, task.as_deref(), *limit)?,
        Commands::Reset { force } => cmd::cmd_reset(&project_dir, *force)?,
    }

    Ok(())
}
