//! billbot CLI
//!
//! Runs a batch of billing tasks against the target application and writes
//! a JSON report.
//!
//! Usage from workspace root:
//!   cargo run --bin billbot -- run --profile profile.toml --tasks tasks.json
//!   cargo run --bin billbot -- check --profile profile.toml --tasks tasks.json

use anyhow::{Context, Result};
use billbot::{remote_runner, AutomationConfig, CancellationToken};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

mod report;

use report::{default_report_path, load_tasks, print_summary, BatchReport};

#[derive(Parser)]
#[command(name = "billbot")]
#[command(about = "Keyboard-driven data entry for legacy billing software")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the target application through every task
    Run(RunArgs),
    /// Validate the profile and task file without touching the desktop
    Check(InputArgs),
}

#[derive(Parser, Debug)]
struct InputArgs {
    /// TOML automation profile
    #[arg(short, long, env = "BILLBOT_PROFILE")]
    profile: PathBuf,

    /// JSON array of billing tasks, in processing order
    #[arg(short, long)]
    tasks: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Where to write the JSON report [default: data/output/report_<timestamp>.json]
    #[arg(short, long)]
    report: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let default_filter = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => run_batch(args).await,
        Commands::Check(args) => check_inputs(&args),
    }
}

fn check_inputs(args: &InputArgs) -> Result<()> {
    let config = AutomationConfig::load(&args.profile)
        .with_context(|| format!("loading profile {}", args.profile.display()))?;
    let tasks = load_tasks(&args.tasks)?;
    println!(
        "Profile OK (window '{}', {} retr{}); {} task(s) ready",
        config.automation.window_title,
        config.retries.max_retries,
        if config.retries.max_retries == 1 { "y" } else { "ies" },
        tasks.len()
    );
    Ok(())
}

async fn run_batch(args: RunArgs) -> Result<()> {
    let RunArgs { input, report } = args;
    let config = AutomationConfig::load(&input.profile)
        .with_context(|| format!("loading profile {}", input.profile.display()))?;
    let tasks = load_tasks(&input.tasks)?;
    let report_path = report.unwrap_or_else(|| default_report_path(Local::now()));
    info!(
        tasks = tasks.len(),
        window = %config.automation.window_title,
        "Starting batch"
    );

    let token = CancellationToken::new();
    let batch_token = token.clone();

    // The engine blocks on purpose; keep it off the async runtime
    let mut batch = tokio::task::spawn_blocking(move || {
        let runner = remote_runner(&config)?.with_cancellation(batch_token);
        runner.run(&tasks)
    });

    let joined = tokio::select! {
        joined = &mut batch => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!("Ctrl+C received, stopping after the current task");
            token.cancel();
            batch.await
        }
    };
    let results = joined
        .context("automation thread panicked")?
        .context("could not start the automation session")?;

    BatchReport::new(&input.profile, &results).write_to(&report_path)?;
    info!("Report written to {}", report_path.display());
    print_summary(&results);
    Ok(())
}
