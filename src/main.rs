//! ValenCloud entry point.
//!
//! `serve` (the default) runs the HTTP service. `pipeline` tests and builds
//! one commit and refuses to start if registry credentials are in its
//! environment. `publish` resumes a run that stopped at PUBLISHING; it is
//! the only command that reads the credentials. Both exit non-zero on any
//! stage failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use valencloud::config::{AppConfig, DEFAULT_CONFIG_PATH};
use valencloud::http::start_server;
use valencloud::logging;
use valencloud::pipeline::credentials::ensure_absent;
use valencloud::pipeline::{PipelineGate, PipelineRun, ProcessRunner, Trigger, TriggerKind};
use valencloud::routes::create_router;

/// ValenCloud: greeting service and its delivery pipeline
#[derive(Parser, Debug)]
#[command(name = "valencloud", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "valencloud=debug,tower_http=info")
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve,
    /// Test and build one commit; a release build is left awaiting publish
    Pipeline(PipelineArgs),
    /// Publish a run record left at PUBLISHING by `pipeline`
    Publish(PublishArgs),
}

#[derive(clap::Args, Debug)]
struct PipelineArgs {
    /// Triggering branch (accepts refs/heads/<name>)
    #[arg(long, env = "GITHUB_REF_NAME")]
    branch: String,

    /// Commit identifier; becomes the immutable image tag
    #[arg(long, env = "GITHUB_SHA")]
    sha: String,

    /// Kind of triggering event
    #[arg(long, value_enum, env = "GITHUB_EVENT_NAME", default_value = "push")]
    event: EventArg,

    /// Write the run record as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct PublishArgs {
    /// Run record written by `pipeline --report`
    #[arg(long)]
    run: PathBuf,

    /// Write the updated run record to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EventArg {
    Push,
    #[value(name = "pull_request")]
    PullRequest,
}

impl From<EventArg> for TriggerKind {
    fn from(event: EventArg) -> Self {
        match event {
            EventArg::Push => TriggerKind::Push,
            EventArg::PullRequest => TriggerKind::PullRequest,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;

    let log_filter = logging::resolve_filter(args.log_level, std::env::var("RUST_LOG").ok());
    logging::init(&log_filter, &config.logging);

    tracing::info!(path = %args.config, "Loaded configuration");

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            start_server(create_router(), &config.http).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Pipeline(pipeline) => run_pipeline(config, pipeline).await,
        Command::Publish(publish) => run_publish(config, publish).await,
    }
}

async fn run_pipeline(
    config: AppConfig,
    args: PipelineArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    ensure_absent(&config.pipeline.credentials, |name| std::env::var(name).ok())?;

    let trigger = Trigger::new(args.event.into(), args.branch, args.sha)?;
    let gate = PipelineGate::new(config.pipeline, Arc::new(ProcessRunner))?;

    let run = gate.run(trigger).await?;
    summarize(&run, args.report.as_ref())?;

    if run.state.is_failure() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn run_publish(
    config: AppConfig,
    args: PublishArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let run = PipelineRun::from_json(&std::fs::read_to_string(&args.run)?)?;
    let gate = PipelineGate::new(config.pipeline, Arc::new(ProcessRunner))?;

    let run = gate.publish(run, |name| std::env::var(name).ok()).await?;
    summarize(&run, args.report.as_ref())?;

    if run.succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn summarize(
    run: &PipelineRun,
    report: Option<&PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = report {
        std::fs::write(path, run.to_json()?)?;
        tracing::info!(path = %path.display(), "Wrote run report");
    }

    for stage in &run.stages {
        tracing::info!(
            stage = %stage.stage,
            outcome = ?stage.outcome,
            detail = stage.detail.as_deref().unwrap_or(""),
            "Stage summary"
        );
    }
    tracing::info!(run_id = %run.id, state = %run.state, "Run state");
    Ok(())
}
