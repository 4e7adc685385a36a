use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quizrunner::config::AgentConfig;
use quizrunner::mission::MissionRequest;
use quizrunner::recorder::DiskRecorder;
use quizrunner::server;
use quizrunner::workspace::Workspace;

#[derive(Parser)]
#[command(name = "quizrunner", about = "Autonomous web-challenge solving agent")]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the inbound mission endpoint.
    Serve(ServeArgs),
    /// Solve a single mission from the command line and print the report.
    Solve(SolveArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Override the configured bind address.
    #[arg(long)]
    bind: Option<String>,
}

#[derive(Args)]
struct SolveArgs {
    /// Starting challenge URL.
    #[arg(long)]
    url: String,
    /// Identity submitted with each answer.
    #[arg(long)]
    email: String,
    /// Shared secret submitted with each answer; falls back to the
    /// configured one.
    #[arg(long)]
    secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = AgentConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve(args) => {
            let mut config = config;
            if let Some(bind) = args.bind {
                config.bind_addr = bind;
            }
            server::serve(config).await
        }
        Commands::Solve(args) => solve(config, args).await,
    }
}

async fn solve(config: AgentConfig, args: SolveArgs) -> Result<()> {
    let secret = args
        .secret
        .or_else(|| config.secret.clone())
        .context("no secret given and none configured")?;

    let controller = server::build_controller(&config)?;
    let request = MissionRequest {
        email: args.email,
        secret,
        url: args.url,
    };

    let workspace = Workspace::create(config.workspace_root.join("cli"))
        .context("failed to prepare workspace")?;
    let recorder = DiskRecorder::create(&config.log_root, &request.url)
        .context("failed to prepare audit trail")?;
    info!(dir = %recorder.dir().display(), "audit trail ready");

    let report = controller.run(&request, workspace, &recorder).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}
