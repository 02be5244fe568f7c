use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use scanflow::EngagementMode;

mod cli;

#[derive(Parser)]
#[command(name = "scanflow")]
#[command(about = "Staged security reconnaissance pipeline with resumable runs")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.scanflow/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline against a target
    Run {
        /// Domain or URL to scan
        target: String,

        /// Scan profile (quick, standard, deep or one from the config)
        #[arg(short, long)]
        profile: Option<String>,

        /// Engagement mode: bugbounty, authorized or aggressive
        #[arg(short, long, value_parser = parse_mode)]
        mode: Option<EngagementMode>,

        /// Fail the run as soon as one stage fails
        #[arg(long)]
        stop_on_failure: bool,
    },

    /// Resume an interrupted run
    Resume {
        /// ID of the run to resume
        run_id: String,

        #[arg(short, long)]
        profile: Option<String>,

        #[arg(short, long, value_parser = parse_mode)]
        mode: Option<EngagementMode>,
    },

    /// Run a single tool outside the pipeline
    Tool {
        /// Tool name (e.g. httpx)
        name: String,

        /// Inputs passed to the tool
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List pipeline stages and whether their tools are installed
    Stages,

    /// List recent runs
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show the steps and findings of a run
    Steps {
        run_id: String,
    },

    /// Write a default ~/.scanflow/config.toml
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn parse_mode(s: &str) -> std::result::Result<EngagementMode, String> {
    EngagementMode::from_str(s).ok_or_else(|| {
        format!(
            "unknown engagement mode '{}' (expected bugbounty, authorized or aggressive)",
            s
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            target,
            profile,
            mode,
            stop_on_failure,
        } => {
            let options = cli::run::RunOptions {
                profile,
                mode,
                stop_on_failure,
            };
            cli::run::run_command(config_path, &target, options).await?;
        }
        Commands::Resume {
            run_id,
            profile,
            mode,
        } => {
            let options = cli::run::RunOptions {
                profile,
                mode,
                stop_on_failure: false,
            };
            cli::run::resume_command(config_path, &run_id, options).await?;
        }
        Commands::Tool {
            name,
            inputs,
            timeout,
        } => {
            cli::tool::tool_command(config_path, &name, &inputs, timeout).await?;
        }
        Commands::Stages => {
            cli::stages::stages_command(config_path).await?;
        }
        Commands::Runs { limit } => {
            cli::status::runs_command(config_path, limit).await?;
        }
        Commands::Steps { run_id } => {
            cli::status::steps_command(config_path, &run_id).await?;
        }
        Commands::Init { force } => {
            cli::init::init_command(config_path, force).await?;
        }
    }

    Ok(())
}
