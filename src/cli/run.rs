//! Run and resume command implementations

use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use scanflow::state::RunStateManager;
use scanflow::storage::RunStore;
use scanflow::{EngagementMode, PipelineOrchestrator, RunState};

use super::{build_orchestrator, format_duration, load_config, open_store};

/// CLI settings that override config.toml values
#[derive(Debug, Default)]
pub struct RunOptions {
    pub profile: Option<String>,
    pub mode: Option<EngagementMode>,
    pub stop_on_failure: bool,
}

/// Run the pipeline against a target
pub async fn run_command(config_path: Option<&Path>, target: &str, options: RunOptions) -> Result<()> {
    let target = target.trim();
    if target.is_empty() {
        bail!("Target must not be empty");
    }

    let config = load_config(config_path)?;
    let mut pipeline = config.pipeline_config(options.profile.as_deref(), options.mode)?;
    pipeline.stop_on_failure |= options.stop_on_failure;

    println!(
        "Scanning {} with profile '{}' in {} mode ({} stages)",
        target,
        pipeline.profile,
        pipeline.engagement_mode,
        pipeline.stages.len()
    );

    let orchestrator = Arc::new(build_orchestrator(&config, pipeline)?);
    let state = execute(orchestrator, target, None).await?;
    print_summary(&state);
    Ok(())
}

/// Resume an interrupted run with its original profile and mode unless overridden
pub async fn resume_command(config_path: Option<&Path>, run_id: &str, options: RunOptions) -> Result<()> {
    let config = load_config(config_path)?;
    let run = open_store(&config)?
        .get_run(run_id)?
        .with_context(|| format!("Run not found: {}", run_id))?;

    if run.state == RunState::Completed {
        warn!("Run {} already completed; only unfinished steps will execute", run_id);
    }

    let profile = options.profile.unwrap_or_else(|| run.profile.clone());
    let mode = options.mode.unwrap_or(run.engagement_mode);
    let pipeline = config.pipeline_config(Some(&profile), Some(mode))?;

    println!(
        "Resuming run {} against {} ({}/{} steps completed)",
        run.id, run.target, run.completed_steps, run.total_steps
    );

    let orchestrator = Arc::new(build_orchestrator(&config, pipeline)?);
    let state = execute(orchestrator, &run.target, Some(run_id)).await?;
    print_summary(&state);
    Ok(())
}

/// Drive one run; Ctrl-C cancels it after the current stage
async fn execute(
    orchestrator: Arc<PipelineOrchestrator>,
    target: &str,
    resume_id: Option<&str>,
) -> Result<RunStateManager> {
    let interrupt = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, finishing the current stage before stopping");
                orchestrator.cancel();
            }
        })
    };

    let outcome = orchestrator.run_with_resume(target, resume_id).await;
    interrupt.abort();
    Ok(outcome?)
}

fn print_summary(state: &RunStateManager) {
    let run = state.metadata();
    println!();
    println!("Run {} {}", run.id, run.state);
    println!("  Target:   {}", run.target);
    println!(
        "  Steps:    {}/{} completed, {} failed",
        run.completed_steps, run.total_steps, run.failed_steps
    );
    if let Some(duration) = run.duration() {
        println!("  Duration: {}", format_duration(duration));
    }
    println!("  Findings: {}", run.total_findings);
    for (severity, count) in &run.findings_by_severity {
        println!("    {:<8} {}", severity.as_str(), count);
    }
    if let Some(err) = &run.error_message {
        println!("  Error:    {}", err);
    }
    println!("  Output:   {}", run.run_dir.display());

    if matches!(run.state, RunState::Failed | RunState::Cancelled) {
        println!();
        println!("Resume with: scanflow resume {}", run.id);
    }
}
