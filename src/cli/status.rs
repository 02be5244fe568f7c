//! Runs and steps command implementations

use anyhow::{Context, Result};
use std::path::Path;

use chrono::{Local, TimeZone};
use scanflow::storage::RunStore;

use super::{format_duration, load_config, open_store};

fn format_timestamp(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// List the most recent runs
pub async fn runs_command(config_path: Option<&Path>, limit: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let runs = store.list_runs(limit)?;

    if runs.is_empty() {
        println!("No runs found.");
        return Ok(());
    }

    println!("Runs ({}):\n", runs.len());

    for run in runs {
        println!(
            "  {} [{}] {} ({} / {}) {:.0}%",
            run.id,
            run.state,
            run.target,
            run.profile,
            run.engagement_mode,
            run.progress_percentage()
        );
        println!(
            "    Created {}, {} finding(s)",
            format_timestamp(run.created_at),
            run.total_findings
        );
        if let Some(err) = &run.error_message {
            println!("    Error: {}", err);
        }
        println!();
    }

    Ok(())
}

/// Show the step trail and findings of one run
pub async fn steps_command(config_path: Option<&Path>, run_id: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let run = store
        .get_run(run_id)?
        .with_context(|| format!("Run not found: {}", run_id))?;
    let steps = store.get_steps(run_id)?;

    println!("Run {} [{}] {}", run.id, run.state, run.target);
    if let Some(duration) = run.duration() {
        println!("Duration: {}", format_duration(duration));
    }
    println!("\nSteps ({}):\n", steps.len());

    for step in &steps {
        let duration = step
            .duration_ms
            .map(|ms| format_duration(std::time::Duration::from_millis(ms)))
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<20} [{}] {}", step.name, step.status, duration);

        if step.findings_count > 0 {
            println!("    Findings: {}", step.findings_count);
        }
        if let Some(path) = &step.output_path {
            println!("    Output: {}", path.display());
        }
        if let Some(err) = &step.error_message {
            println!("    Note: {}", err);
        }
    }

    let findings = store.get_findings(run_id)?;
    if !findings.is_empty() {
        println!("\nFindings ({}):\n", findings.len());
        for finding in &findings {
            println!(
                "  [{}] {} {} ({})",
                finding.severity.as_str(),
                finding.title.as_deref().unwrap_or(&finding.finding_type),
                finding.url,
                finding.tool
            );
        }
    }

    Ok(())
}
