//! Single tool command implementation

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use super::{build_orchestrator, format_duration, load_config};

/// Run one tool on the given inputs and print what it produced
pub async fn tool_command(
    config_path: Option<&Path>,
    name: &str,
    inputs: &[String],
    timeout: Option<u64>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = config.pipeline_config(None, None)?;
    let orchestrator = build_orchestrator(&config, pipeline)?;

    let adapter = orchestrator.registry().get(name);
    let result = orchestrator
        .run_single_tool(name, inputs, timeout.map(Duration::from_secs))
        .await?;

    let (items, findings) = match adapter {
        Some(adapter) => (
            adapter.extract_items(&result.stdout),
            adapter.parse_output(&result.stdout),
        ),
        None => (Vec::new(), Vec::new()),
    };

    for item in &items {
        println!("{}", item);
    }
    for finding in &findings {
        println!(
            "[{}] {} {}",
            finding.severity.as_str(),
            finding.title.as_deref().unwrap_or(&finding.finding_type),
            finding.url
        );
    }

    eprintln!(
        "{} exited with code {} after {} ({} item(s), {} finding(s))",
        result.tool,
        result.exit_code,
        format_duration(result.duration),
        items.len(),
        findings.len()
    );
    if !result.success() {
        let stderr = result.stderr.trim();
        if !stderr.is_empty() {
            eprintln!("{}", stderr);
        }
    }

    Ok(())
}
