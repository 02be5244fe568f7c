//! Stage execution: tool fan-out and in-process classification

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{debug, info, warn};

use super::{PipelineOrchestrator, TOOL_WAIT_GRACE};
use crate::audit::AuditEventType;
use crate::domain::{Finding, OutputFormat, PipelineStage, StageResult, StepStatus, ToolResult};
use crate::error::Result;
use crate::scheduler::{TaskPriority, TaskScheduler, TaskStatus};
use crate::state::RunStateManager;
use crate::tools::ToolKind;

/// Combined output of a tool stage, one item per line
const COMBINED_OUTPUT: &str = "combined_output.txt";

/// Classification records of the URL classification stage
const CLASSIFIED_URLS: &str = "classified_urls.jsonl";

/// What one tool task hands back to the control loop
#[derive(Debug, Clone)]
pub(crate) struct ToolRun {
    pub result: ToolResult,
    pub items: Vec<String>,
    pub findings: Vec<Finding>,
}

impl ToolRun {
    /// Usable when the tool exited cleanly or still produced something
    fn succeeded(&self) -> bool {
        self.result.success() || !self.items.is_empty() || !self.findings.is_empty()
    }
}

impl PipelineOrchestrator {
    /// Run every tool of `stage` through the scheduler and merge what they produced.
    ///
    /// The stage completes when at least one tool succeeds; the failures of
    /// the others are kept in the result's error.
    pub(super) async fn execute_tool_stage(
        &self,
        stage: PipelineStage,
        inputs: &[String],
        state: &RunStateManager,
        scheduler: &TaskScheduler<ToolRun>,
    ) -> Result<StageResult> {
        let started = Instant::now();
        let mut errors: Vec<String> = Vec::new();
        let mut submitted = Vec::new();

        for tool in stage.tools() {
            let Some(adapter) = self.registry.get(tool) else {
                errors.push(format!("Adapter not found for tool: {}", tool));
                continue;
            };
            if !adapter.is_available() {
                warn!("Tool {} is not available, skipping", tool);
                errors.push(format!("Tool not available: {}", tool));
                continue;
            }

            let output_path = state.get_artifact_path(stage, &raw_output_name(tool));
            let config = self.tool_config(tool, Some(output_path));
            self.audit(
                state,
                AuditEventType::ToolStart,
                json!({
                    "stage": stage.as_str(),
                    "tool": tool,
                    "inputs": inputs.len(),
                    "timeout": config.timeout,
                }),
            )?;

            let inputs = inputs.to_vec();
            let adapter = Arc::clone(&adapter);
            let id = scheduler.submit(
                format!("{}:{}", stage, tool),
                async move {
                    let result = adapter.run(&inputs, &config).await?;
                    let items = adapter.extract_items(&result.stdout);
                    let findings = adapter.parse_output(&result.stdout);
                    Ok(ToolRun {
                        result,
                        items,
                        findings,
                    })
                },
                TaskPriority::Normal,
            );
            submitted.push((*tool, id));
        }

        let ids: Vec<_> = submitted.iter().map(|(_, id)| id.clone()).collect();
        let wait = std::time::Duration::from_secs(self.config.timeout) + TOOL_WAIT_GRACE;
        scheduler.wait_all(&ids, Some(wait)).await;

        let mut output = Vec::new();
        let mut findings = Vec::new();
        let mut exit_code: Option<i32> = None;
        let mut succeeded = 0usize;

        for (tool, id) in &submitted {
            let Some(task) = scheduler.get_task(id) else {
                errors.push(format!("{}: task lost", tool));
                continue;
            };

            match (task.status, task.result) {
                (TaskStatus::Completed, Some(run)) => {
                    let code = run.result.exit_code;
                    exit_code = Some(exit_code.map_or(code, |c| c.max(code)));
                    let ok = run.succeeded();
                    self.audit(
                        state,
                        AuditEventType::ToolFinish,
                        json!({
                            "stage": stage.as_str(),
                            "tool": tool,
                            "exit_code": run.result.exit_code,
                            "items": run.items.len(),
                            "findings": run.findings.len(),
                            "duration_ms": run.result.duration.as_millis() as u64,
                        }),
                    )?;
                    if ok {
                        debug!(
                            "{} produced {} item(s) and {} finding(s)",
                            tool,
                            run.items.len(),
                            run.findings.len()
                        );
                        succeeded += 1;
                        output.extend(run.items);
                        findings.extend(run.findings);
                    } else {
                        errors.push(format!(
                            "{} exited with code {}: {}",
                            tool,
                            run.result.exit_code,
                            first_line(&run.result.stderr)
                        ));
                    }
                }
                (status, _) => {
                    let message = match status {
                        TaskStatus::Failed | TaskStatus::Cancelled => task
                            .error
                            .unwrap_or_else(|| format!("task {}", status)),
                        _ => "did not finish in time".to_string(),
                    };
                    self.audit(
                        state,
                        AuditEventType::ToolFinish,
                        json!({
                            "stage": stage.as_str(),
                            "tool": tool,
                            "status": status.as_str(),
                            "error": message,
                        }),
                    )?;
                    errors.push(format!("{}: {}", tool, message));
                }
            }
        }

        let duration = started.elapsed();
        if succeeded == 0 {
            let error = if errors.is_empty() {
                "All tools failed without output".to_string()
            } else {
                errors.join("; ")
            };
            return Ok(StageResult {
                exit_code,
                ..StageResult::failed(stage, error, duration)
            });
        }

        let output_path = state.get_artifact_path(stage, COMBINED_OUTPUT);
        write_lines(&output_path, &output)?;

        Ok(StageResult {
            output,
            output_path: Some(output_path),
            findings,
            duration,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
            exit_code,
            ..StageResult::new(stage, StepStatus::Completed)
        })
    }

    /// Deduplicate and classify the crawled URLs, keeping tagged URLs as JSONL records
    pub(super) fn execute_classification(
        &self,
        stage: PipelineStage,
        inputs: &[String],
        state: &RunStateManager,
    ) -> Result<StageResult> {
        let started = Instant::now();
        let unique = self.classifier.deduplicate(inputs);

        let mut records = Vec::new();
        for result in self.classifier.classify_batch(&unique) {
            if result.groups.is_empty() {
                continue;
            }
            records.push(serde_json::to_string(&result)?);
        }

        let grouped = self.classifier.classify_deduplicate_and_group(&unique);
        let summary: Vec<String> = grouped
            .iter()
            .map(|(group, urls)| format!("{}={}", group, urls.len()))
            .collect();
        info!(
            "Classified {} unique URL(s) of {}: {}",
            unique.len(),
            inputs.len(),
            summary.join(", ")
        );

        let output_path = state.get_artifact_path(stage, CLASSIFIED_URLS);
        write_lines(&output_path, &records)?;

        Ok(StageResult {
            output: records,
            output_path: Some(output_path),
            duration: started.elapsed(),
            ..StageResult::new(stage, StepStatus::Completed)
        })
    }
}

/// Raw output file of a tool, named after its output format
fn raw_output_name(tool: &str) -> String {
    let extension = match ToolKind::from_str(tool).map(|k| k.output_format()) {
        Some(OutputFormat::Text) => "txt",
        _ => "json",
    };
    format!("{}.{}", tool, extension)
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no error output")
}
