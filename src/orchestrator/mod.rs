//! Pipeline orchestrator
//!
//! Drives one run through its configured stages in order. Each stage is
//! gated on its dependencies having completed, reads its inputs from the
//! stored outputs of those dependencies, and is executed either in-process
//! (URL classification) or by fanning out to the stage's tools through a
//! [`TaskScheduler`]. Tool failures are recorded on the stage result; only
//! configuration and persistence problems abort a run with an error.
//!
//! Pause and cancel are cooperative: both are observed at stage boundaries,
//! and a stage that is already executing always runs to completion.

mod control;
mod inputs;
mod stage;

pub use control::{RunControl, RunGuard};
pub use inputs::{classified_urls, stage_inputs};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audit::AuditEventType;
use crate::classifier::UrlClassifier;
use crate::config::PipelineConfig;
use crate::domain::{PipelineStage, RunState, ToolConfig, ToolResult, new_run_id};
use crate::error::{Error, Result};
use crate::scheduler::{DEFAULT_STOP_TIMEOUT, RateLimiter, TaskScheduler};
use crate::state::RunStateManager;
use crate::storage::RunStore;
use crate::tools::{ToolKind, ToolRegistry};

use stage::ToolRun;

/// Extra time granted past a tool's own timeout before its task is given up on
const TOOL_WAIT_GRACE: Duration = Duration::from_secs(30);

/// Runs pipelines, one at a time per instance
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    registry: ToolRegistry,
    store: Arc<dyn RunStore>,
    runs_root: PathBuf,
    classifier: UrlClassifier,
    control: RunControl,
}

impl PipelineOrchestrator {
    /// Validate the configuration and check every tool stage has an adapter.
    ///
    /// A registered but unavailable adapter is not an error here; its stage
    /// fails at run time instead.
    pub fn new(
        config: PipelineConfig,
        registry: ToolRegistry,
        store: Arc<dyn RunStore>,
        runs_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;
        for stage in &config.stages {
            if !stage.is_internal() && stage.tools().iter().all(|t| registry.get(t).is_none()) {
                return Err(Error::Config(format!(
                    "no tool adapter registered for stage {} (expected one of: {})",
                    stage,
                    stage.tools().join(", ")
                )));
            }
        }

        Ok(Self {
            config,
            registry,
            store,
            runs_root: runs_root.into(),
            classifier: UrlClassifier::new(),
            control: RunControl::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Execute a new run against `target`
    pub async fn run(&self, target: &str) -> Result<RunStateManager> {
        self.run_with_resume(target, None).await
    }

    /// Execute a run, continuing `resume_id` when given.
    ///
    /// A resumed run keeps its completed stages and their outputs and
    /// re-executes everything else. Its stored target wins over `target`.
    pub async fn run_with_resume(
        &self,
        target: &str,
        resume_id: Option<&str>,
    ) -> Result<RunStateManager> {
        let guard = self.control.begin()?;

        let mut state = match resume_id {
            Some(run_id) => {
                let state = RunStateManager::resume(run_id, Arc::clone(&self.store), &self.config)?;
                if !target.is_empty() && target != state.metadata().target {
                    warn!(
                        "Run {} targets {}, ignoring requested target {}",
                        run_id,
                        state.metadata().target,
                        target
                    );
                }
                state
            }
            None => RunStateManager::new(
                new_run_id(),
                target,
                &self.config,
                &self.runs_root,
                Arc::clone(&self.store),
            )?,
        };
        state.initialize()?;
        if resume_id.is_none() {
            state.register_steps(&self.config.stages)?;
        }

        let scheduler: TaskScheduler<ToolRun> = TaskScheduler::new(
            self.config.concurrency,
            Some(RateLimiter::new(self.config.rate_limit_global, None)?),
        )?;
        scheduler.start();

        let outcome = self.drive(&mut state, &scheduler, guard.token()).await;
        scheduler.stop(true, Some(DEFAULT_STOP_TIMEOUT)).await;

        if let Err(e) = outcome {
            if !state.state().is_terminal() {
                if let Err(fail_err) = state.fail_run(e.to_string()) {
                    warn!("Could not record failure of run {}: {}", state.run_id(), fail_err);
                }
            }
            return Err(e);
        }
        Ok(state)
    }

    /// Close the pause gate; the run stops at the next stage boundary
    pub fn pause(&self) {
        info!("Pause requested");
        self.control.pause();
    }

    pub fn resume(&self) {
        info!("Resume requested");
        self.control.resume();
    }

    /// Stop starting new stages; the current stage finishes first
    pub fn cancel(&self) {
        info!("Cancel requested");
        self.control.cancel();
    }

    /// Run one tool outside the pipeline
    pub async fn run_single_tool(
        &self,
        tool: &str,
        inputs: &[String],
        timeout: Option<Duration>,
    ) -> Result<ToolResult> {
        let adapter = self
            .registry
            .get(tool)
            .filter(|a| a.is_available())
            .ok_or_else(|| Error::ToolNotFound(tool.to_string()))?;

        let mut config = self.tool_config(tool, None);
        if let Some(timeout) = timeout {
            config.timeout = timeout.as_secs().max(1);
        }
        info!("Running {} on {} input(s)", tool, inputs.len());
        adapter.run(inputs, &config).await
    }

    /// Stages that could execute with the registered adapters
    pub fn get_available_stages(&self) -> Vec<PipelineStage> {
        PipelineStage::ALL
            .into_iter()
            .filter(|stage| {
                stage.is_internal() || stage.tools().iter().any(|t| self.registry.is_available(t))
            })
            .collect()
    }

    async fn drive(
        &self,
        state: &mut RunStateManager,
        scheduler: &TaskScheduler<ToolRun>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let target = state.metadata().target.clone();
        state.start_run()?;
        self.audit(
            state,
            AuditEventType::ModeChange,
            json!({
                "mode": self.config.engagement_mode.as_str(),
                "rate_limit_global": self.config.rate_limit_global,
                "rate_limit_per_host": self.config.rate_limit_per_host,
                "concurrency": self.config.concurrency,
            }),
        )?;
        self.audit(
            state,
            AuditEventType::RunStart,
            json!({
                "target": target,
                "profile": self.config.profile,
                "stages": self.config.stages.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            }),
        )?;
        info!(
            "Run {} started against {} ({} stages, {} mode)",
            state.run_id(),
            target,
            self.config.stages.len(),
            self.config.engagement_mode
        );

        for stage in self.config.stages.iter().copied() {
            if !self.checkpoint(state, cancel).await? {
                break;
            }

            if state.is_step_completed(stage) {
                info!("Stage {} already completed, skipping", stage);
                continue;
            }

            let met = stage.dependencies().iter().all(|dep| {
                state
                    .get_stage_result(*dep)
                    .is_some_and(|r| r.is_completed())
            });
            if !met {
                info!("Stage {} skipped: dependencies not met", stage);
                state.skip_step(stage, "Dependencies not met")?;
                continue;
            }

            let inputs = stage_inputs(stage, state, &target);
            if inputs.is_empty() {
                info!("Stage {} skipped: no inputs", stage);
                state.skip_step(stage, "No inputs")?;
                continue;
            }

            info!("Stage {} starting with {} input(s)", stage, inputs.len());
            state.start_step(stage)?;
            let executed = if stage.is_internal() {
                self.execute_classification(stage, &inputs, state)
            } else {
                self.execute_tool_stage(stage, &inputs, state, scheduler).await
            };
            // The step is closed before the error reaches the caller
            let result = match executed {
                Ok(result) => result,
                Err(e) => {
                    warn!("Stage {} aborted: {}", stage, e);
                    state.fail_step(stage, e.to_string())?;
                    return Err(e);
                }
            };

            let completed = result.is_completed();
            let output_path = result.output_path.clone();
            let findings_count = result.findings.len();
            let error = result.error.clone();
            state.store_stage_result(result)?;

            if completed {
                info!(
                    "Stage {} completed ({} output(s), {} finding(s))",
                    stage,
                    state.get_stage_output(stage).len(),
                    findings_count
                );
                state.complete_step(stage, output_path, findings_count)?;
            } else {
                let error = error.unwrap_or_else(|| "Stage failed".to_string());
                warn!("Stage {} failed: {}", stage, error);
                state.fail_step(stage, error)?;
                if self.config.stop_on_failure {
                    state.fail_run(format!("Stage {} failed", stage))?;
                    break;
                }
            }
        }

        // A run paused or cancelled during its last stage settles here
        if state.state() == RunState::Running && self.checkpoint(state, cancel).await? {
            state.complete_run()?;
        }

        let metadata = state.metadata();
        info!(
            "Run {} finished: {} ({}/{} steps completed, {} failed, {} findings)",
            metadata.id,
            metadata.state,
            metadata.completed_steps,
            metadata.total_steps,
            metadata.failed_steps,
            metadata.total_findings
        );
        self.audit(
            state,
            AuditEventType::RunFinish,
            json!({
                "state": metadata.state.as_str(),
                "completed_steps": metadata.completed_steps,
                "failed_steps": metadata.failed_steps,
                "total_findings": metadata.total_findings,
            }),
        )
    }

    /// Stage boundary: honour cancel and the pause gate.
    ///
    /// Returns false once the run has been marked cancelled.
    async fn checkpoint(
        &self,
        state: &mut RunStateManager,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if !cancel.is_cancelled() && self.control.is_paused() {
            state.pause_run()?;
            info!("Run {} paused", state.run_id());
            if self.control.wait_until_resumed(cancel).await && !cancel.is_cancelled() {
                state.resume_run()?;
                info!("Run {} resumed", state.run_id());
            }
        }

        if cancel.is_cancelled() {
            info!("Run {} cancelled", state.run_id());
            state.cancel_run()?;
            return Ok(false);
        }
        Ok(true)
    }

    fn tool_config(&self, tool: &str, output_path: Option<PathBuf>) -> ToolConfig {
        let mut config = ToolConfig::new(tool, self.config.timeout);
        config.rate_limit = Some(self.config.rate_limit_per_host);
        config.output_format = ToolKind::from_str(tool)
            .map(|k| k.output_format())
            .unwrap_or_default();
        config.output_path = output_path;
        config
    }

    /// Best-effort audit write; fatal only with strict auditing
    fn audit(
        &self,
        state: &RunStateManager,
        event: AuditEventType,
        details: serde_json::Value,
    ) -> Result<()> {
        let Some(logger) = state.audit_logger() else {
            return Ok(());
        };
        match logger.log_event(event, details) {
            Ok(()) => Ok(()),
            Err(e) if self.config.strict_audit => Err(e),
            Err(e) => {
                warn!("{}", e);
                Ok(())
            }
        }
    }
}
