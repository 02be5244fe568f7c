//! Run state manager
//!
//! The single source of truth for a run's lifecycle, step trail and stage
//! results. Every mutation is written through to the [`RunStore`] before the
//! method returns, so a run can be resumed after the process dies.
//!
//! Run-level state machine:
//!
//! ```text
//! PENDING -> RUNNING -> { COMPLETED, FAILED, CANCELLED }
//!    \          ^ |
//!     \         | v
//!      `----> PAUSED
//! ```
//!
//! Terminal states reject every further mutation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::audit::AuditLogger;
use crate::config::PipelineConfig;
use crate::domain::{
    Finding, PipelineStage, PipelineStep, RunMetadata, RunState, StageResult, StepStatus,
};
use crate::error::{Error, Result};
use crate::storage::{RunLayout, RunStore};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Tracks and persists the progress of one run
pub struct RunStateManager {
    metadata: RunMetadata,
    steps: Vec<PipelineStep>,
    results: HashMap<PipelineStage, StageResult>,
    store: Arc<dyn RunStore>,
    layout: RunLayout,
    audit: Option<AuditLogger>,
}

impl std::fmt::Debug for RunStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStateManager")
            .field("run_id", &self.metadata.id)
            .field("state", &self.metadata.state)
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl RunStateManager {
    /// Create and persist a new run rooted at `{runs_root}/{run_id}`
    pub fn new(
        run_id: impl Into<String>,
        target: impl Into<String>,
        config: &PipelineConfig,
        runs_root: &Path,
        store: Arc<dyn RunStore>,
    ) -> Result<Self> {
        let run_id = run_id.into();
        let layout = RunLayout::new(runs_root, &run_id);
        let metadata = RunMetadata::new(
            run_id,
            target,
            config.profile.clone(),
            config.engagement_mode,
            layout.run_dir.clone(),
        );
        store.save_run(&metadata)?;

        Ok(Self {
            metadata,
            steps: Vec::new(),
            results: HashMap::new(),
            store,
            layout,
            audit: None,
        })
    }

    /// Rebuild the manager of an existing run.
    ///
    /// Completed steps keep their status and their stage results are reloaded
    /// from the persisted output artifacts. Every other step is reset to
    /// pending, counters are recomputed from the step rows, and the run goes
    /// back to `Pending` so it can be started again. Stages listed in `config`
    /// that the run never registered are appended as pending steps; steps of
    /// stages no longer in `config` do not count towards `total_steps`.
    pub fn resume(run_id: &str, store: Arc<dyn RunStore>, config: &PipelineConfig) -> Result<Self> {
        let mut metadata = store
            .get_run(run_id)?
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()))?;
        let mut steps = store.get_steps(run_id)?;
        let layout = RunLayout::from_metadata(&metadata);
        let stored_findings = store.get_findings(run_id)?;

        let mut results = HashMap::new();
        for step in steps.iter_mut() {
            if step.status == StepStatus::Completed {
                match PipelineStage::from_str(&step.name) {
                    Some(stage) => {
                        let result = rehydrate_result(stage, step, &stored_findings)?;
                        results.insert(stage, result);
                    }
                    None => warn!("Ignoring unknown stage '{}' in run {}", step.name, run_id),
                }
            } else if step.status != StepStatus::Pending {
                debug!("Resetting step {} ({}) for rerun", step.name, step.status);
                step.reset();
                store.save_step(run_id, step)?;
            }
        }

        for stage in &config.stages {
            if !steps.iter().any(|s| s.name == stage.as_str()) {
                let step = PipelineStep::new(stage.as_str());
                store.save_step(run_id, &step)?;
                steps.push(step);
            }
        }

        metadata.state = RunState::Pending;
        metadata.completed_at = None;
        metadata.error_message = None;
        metadata.engagement_mode = config.engagement_mode;
        // Steps of stages outside this pipeline never run again; they are
        // kept in the trail but not counted towards progress
        let scheduled =
            |step: &&PipelineStep| config.stages.iter().any(|s| s.as_str() == step.name);
        metadata.total_steps = steps.iter().filter(scheduled).count();
        metadata.completed_steps = steps
            .iter()
            .filter(scheduled)
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        metadata.failed_steps = 0;
        metadata.total_findings = steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.findings_count)
            .sum();
        store.save_run(&metadata)?;

        info!(
            "Resuming run {} ({} of {} steps already completed)",
            metadata.id, metadata.completed_steps, metadata.total_steps
        );

        Ok(Self {
            metadata,
            steps,
            results,
            store,
            layout,
            audit: None,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.metadata.id
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn state(&self) -> RunState {
        self.metadata.state
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn step(&self, stage: PipelineStage) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.name == stage.as_str())
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    pub fn audit_logger(&self) -> Option<&AuditLogger> {
        self.audit.as_ref()
    }

    /// Names of steps currently in `Completed` status
    pub fn completed_step_names(&self) -> HashSet<String> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn is_step_completed(&self, stage: PipelineStage) -> bool {
        self.step(stage)
            .is_some_and(|s| s.status == StepStatus::Completed)
    }

    /// Create the run's directory tree and open its audit log. Idempotent.
    pub fn initialize(&mut self) -> Result<()> {
        self.layout.create()?;
        if self.audit.is_none() {
            self.audit = Some(AuditLogger::new(self.metadata.id.clone(), &self.layout.run_dir)?);
        }
        self.persist_run()
    }

    /// Create one pending step per stage. Stages already registered are left alone.
    pub fn register_steps(&mut self, stages: &[PipelineStage]) -> Result<()> {
        self.ensure_not_terminal("register steps")?;
        for stage in stages {
            if self.step(*stage).is_some() {
                continue;
            }
            let step = PipelineStep::new(stage.as_str());
            self.store.save_step(&self.metadata.id, &step)?;
            self.steps.push(step);
        }
        self.metadata.total_steps = self.steps.len();
        self.persist_run()
    }

    pub fn start_run(&mut self) -> Result<()> {
        self.transition(&[RunState::Pending], RunState::Running)?;
        if self.metadata.started_at.is_none() {
            self.metadata.started_at = Some(now_ms());
        }
        self.persist_run()
    }

    /// Valid only while running; a failed or cancelled run is never overwritten
    pub fn complete_run(&mut self) -> Result<()> {
        self.transition(&[RunState::Running], RunState::Completed)?;
        self.metadata.completed_at = Some(now_ms());
        self.persist_run()
    }

    pub fn fail_run(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(
            &[RunState::Pending, RunState::Running, RunState::Paused],
            RunState::Failed,
        )?;
        self.metadata.completed_at = Some(now_ms());
        self.metadata.error_message = Some(reason.into());
        self.persist_run()
    }

    pub fn cancel_run(&mut self) -> Result<()> {
        self.transition(
            &[RunState::Pending, RunState::Running, RunState::Paused],
            RunState::Cancelled,
        )?;
        self.metadata.completed_at = Some(now_ms());
        self.persist_run()
    }

    pub fn pause_run(&mut self) -> Result<()> {
        self.transition(&[RunState::Pending, RunState::Running], RunState::Paused)?;
        self.persist_run()
    }

    pub fn resume_run(&mut self) -> Result<()> {
        self.transition(&[RunState::Paused], RunState::Running)?;
        if self.metadata.started_at.is_none() {
            self.metadata.started_at = Some(now_ms());
        }
        self.persist_run()
    }

    fn transition(&mut self, allowed_from: &[RunState], to: RunState) -> Result<()> {
        let from = self.metadata.state;
        if !allowed_from.contains(&from) {
            return Err(Error::transition("run", from, to));
        }
        debug!("Run {}: {} -> {}", self.metadata.id, from, to);
        self.metadata.state = to;
        Ok(())
    }

    fn ensure_not_terminal(&self, action: &str) -> Result<()> {
        if self.metadata.state.is_terminal() {
            return Err(Error::transition("run", self.metadata.state, action));
        }
        Ok(())
    }

    pub fn start_step(&mut self, stage: PipelineStage) -> Result<()> {
        self.ensure_not_terminal("start step")?;
        let step = self.step_for_update(stage, &[StepStatus::Pending], StepStatus::Running)?;
        step.started_at = Some(now_ms());
        let step = step.clone();
        self.store.save_step(&self.metadata.id, &step)?;

        self.results
            .insert(stage, StageResult::new(stage, StepStatus::Running));
        Ok(())
    }

    /// Mark a step completed and add its findings to the run totals
    pub fn complete_step(
        &mut self,
        stage: PipelineStage,
        output_path: Option<PathBuf>,
        findings_count: usize,
    ) -> Result<()> {
        self.ensure_not_terminal("complete step")?;
        self.check_step(stage, StepStatus::Completed)?;
        let cached = self.settle_result(stage, StepStatus::Completed, output_path.clone(), None);

        let completed_at = now_ms();
        let step = self.step_for_update(
            stage,
            &[StepStatus::Pending, StepStatus::Running],
            StepStatus::Completed,
        )?;
        step.completed_at = Some(completed_at);
        step.duration_ms = step_duration(step.started_at, completed_at, &cached);
        step.output_path = output_path;
        step.findings_count = findings_count;
        step.exit_code = cached.exit_code;
        step.error_message = cached.error.clone();
        let step = step.clone();
        self.store.save_step(&self.metadata.id, &step)?;

        self.metadata.completed_steps += 1;
        self.metadata.total_findings += findings_count;
        for finding in &cached.findings {
            *self
                .metadata
                .findings_by_severity
                .entry(finding.severity)
                .or_insert(0) += 1;
        }
        self.persist_run()
    }

    pub fn fail_step(&mut self, stage: PipelineStage, error: impl Into<String>) -> Result<()> {
        self.ensure_not_terminal("fail step")?;
        self.check_step(stage, StepStatus::Failed)?;
        let error = error.into();
        let cached = self.settle_result(stage, StepStatus::Failed, None, Some(error.clone()));

        let completed_at = now_ms();
        let step = self.step_for_update(
            stage,
            &[StepStatus::Pending, StepStatus::Running],
            StepStatus::Failed,
        )?;
        step.completed_at = Some(completed_at);
        step.duration_ms = step_duration(step.started_at, completed_at, &cached);
        step.exit_code = cached.exit_code;
        step.error_message = Some(error);
        let step = step.clone();
        self.store.save_step(&self.metadata.id, &step)?;

        self.metadata.failed_steps += 1;
        self.persist_run()
    }

    /// Skipped steps contribute to neither counter
    pub fn skip_step(&mut self, stage: PipelineStage, reason: impl Into<String>) -> Result<()> {
        self.ensure_not_terminal("skip step")?;
        self.check_step(stage, StepStatus::Skipped)?;
        let reason = reason.into();
        self.settle_result(stage, StepStatus::Skipped, None, Some(reason.clone()));

        let step = self.step_for_update(
            stage,
            &[StepStatus::Pending, StepStatus::Running],
            StepStatus::Skipped,
        )?;
        step.completed_at = Some(now_ms());
        step.error_message = Some(reason);
        let step = step.clone();
        self.store.save_step(&self.metadata.id, &step)?;
        self.persist_run()
    }

    /// Fail early, before the result cache is touched, if the step cannot finish
    fn check_step(&self, stage: PipelineStage, to: StepStatus) -> Result<()> {
        let step = self
            .step(stage)
            .ok_or_else(|| Error::StepNotFound(stage.as_str().to_string()))?;
        if step.status.is_terminal() {
            return Err(Error::transition("step", step.status, to));
        }
        Ok(())
    }

    fn step_for_update(
        &mut self,
        stage: PipelineStage,
        allowed_from: &[StepStatus],
        to: StepStatus,
    ) -> Result<&mut PipelineStep> {
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.name == stage.as_str())
            .ok_or_else(|| Error::StepNotFound(stage.as_str().to_string()))?;
        if !allowed_from.contains(&step.status) {
            return Err(Error::transition("step", step.status, to));
        }
        debug!("Step {}: {} -> {}", step.name, step.status, to);
        step.status = to;
        Ok(step)
    }

    /// Make the cached result agree with a step's terminal status.
    ///
    /// A result already stored with the same status is kept as is; otherwise
    /// it is replaced by a copy carrying the new status.
    fn settle_result(
        &mut self,
        stage: PipelineStage,
        status: StepStatus,
        output_path: Option<PathBuf>,
        error: Option<String>,
    ) -> StageResult {
        let settled = match self.results.get(&stage) {
            Some(existing) if existing.status == status => existing.clone(),
            Some(existing) => StageResult {
                status,
                output_path: output_path.or_else(|| existing.output_path.clone()),
                error: error.or_else(|| existing.error.clone()),
                ..existing.clone()
            },
            None => StageResult {
                output_path,
                error,
                ..StageResult::new(stage, status)
            },
        };
        self.results.insert(stage, settled.clone());
        settled
    }

    /// Store (replace) the result of a stage and persist its findings
    pub fn store_stage_result(&mut self, mut result: StageResult) -> Result<()> {
        for finding in result.findings.iter_mut() {
            finding.run_id = self.metadata.id.clone();
        }
        if !result.findings.is_empty() {
            self.store.save_findings(&result.findings)?;
        }
        self.results.insert(result.stage, result);
        Ok(())
    }

    pub fn get_stage_result(&self, stage: PipelineStage) -> Option<&StageResult> {
        self.results.get(&stage)
    }

    /// Output lines of a stage; empty when the stage has no result
    pub fn get_stage_output(&self, stage: PipelineStage) -> &[String] {
        self.results
            .get(&stage)
            .map(|r| r.output.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_artifact_path(&self, stage: PipelineStage, filename: &str) -> PathBuf {
        self.layout.artifact_path(stage, filename)
    }

    /// Findings persisted for this run
    pub fn findings(&self) -> Result<Vec<Finding>> {
        self.store.get_findings(&self.metadata.id)
    }

    fn persist_run(&self) -> Result<()> {
        self.store.save_run(&self.metadata)
    }
}

fn step_duration(started_at: Option<i64>, completed_at: i64, cached: &StageResult) -> Option<u64> {
    match started_at {
        Some(start) => Some(completed_at.saturating_sub(start).max(0) as u64),
        None if !cached.duration.is_zero() => Some(cached.duration.as_millis() as u64),
        None => None,
    }
}

/// Rebuild a completed stage's result from its persisted artifact and findings
fn rehydrate_result(
    stage: PipelineStage,
    step: &PipelineStep,
    stored_findings: &[Finding],
) -> Result<StageResult> {
    let output = match &step.output_path {
        Some(path) if path.exists() => std::fs::read_to_string(path)?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Some(path) => {
            warn!(
                "Output artifact for completed step {} is missing: {}",
                step.name,
                path.display()
            );
            Vec::new()
        }
        None => Vec::new(),
    };

    let findings = stored_findings
        .iter()
        .filter(|f| stage.tools().contains(&f.tool.as_str()))
        .cloned()
        .collect();

    Ok(StageResult {
        output,
        output_path: step.output_path.clone(),
        findings,
        duration: Duration::from_millis(step.duration_ms.unwrap_or(0)),
        error: step.error_message.clone(),
        exit_code: step.exit_code,
        ..StageResult::new(stage, StepStatus::Completed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EngagementMode, Severity};
    use crate::storage::MemoryStore;
    use tempfile::tempdir;

    fn config(stages: &[PipelineStage]) -> PipelineConfig {
        PipelineConfig {
            stages: stages.to_vec(),
            ..PipelineConfig::default()
        }
    }

    fn manager(dir: &Path, store: Arc<dyn RunStore>) -> RunStateManager {
        let stages = [
            PipelineStage::SubdomainEnum,
            PipelineStage::DnsResolution,
            PipelineStage::HttpProbing,
        ];
        let mut m =
            RunStateManager::new("run-1", "example.com", &config(&stages), dir, store).unwrap();
        m.initialize().unwrap();
        m.register_steps(&stages).unwrap();
        m
    }

    #[test]
    fn test_initialize_creates_layout_and_persists() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn RunStore> = Arc::new(MemoryStore::new());
        let mut m = manager(dir.path(), Arc::clone(&store));
        m.initialize().unwrap();

        assert!(dir.path().join("run-1/artifacts").is_dir());
        assert!(dir.path().join("run-1/evidence/requests").is_dir());
        assert!(m.audit_logger().is_some());

        let saved = store.get_run("run-1").unwrap().unwrap();
        assert_eq!(saved.total_steps, 3);
        assert_eq!(saved.state, RunState::Pending);
        assert_eq!(saved.engagement_mode, EngagementMode::Bugbounty);
        assert_eq!(store.get_steps("run-1").unwrap().len(), 3);
    }

    #[test]
    fn test_run_state_machine() {
        let dir = tempdir().unwrap();
        let mut m = manager(dir.path(), Arc::new(MemoryStore::new()));

        assert!(m.complete_run().is_err());
        assert!(m.resume_run().is_err());
        m.pause_run().unwrap();
        m.resume_run().unwrap();
        assert_eq!(m.state(), RunState::Running);
        m.pause_run().unwrap();
        assert!(m.pause_run().is_err());
        m.resume_run().unwrap();

        m.fail_run("boom").unwrap();
        assert_eq!(m.metadata().error_message.as_deref(), Some("boom"));
        assert!(m.complete_run().is_err());
        assert!(m.cancel_run().is_err());
        assert!(m.start_step(PipelineStage::SubdomainEnum).is_err());
        assert!(matches!(
            m.pause_run(),
            Err(Error::InvalidTransition { entity: "run", .. })
        ));
    }

    #[test]
    fn test_step_accounting() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn RunStore> = Arc::new(MemoryStore::new());
        let mut m = manager(dir.path(), Arc::clone(&store));
        m.start_run().unwrap();

        m.start_step(PipelineStage::SubdomainEnum).unwrap();
        let mut result = StageResult::new(PipelineStage::SubdomainEnum, StepStatus::Completed);
        result.output = vec!["a.example.com".into()];
        result.findings = vec![
            Finding::new("subfinder", "takeover", Severity::High, "a.example.com"),
            Finding::new("subfinder", "info", Severity::Info, "a.example.com"),
        ];
        m.store_stage_result(result).unwrap();
        m.complete_step(PipelineStage::SubdomainEnum, None, 2).unwrap();

        m.start_step(PipelineStage::DnsResolution).unwrap();
        m.fail_step(PipelineStage::DnsResolution, "dnsx unavailable").unwrap();
        m.skip_step(PipelineStage::HttpProbing, "Dependencies not met").unwrap();

        let meta = m.metadata();
        assert_eq!(meta.completed_steps, 1);
        assert_eq!(meta.failed_steps, 1);
        assert!(meta.completed_steps + meta.failed_steps <= meta.total_steps);
        assert_eq!(meta.total_findings, 2);
        assert_eq!(meta.findings_by_severity.get(&Severity::High), Some(&1));

        assert_eq!(m.get_stage_output(PipelineStage::SubdomainEnum), ["a.example.com"]);
        assert!(m.get_stage_output(PipelineStage::HttpProbing).is_empty());
        assert_eq!(
            m.get_stage_result(PipelineStage::DnsResolution).unwrap().status,
            StepStatus::Failed
        );
        assert_eq!(
            m.get_stage_result(PipelineStage::HttpProbing).unwrap().error.as_deref(),
            Some("Dependencies not met")
        );

        let findings = store.get_findings("run-1").unwrap();
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.run_id == "run-1"));

        // Completed steps are never silently re-run
        assert!(m.start_step(PipelineStage::SubdomainEnum).is_err());
        assert!(m.complete_step(PipelineStage::SubdomainEnum, None, 1).is_err());
        assert_eq!(m.metadata().total_findings, 2);
    }

    #[test]
    fn test_unknown_step_is_an_error() {
        let dir = tempdir().unwrap();
        let mut m = manager(dir.path(), Arc::new(MemoryStore::new()));
        assert!(matches!(
            m.start_step(PipelineStage::Fuzzing),
            Err(Error::StepNotFound(_))
        ));
    }

    #[test]
    fn test_artifact_path_under_run_dir() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path(), Arc::new(MemoryStore::new()));
        assert_eq!(
            m.get_artifact_path(PipelineStage::DnsResolution, "dnsx_output.txt"),
            dir.path()
                .join("run-1/artifacts/dns_resolution/dnsx_output.txt")
        );
    }

    #[test]
    fn test_resume_counts_only_stages_still_in_the_pipeline() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn RunStore> = Arc::new(MemoryStore::new());
        {
            let mut m = manager(dir.path(), Arc::clone(&store));
            m.start_run().unwrap();
            m.start_step(PipelineStage::SubdomainEnum).unwrap();
            m.complete_step(PipelineStage::SubdomainEnum, None, 0).unwrap();
        }

        let stages = [PipelineStage::SubdomainEnum, PipelineStage::DnsResolution];
        let mut m = RunStateManager::resume("run-1", Arc::clone(&store), &config(&stages)).unwrap();
        assert_eq!(m.metadata().total_steps, 2);
        assert_eq!(m.metadata().completed_steps, 1);
        assert!(m.step(PipelineStage::HttpProbing).is_some());

        m.start_run().unwrap();
        m.start_step(PipelineStage::DnsResolution).unwrap();
        m.complete_step(PipelineStage::DnsResolution, None, 0).unwrap();
        m.complete_run().unwrap();
        assert_eq!(m.metadata().progress_percentage(), 100.0);
    }

    #[test]
    fn test_resume_resets_unfinished_steps_and_rehydrates_output() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn RunStore> = Arc::new(MemoryStore::new());
        {
            let mut m = manager(dir.path(), Arc::clone(&store));
            m.start_run().unwrap();

            let path = m.get_artifact_path(PipelineStage::SubdomainEnum, "combined_output.txt");
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "a.example.com\nb.example.com\n").unwrap();

            m.start_step(PipelineStage::SubdomainEnum).unwrap();
            let mut result = StageResult::new(PipelineStage::SubdomainEnum, StepStatus::Completed);
            result.output = vec!["a.example.com".into(), "b.example.com".into()];
            result.output_path = Some(path.clone());
            result.findings = vec![Finding::new("subfinder", "x", Severity::Low, "a.example.com")];
            m.store_stage_result(result).unwrap();
            m.complete_step(PipelineStage::SubdomainEnum, Some(path), 1).unwrap();

            m.start_step(PipelineStage::DnsResolution).unwrap();
            m.fail_step(PipelineStage::DnsResolution, "timeout").unwrap();
            m.fail_run("stop on failure").unwrap();
        }

        let stages = [
            PipelineStage::SubdomainEnum,
            PipelineStage::DnsResolution,
            PipelineStage::HttpProbing,
            PipelineStage::WebCrawling,
        ];
        let m = RunStateManager::resume("run-1", Arc::clone(&store), &config(&stages)).unwrap();

        assert_eq!(m.state(), RunState::Pending);
        assert_eq!(m.metadata().completed_steps, 1);
        assert_eq!(m.metadata().failed_steps, 0);
        assert_eq!(m.metadata().total_steps, 4);
        assert_eq!(m.metadata().total_findings, 1);
        assert!(m.metadata().error_message.is_none());

        assert_eq!(
            m.step(PipelineStage::DnsResolution).unwrap().status,
            StepStatus::Pending
        );
        assert!(m.step(PipelineStage::DnsResolution).unwrap().error_message.is_none());
        assert!(m.step(PipelineStage::WebCrawling).is_some());

        let rehydrated = m.get_stage_result(PipelineStage::SubdomainEnum).unwrap();
        assert!(rehydrated.is_completed());
        assert_eq!(rehydrated.output, vec!["a.example.com", "b.example.com"]);
        assert_eq!(rehydrated.findings.len(), 1);

        let names = store.get_completed_step_names("run-1").unwrap();
        assert_eq!(names, m.completed_step_names());
    }

    #[test]
    fn test_resume_unknown_run() {
        let store: Arc<dyn RunStore> = Arc::new(MemoryStore::new());
        assert!(matches!(
            RunStateManager::resume("nope", store, &PipelineConfig::default()),
            Err(Error::RunNotFound(_))
        ));
    }
}
