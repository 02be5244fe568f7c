//! In-process run store

use std::collections::HashMap;
use std::sync::Mutex;

use super::RunStore;
use crate::domain::{Finding, PipelineStep, RunMetadata};
use crate::error::Result;

/// Run store that keeps records in memory; nothing survives the process
#[derive(Default)]
pub struct MemoryStore {
    runs: Mutex<HashMap<String, RunMetadata>>,
    steps: Mutex<HashMap<String, Vec<PipelineStep>>>,
    findings: Mutex<Vec<Finding>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl RunStore for MemoryStore {
    fn save_run(&self, run: &RunMetadata) -> Result<()> {
        lock(&self.runs).insert(run.id.clone(), run.clone());
        Ok(())
    }

    fn get_run(&self, run_id: &str) -> Result<Option<RunMetadata>> {
        Ok(lock(&self.runs).get(run_id).cloned())
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<RunMetadata>> {
        let mut runs: Vec<_> = lock(&self.runs).values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit);
        Ok(runs)
    }

    fn save_step(&self, run_id: &str, step: &PipelineStep) -> Result<()> {
        let mut steps = lock(&self.steps);
        let run_steps = steps.entry(run_id.to_string()).or_default();
        match run_steps.iter_mut().find(|s| s.name == step.name) {
            Some(existing) => *existing = step.clone(),
            None => run_steps.push(step.clone()),
        }
        Ok(())
    }

    fn get_steps(&self, run_id: &str) -> Result<Vec<PipelineStep>> {
        Ok(lock(&self.steps).get(run_id).cloned().unwrap_or_default())
    }

    fn save_findings(&self, findings: &[Finding]) -> Result<()> {
        let mut stored = lock(&self.findings);
        for finding in findings {
            match stored.iter_mut().find(|f| f.id == finding.id) {
                Some(existing) => *existing = finding.clone(),
                None => stored.push(finding.clone()),
            }
        }
        Ok(())
    }

    fn get_findings(&self, run_id: &str) -> Result<Vec<Finding>> {
        Ok(lock(&self.findings)
            .iter()
            .filter(|f| f.run_id == run_id)
            .cloned()
            .collect())
    }
}
