//! Persistence of runs, steps and findings
//!
//! The run state manager only talks to the [`RunStore`] trait. `SqliteStore`
//! is the durable backend; `MemoryStore` keeps everything in process.

mod db;
mod layout;
mod memory;

pub use db::SqliteStore;
pub use layout::RunLayout;
pub use memory::MemoryStore;

use std::collections::HashSet;

use crate::domain::{Finding, PipelineStep, RunMetadata, StepStatus};
use crate::error::Result;

/// Record-level storage operations used by the engine
pub trait RunStore: Send + Sync {
    /// Insert or replace a run's metadata
    fn save_run(&self, run: &RunMetadata) -> Result<()>;

    fn get_run(&self, run_id: &str) -> Result<Option<RunMetadata>>;

    /// Most recently created runs first
    fn list_runs(&self, limit: usize) -> Result<Vec<RunMetadata>>;

    /// Insert or replace one step row of a run
    fn save_step(&self, run_id: &str, step: &PipelineStep) -> Result<()>;

    /// Steps in registration order
    fn get_steps(&self, run_id: &str) -> Result<Vec<PipelineStep>>;

    fn get_completed_step_names(&self, run_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .get_steps(run_id)?
            .into_iter()
            .filter(|step| step.status == StepStatus::Completed)
            .map(|step| step.name)
            .collect())
    }

    /// Insert or replace findings (keyed by finding id)
    fn save_findings(&self, findings: &[Finding]) -> Result<()>;

    fn get_findings(&self, run_id: &str) -> Result<Vec<Finding>>;
}
