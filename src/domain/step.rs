//! Persisted per-stage progress records

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Status of a pipeline step (and of a stage result)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(StepStatus::Pending),
            "running" => Some(StepStatus::Running),
            "completed" => Some(StepStatus::Completed),
            "failed" => Some(StepStatus::Failed),
            "skipped" => Some(StepStatus::Skipped),
            _ => None,
        }
    }

    /// Completed, failed and skipped steps are not touched again unless a resume resets them
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted form of a stage's progress within one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Stage name (see `PipelineStage::as_str`)
    pub name: String,
    pub status: StepStatus,
    /// Unix timestamp in milliseconds
    pub started_at: Option<i64>,
    /// Unix timestamp in milliseconds
    pub completed_at: Option<i64>,
    pub duration_ms: Option<u64>,
    pub output_path: Option<PathBuf>,
    pub findings_count: usize,
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
}

impl PipelineStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            output_path: None,
            findings_count: 0,
            exit_code: None,
            error_message: None,
        }
    }

    /// Clear all progress so the step can run again
    pub fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.name));
    }
}
