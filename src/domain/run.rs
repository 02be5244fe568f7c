//! Run identity, lifecycle state and engagement presets

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::finding::Severity;

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(RunState::Pending),
            "running" => Some(RunState::Running),
            "paused" => Some(RunState::Paused),
            "completed" => Some(RunState::Completed),
            "failed" => Some(RunState::Failed),
            "cancelled" | "canceled" => Some(RunState::Cancelled),
            _ => None,
        }
    }

    /// Terminal states accept no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named preset selecting concurrency and rate-limit magnitudes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngagementMode {
    #[default]
    Bugbounty,
    Authorized,
    Aggressive,
}

impl EngagementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementMode::Bugbounty => "bugbounty",
            EngagementMode::Authorized => "authorized",
            EngagementMode::Aggressive => "aggressive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "bugbounty" | "bb" => Some(EngagementMode::Bugbounty),
            "authorized" | "authorised" => Some(EngagementMode::Authorized),
            "aggressive" => Some(EngagementMode::Aggressive),
            _ => None,
        }
    }

    /// Built-in limits for this mode
    pub fn default_limits(&self) -> ModeLimits {
        match self {
            EngagementMode::Bugbounty => ModeLimits {
                global: 30.0,
                per_host: 5.0,
                concurrency: 10,
            },
            EngagementMode::Authorized => ModeLimits {
                global: 100.0,
                per_host: 20.0,
                concurrency: 50,
            },
            EngagementMode::Aggressive => ModeLimits {
                global: 500.0,
                per_host: 100.0,
                concurrency: 100,
            },
        }
    }
}

impl std::fmt::Display for EngagementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rate and concurrency ceilings for an engagement mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeLimits {
    /// Global requests per second
    pub global: f64,
    /// Requests per second against a single host
    pub per_host: f64,
    /// Maximum simultaneously running tasks
    pub concurrency: usize,
}

/// Persisted identity and progress of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub id: String,
    pub target: String,
    pub profile: String,
    pub engagement_mode: EngagementMode,
    pub state: RunState,

    /// Unix timestamps in milliseconds
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,

    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub total_findings: usize,
    #[serde(default)]
    pub findings_by_severity: BTreeMap<Severity, usize>,

    pub run_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub evidence_dir: PathBuf,
    pub reports_dir: PathBuf,

    /// Reason recorded by the last failure transition
    pub error_message: Option<String>,
}

impl RunMetadata {
    /// Create metadata for a new run rooted at `run_dir`
    pub fn new(
        id: impl Into<String>,
        target: impl Into<String>,
        profile: impl Into<String>,
        engagement_mode: EngagementMode,
        run_dir: PathBuf,
    ) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            profile: profile.into(),
            engagement_mode,
            state: RunState::Pending,
            created_at: chrono::Utc::now().timestamp_millis(),
            started_at: None,
            completed_at: None,
            total_steps: 0,
            completed_steps: 0,
            failed_steps: 0,
            total_findings: 0,
            findings_by_severity: BTreeMap::new(),
            artifacts_dir: run_dir.join("artifacts"),
            evidence_dir: run_dir.join("evidence"),
            reports_dir: run_dir.join("reports"),
            run_dir,
            error_message: None,
        }
    }

    /// Share of steps that reached completed or failed, in percent
    pub fn progress_percentage(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.completed_steps + self.failed_steps) as f64 / self.total_steps as f64 * 100.0
    }

    /// Wall time between start and completion (or now, if still active)
    pub fn duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        let end = self
            .completed_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        Some(Duration::from_millis(end.saturating_sub(started).max(0) as u64))
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, RunState::Running | RunState::Paused)
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Generate a new run identifier
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
