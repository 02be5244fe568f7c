//! On-disk directory layout of a run
//!
//! ```text
//! {run_dir}/
//!   artifacts/{stage}/...
//!   evidence/{screenshots,requests,responses}/
//!   reports/
//!   audit.log
//! ```

use std::path::{Path, PathBuf};

use crate::domain::{PipelineStage, RunMetadata};

const EVIDENCE_SUBDIRS: [&str; 3] = ["screenshots", "requests", "responses"];

/// Paths of one run's directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub run_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub evidence_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl RunLayout {
    /// Layout for `run_id` under the runs root directory
    pub fn new(runs_root: &Path, run_id: &str) -> Self {
        Self::at(runs_root.join(run_id))
    }

    pub fn at(run_dir: PathBuf) -> Self {
        Self {
            artifacts_dir: run_dir.join("artifacts"),
            evidence_dir: run_dir.join("evidence"),
            reports_dir: run_dir.join("reports"),
            run_dir,
        }
    }

    pub fn from_metadata(run: &RunMetadata) -> Self {
        Self {
            run_dir: run.run_dir.clone(),
            artifacts_dir: run.artifacts_dir.clone(),
            evidence_dir: run.evidence_dir.clone(),
            reports_dir: run.reports_dir.clone(),
        }
    }

    /// Create every directory of the layout; safe to call repeatedly
    pub fn create(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.artifacts_dir)?;
        for sub in EVIDENCE_SUBDIRS {
            std::fs::create_dir_all(self.evidence_dir.join(sub))?;
        }
        std::fs::create_dir_all(&self.reports_dir)?;
        Ok(())
    }

    pub fn stage_dir(&self, stage: PipelineStage) -> PathBuf {
        self.artifacts_dir.join(stage.as_str())
    }

    /// Path of a stage's artifact file (the stage directory is not created)
    pub fn artifact_path(&self, stage: PipelineStage, filename: &str) -> PathBuf {
        self.stage_dir(stage).join(filename)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.run_dir.join("audit.log")
    }
}
