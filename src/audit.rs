//! Append-only audit trail of security-relevant run events
//!
//! One JSON object per line in `{run_dir}/audit.log`:
//! `{"timestamp": "...", "run_id": "...", "event_type": "...", "details": {...}}`

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kinds of audited events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RunStart,
    RunFinish,
    ToolStart,
    ToolFinish,
    ScopeViolation,
    ModeChange,
    FeatureToggle,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::RunStart => "run_start",
            AuditEventType::RunFinish => "run_finish",
            AuditEventType::ToolStart => "tool_start",
            AuditEventType::ToolFinish => "tool_finish",
            AuditEventType::ScopeViolation => "scope_violation",
            AuditEventType::ModeChange => "mode_change",
            AuditEventType::FeatureToggle => "feature_toggle",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
}

/// Writer for a single run's audit log
#[derive(Debug)]
pub struct AuditLogger {
    run_id: String,
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLogger {
    /// Open (or create) `audit.log` inside `dir` in append mode
    pub fn new(run_id: impl Into<String>, dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::Audit(format!(
                "Failed to create audit directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        let path = dir.join("audit.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                Error::Audit(format!(
                    "Failed to open audit log {}: {}",
                    path.display(),
                    e
                ))
            })?;

        Ok(Self {
            run_id: run_id.into(),
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event
    pub fn log_event(&self, event_type: AuditEventType, details: serde_json::Value) -> Result<()> {
        let event = AuditEvent {
            timestamp: Utc::now(),
            run_id: self.run_id.clone(),
            event_type,
            details,
        };
        let line = serde_json::to_string(&event)?;

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(file, "{}", line)
            .and_then(|_| file.flush())
            .map_err(|e| Error::Audit(format!("Failed to write {} event: {}", event_type, e)))
    }
}

/// Read all events from an audit log, skipping malformed lines
pub fn read_events(path: &Path) -> Result<Vec<AuditEvent>> {
    let file = File::open(path)?;
    let mut events = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(event) => events.push(event),
            Err(e) => tracing::debug!("Skipping malformed audit line: {}", e),
        }
    }
    Ok(events)
}
