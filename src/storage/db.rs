//! SQLite-backed run store
//!
//! Lives at `{data_dir}/scanflow.db` by default. WAL mode lets status
//! commands read while a run is writing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Row, params};

use super::RunStore;
use crate::domain::{
    Confidence, EngagementMode, Finding, PipelineStep, RunMetadata, RunState, Severity,
    StepStatus,
};
use crate::error::Result;

/// Database wrapper for run data
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA_SQL)?;

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |r| r.get(0),
            )
            .unwrap_or(0);
        tracing::debug!("Run database schema version {}", version);

        Ok(())
    }
}

impl RunStore for SqliteStore {
    fn save_run(&self, run: &RunMetadata) -> Result<()> {
        let severity_json = serde_json::to_string(&run.findings_by_severity)?;
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO runs (
                id, target, profile, engagement_mode, state,
                created_at, started_at, completed_at,
                total_steps, completed_steps, failed_steps, total_findings,
                findings_by_severity_json, run_dir, artifacts_dir, evidence_dir, reports_dir,
                error_message
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            ON CONFLICT(id) DO UPDATE SET
                target = excluded.target,
                profile = excluded.profile,
                engagement_mode = excluded.engagement_mode,
                state = excluded.state,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                total_steps = excluded.total_steps,
                completed_steps = excluded.completed_steps,
                failed_steps = excluded.failed_steps,
                total_findings = excluded.total_findings,
                findings_by_severity_json = excluded.findings_by_severity_json,
                run_dir = excluded.run_dir,
                artifacts_dir = excluded.artifacts_dir,
                evidence_dir = excluded.evidence_dir,
                reports_dir = excluded.reports_dir,
                error_message = excluded.error_message
            "#,
            params![
                run.id,
                run.target,
                run.profile,
                run.engagement_mode.as_str(),
                run.state.as_str(),
                run.created_at,
                run.started_at,
                run.completed_at,
                run.total_steps as i64,
                run.completed_steps as i64,
                run.failed_steps as i64,
                run.total_findings as i64,
                severity_json,
                path_text(&run.run_dir),
                path_text(&run.artifacts_dir),
                path_text(&run.evidence_dir),
                path_text(&run.reports_dir),
                run.error_message,
            ],
        )?;
        Ok(())
    }

    fn get_run(&self, run_id: &str) -> Result<Option<RunMetadata>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS))?;

        match stmt.query_row(params![run_id], run_from_row) {
            Ok(run) => Ok(Some(run)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<RunMetadata>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn save_step(&self, run_id: &str, step: &PipelineStep) -> Result<()> {
        let conn = self.conn();
        // Upsert keeps the original rowid, which preserves registration order
        conn.execute(
            r#"
            INSERT INTO run_steps (
                run_id, name, status, started_at, completed_at, duration_ms,
                output_path, findings_count, exit_code, error_message
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(run_id, name) DO UPDATE SET
                status = excluded.status,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                duration_ms = excluded.duration_ms,
                output_path = excluded.output_path,
                findings_count = excluded.findings_count,
                exit_code = excluded.exit_code,
                error_message = excluded.error_message
            "#,
            params![
                run_id,
                step.name,
                step.status.as_str(),
                step.started_at,
                step.completed_at,
                step.duration_ms.map(|d| d as i64),
                step.output_path.as_deref().map(path_text),
                step.findings_count as i64,
                step.exit_code,
                step.error_message,
            ],
        )?;
        Ok(())
    }

    fn get_steps(&self, run_id: &str) -> Result<Vec<PipelineStep>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT name, status, started_at, completed_at, duration_ms,
                   output_path, findings_count, exit_code, error_message
            FROM run_steps WHERE run_id = ?1 ORDER BY rowid
            "#,
        )?;
        let steps = stmt
            .query_map(params![run_id], |row| {
                Ok(PipelineStep {
                    name: row.get(0)?,
                    status: parse_column(row, 1, StepStatus::from_str)?,
                    started_at: row.get(2)?,
                    completed_at: row.get(3)?,
                    duration_ms: row.get::<_, Option<i64>>(4)?.map(|d| d.max(0) as u64),
                    output_path: row.get::<_, Option<String>>(5)?.map(PathBuf::from),
                    findings_count: row.get::<_, i64>(6)?.max(0) as usize,
                    exit_code: row.get(7)?,
                    error_message: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(steps)
    }

    fn save_findings(&self, findings: &[Finding]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO findings (
                    id, run_id, type, severity, confidence, host, url, parameter,
                    evidence_paths_json, tool, timestamp, title, description,
                    reproduction_steps, remediation, references_json
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                "#,
            )?;
            for finding in findings {
                stmt.execute(params![
                    finding.id,
                    finding.run_id,
                    finding.finding_type,
                    finding.severity.as_str(),
                    finding.confidence.as_str(),
                    finding.host,
                    finding.url,
                    finding.parameter,
                    serde_json::to_string(&finding.evidence_paths)?,
                    finding.tool,
                    finding.timestamp,
                    finding.title,
                    finding.description,
                    finding.reproduction_steps,
                    finding.remediation,
                    serde_json::to_string(&finding.references)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_findings(&self, run_id: &str) -> Result<Vec<Finding>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, run_id, type, severity, confidence, host, url, parameter,
                   evidence_paths_json, tool, timestamp, title, description,
                   reproduction_steps, remediation, references_json
            FROM findings WHERE run_id = ?1 ORDER BY timestamp, rowid
            "#,
        )?;
        let findings = stmt
            .query_map(params![run_id], |row| {
                Ok(Finding {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    finding_type: row.get(2)?,
                    severity: parse_column(row, 3, Severity::from_str)?,
                    confidence: parse_column(row, 4, Confidence::from_str)?,
                    host: row.get(5)?,
                    url: row.get(6)?,
                    parameter: row.get(7)?,
                    evidence_paths: row
                        .get::<_, Option<String>>(8)?
                        .and_then(|s| serde_json::from_str(&s).ok())
                        .unwrap_or_default(),
                    tool: row.get(9)?,
                    timestamp: row.get(10)?,
                    title: row.get(11)?,
                    description: row.get(12)?,
                    reproduction_steps: row.get(13)?,
                    remediation: row.get(14)?,
                    references: row
                        .get::<_, Option<String>>(15)?
                        .and_then(|s| serde_json::from_str(&s).ok())
                        .unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(findings)
    }
}

const RUN_COLUMNS: &str = "id, target, profile, engagement_mode, state, created_at, started_at, \
     completed_at, total_steps, completed_steps, failed_steps, total_findings, \
     findings_by_severity_json, run_dir, artifacts_dir, evidence_dir, reports_dir, error_message";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunMetadata> {
    let findings_by_severity: BTreeMap<Severity, usize> = row
        .get::<_, Option<String>>(12)?
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    Ok(RunMetadata {
        id: row.get(0)?,
        target: row.get(1)?,
        profile: row.get(2)?,
        engagement_mode: parse_column(row, 3, EngagementMode::from_str)?,
        state: parse_column(row, 4, RunState::from_str)?,
        created_at: row.get(5)?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
        total_steps: row.get::<_, i64>(8)?.max(0) as usize,
        completed_steps: row.get::<_, i64>(9)?.max(0) as usize,
        failed_steps: row.get::<_, i64>(10)?.max(0) as usize,
        total_findings: row.get::<_, i64>(11)?.max(0) as usize,
        findings_by_severity,
        run_dir: PathBuf::from(row.get::<_, String>(13)?),
        artifacts_dir: PathBuf::from(row.get::<_, String>(14)?),
        evidence_dir: PathBuf::from(row.get::<_, String>(15)?),
        reports_dir: PathBuf::from(row.get::<_, String>(16)?),
        error_message: row.get(17)?,
    })
}

/// Read a text column through one of the domain `from_str` parsers
fn parse_column<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let value: String = row.get(idx)?;
    parse(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unrecognized value '{}'", value).into(),
        )
    })
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
INSERT OR IGNORE INTO schema_version VALUES (1);

CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    target TEXT NOT NULL,
    profile TEXT NOT NULL,
    engagement_mode TEXT NOT NULL,
    state TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    started_at INTEGER,
    completed_at INTEGER,
    total_steps INTEGER NOT NULL DEFAULT 0,
    completed_steps INTEGER NOT NULL DEFAULT 0,
    failed_steps INTEGER NOT NULL DEFAULT 0,
    total_findings INTEGER NOT NULL DEFAULT 0,
    findings_by_severity_json TEXT,
    run_dir TEXT NOT NULL,
    artifacts_dir TEXT NOT NULL,
    evidence_dir TEXT NOT NULL,
    reports_dir TEXT NOT NULL,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_created ON runs(created_at);
CREATE INDEX IF NOT EXISTS idx_runs_state ON runs(state);

CREATE TABLE IF NOT EXISTS run_steps (
    run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at INTEGER,
    completed_at INTEGER,
    duration_ms INTEGER,
    output_path TEXT,
    findings_count INTEGER NOT NULL DEFAULT 0,
    exit_code INTEGER,
    error_message TEXT,
    PRIMARY KEY (run_id, name)
);

CREATE TABLE IF NOT EXISTS findings (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    type TEXT NOT NULL,
    severity TEXT NOT NULL,
    confidence TEXT NOT NULL,
    host TEXT NOT NULL,
    url TEXT NOT NULL,
    parameter TEXT,
    evidence_paths_json TEXT,
    tool TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    title TEXT,
    description TEXT,
    reproduction_steps TEXT,
    remediation TEXT,
    references_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_findings_run ON findings(run_id);
CREATE INDEX IF NOT EXISTS idx_findings_severity ON findings(severity);
"#;
