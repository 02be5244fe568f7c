//! CLI command implementations

pub mod init;
pub mod run;
pub mod stages;
pub mod status;
pub mod tool;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use scanflow::config::{Config, PipelineConfig};
use scanflow::storage::SqliteStore;
use scanflow::tools::ToolRegistry;
use scanflow::PipelineOrchestrator;

/// Load `--config` if given, else the global config, else built-in defaults
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    Config::load(config_path)
}

pub fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = config.database_path();
    SqliteStore::open(&path)
        .with_context(|| format!("Failed to open run database: {}", path.display()))
}

pub fn tool_registry(config: &Config) -> ToolRegistry {
    ToolRegistry::with_defaults(config.settings.tools_dir.as_deref())
}

/// Orchestrator wired to the SQLite store and the built-in tool adapters
pub fn build_orchestrator(config: &Config, pipeline: PipelineConfig) -> Result<PipelineOrchestrator> {
    let store = open_store(config)?;
    let orchestrator = PipelineOrchestrator::new(
        pipeline,
        tool_registry(config),
        Arc::new(store),
        config.runs_dir(),
    )?;
    Ok(orchestrator)
}

/// Human-readable duration, e.g. `1h 02m 03s`
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}.{:01}s", s, duration.subsec_millis() / 100)
    }
}
