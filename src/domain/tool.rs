//! Tool invocation settings and results

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Output format requested from a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

/// Settings for a single tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    /// Extra arguments appended after the built-in ones
    #[serde(default)]
    pub args: Vec<String>,
    /// Timeout in seconds
    pub timeout: u64,
    /// Per-host requests per second passed to tools that support it
    pub rate_limit: Option<f64>,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Where the raw tool output should be written
    pub output_path: Option<PathBuf>,
}

impl ToolConfig {
    pub fn new(name: impl Into<String>, timeout: u64) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            timeout,
            rate_limit: None,
            output_format: OutputFormat::default(),
            env: HashMap::new(),
            output_path: None,
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Raw result of running a tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
    pub output_path: Option<PathBuf>,
}

impl ToolResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
