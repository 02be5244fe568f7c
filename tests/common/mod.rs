//! Shared test utilities: in-process tool adapters and pipeline fixtures

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use scanflow::config::PipelineConfig;
use scanflow::storage::{MemoryStore, RunStore};
use scanflow::tools::{ToolAdapter, ToolRegistry};
use scanflow::{
    Error, Finding, PipelineOrchestrator, PipelineStage, Result, Severity, ToolConfig, ToolResult,
};

/// Tool adapter that answers from memory and records every invocation
pub struct FakeTool {
    name: String,
    available: bool,
    output: Vec<String>,
    exit_code: i32,
    error: Option<String>,
    delay: Duration,
    findings: usize,
    squat: Option<String>,
    calls: Mutex<Vec<Vec<String>>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            available: true,
            output: Vec::new(),
            exit_code: 0,
            error: None,
            delay: Duration::ZERO,
            findings: 0,
            squat: None,
            calls: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Lines printed on stdout
    pub fn output(mut self, lines: &[&str]) -> Self {
        self.output = lines.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Fail every run with an execution error
    pub fn failing(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of findings reported per run (when there is output)
    pub fn findings(mut self, count: usize) -> Self {
        self.findings = count;
        self
    }

    /// Create a directory named `name` next to the raw output file
    pub fn squat(mut self, name: &str) -> Self {
        self.squat = Some(name.to_string());
        self
    }

    /// Share concurrency counters with other fakes
    pub fn counters(mut self, active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Self {
        self.active = active;
        self.peak = peak;
        self
    }

    /// Inputs of every invocation so far
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ToolAdapter for FakeTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, inputs: &[String], config: &ToolConfig) -> Result<ToolResult> {
        self.calls.lock().unwrap().push(inputs.to_vec());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(message) = &self.error {
            return Err(Error::ToolExecution {
                tool: self.name.clone(),
                message: message.clone(),
            });
        }

        let stdout = self.output.join("\n");
        if let Some(path) = &config.output_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &stdout)?;
            if let (Some(name), Some(parent)) = (&self.squat, path.parent()) {
                std::fs::create_dir_all(parent.join(name))?;
            }
        }

        Ok(ToolResult {
            tool: self.name.clone(),
            stdout,
            stderr: if self.exit_code == 0 {
                String::new()
            } else {
                format!("{}: something went wrong", self.name)
            },
            exit_code: self.exit_code,
            duration: self.delay,
            output_path: config.output_path.clone(),
        })
    }

    fn parse_output(&self, raw: &str) -> Vec<Finding> {
        if raw.trim().is_empty() {
            return Vec::new();
        }
        (0..self.findings)
            .map(|i| {
                let mut finding = Finding::new(
                    self.name.clone(),
                    "test-finding",
                    if i == 0 { Severity::High } else { Severity::Low },
                    format!("https://a.example.com/finding/{}", i),
                );
                finding.title = Some(format!("{} finding {}", self.name, i));
                finding
            })
            .collect()
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

/// The nine built-in tool names with outputs that flow through every stage
pub fn recon_tools() -> Vec<FakeTool> {
    vec![
        FakeTool::new("subfinder").output(&["a.example.com", "b.example.com"]),
        FakeTool::new("dnsx").output(&["a.example.com", "b.example.com"]),
        FakeTool::new("httpx").output(&["https://a.example.com", "https://b.example.com"]),
        FakeTool::new("katana").output(&[
            "https://a.example.com/search?q=test",
            "https://a.example.com/item?id=1",
            "https://a.example.com/logo.png",
        ]),
        FakeTool::new("gau").output(&[
            "https://b.example.com/redirect?url=https://other.example.org",
            "https://a.example.com/search?q=test",
        ]),
        FakeTool::new("nuclei").output(&["nuclei-hit"]).findings(2),
        FakeTool::new("dalfox").output(&["dalfox-hit"]).findings(1),
        FakeTool::new("ffuf").output(&["https://a.example.com/admin"]),
        FakeTool::new("sqlmap").output(&["sqlmap-hit"]).findings(1),
    ]
}

/// Fakes by name, for asserting on invocations after a run
pub struct Tools(pub Vec<Arc<FakeTool>>);

impl Tools {
    pub fn new(tools: Vec<FakeTool>) -> Self {
        Self(tools.into_iter().map(Arc::new).collect())
    }

    /// Replace the fake registered under the same name
    pub fn replace(mut self, tool: FakeTool) -> Self {
        self.0.retain(|t| t.name() != tool.name());
        self.0.push(Arc::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Arc<FakeTool> {
        self.0
            .iter()
            .find(|t| t.name() == name)
            .cloned()
            .unwrap_or_else(|| panic!("no fake tool named {}", name))
    }

    pub fn registry(&self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for tool in &self.0 {
            registry.register(tool.clone());
        }
        registry
    }

    pub fn total_calls(&self) -> usize {
        self.0.iter().map(|t| t.call_count()).sum()
    }
}

/// Pipeline over `stages` with limits high enough not to slow tests down
pub fn pipeline(stages: &[PipelineStage]) -> PipelineConfig {
    PipelineConfig {
        stages: stages.to_vec(),
        profile: "test".to_string(),
        concurrency: 4,
        rate_limit_global: 1000.0,
        rate_limit_per_host: 100.0,
        timeout: 10,
        ..PipelineConfig::default()
    }
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

pub fn orchestrator(
    config: PipelineConfig,
    tools: &Tools,
    store: Arc<dyn RunStore>,
    runs_root: &Path,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(config, tools.registry(), store, runs_root).unwrap()
}
