//! Subprocess-backed adapter for the built-in tool kinds

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::ToolAdapter;
use super::kind::ToolKind;
use super::nuclei::{parse_dalfox, parse_nuclei};
use crate::domain::{Finding, ToolConfig, ToolResult};
use crate::error::{Error, Result};

/// Runs one external binary per invocation
pub struct CommandAdapter {
    kind: ToolKind,
    binary: PathBuf,
    /// Set when the binary comes from a tools directory instead of PATH
    pinned: bool,
    /// Availability, looked up once per adapter
    available: OnceLock<bool>,
}

impl CommandAdapter {
    /// Resolve the binary on PATH
    pub fn new(kind: ToolKind) -> Self {
        Self {
            kind,
            binary: PathBuf::from(kind.as_str()),
            pinned: false,
            available: OnceLock::new(),
        }
    }

    /// Use `{tools_dir}/bin/{name}` (or `{tools_dir}/{name}`) when present, else PATH
    pub fn with_tools_dir(kind: ToolKind, tools_dir: &Path) -> Self {
        let candidates = [
            tools_dir.join("bin").join(kind.as_str()),
            tools_dir.join(kind.as_str()),
        ];
        match candidates.into_iter().find(|p| p.is_file()) {
            Some(binary) => Self {
                kind,
                binary,
                pinned: true,
                available: OnceLock::new(),
            },
            None => Self::new(kind),
        }
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// sqlmap reads several targets from a file rather than stdin
    fn write_targets_file(&self, inputs: &[String], config: &ToolConfig) -> Result<Option<PathBuf>> {
        if self.kind != ToolKind::Sqlmap || inputs.len() < 2 {
            return Ok(None);
        }
        let dir = config
            .output_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}-targets-{}.txt", self.kind, uuid::Uuid::new_v4()));
        std::fs::write(&path, inputs.join("\n"))?;
        Ok(Some(path))
    }

    fn execution_error(&self, message: impl Into<String>) -> Error {
        Error::ToolExecution {
            tool: self.kind.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl ToolAdapter for CommandAdapter {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn run(&self, inputs: &[String], config: &ToolConfig) -> Result<ToolResult> {
        let targets_file = self.write_targets_file(inputs, config)?;
        let args = self.kind.build_args(inputs, config, targets_file.as_deref());
        tracing::debug!("Running {} {}", self.binary.display(), args.join(" "));

        let started = Instant::now();
        let mut child = Command::new(&self.binary)
            .args(&args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::ToolNotFound(self.kind.to_string()),
                _ => self.execution_error(format!("failed to spawn: {}", e)),
            })?;

        // Written from a task so a tool that emits output before draining
        // stdin cannot deadlock against us
        let stdin_task = child.stdin.take().map(|mut stdin| {
            let payload = if self.kind.reads_stdin() && !inputs.is_empty() {
                let mut joined = inputs.join("\n");
                joined.push('\n');
                joined
            } else {
                String::new()
            };
            tokio::spawn(async move {
                stdin.write_all(payload.as_bytes()).await.ok();
            })
        });

        let waited = tokio::time::timeout(config.timeout_duration(), child.wait_with_output()).await;
        if let Some(task) = stdin_task {
            task.abort();
        }
        if let Some(path) = &targets_file {
            std::fs::remove_file(path).ok();
        }

        // On timeout the child was dropped inside the future, and kill_on_drop reaps it
        let output = match waited {
            Ok(output) => output.map_err(|e| self.execution_error(e.to_string()))?,
            Err(_) => {
                return Err(Error::ToolTimeout {
                    tool: self.kind.to_string(),
                    timeout_secs: config.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if let Some(path) = &config.output_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &stdout)?;
        }

        Ok(ToolResult {
            tool: self.kind.to_string(),
            stdout,
            stderr,
            exit_code: output.status.code().unwrap_or(-1),
            duration: started.elapsed(),
            output_path: config.output_path.clone(),
        })
    }

    fn parse_output(&self, raw: &str) -> Vec<Finding> {
        match self.kind {
            ToolKind::Nuclei => parse_nuclei(raw),
            ToolKind::Dalfox => parse_dalfox(raw),
            _ => Vec::new(),
        }
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            if self.pinned {
                is_executable(&self.binary)
            } else {
                which::which(&self.binary).is_ok()
            }
        })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    /// Install a shell script as `{dir}/bin/{name}`
    fn install_script(dir: &Path, name: &str, body: &str) {
        let bin = dir.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let path = bin.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn test_runs_binary_with_stdin_inputs() {
        let dir = tempdir().unwrap();
        install_script(
            dir.path(),
            "dnsx",
            r#"while read host; do echo "{\"host\":\"$host\"}"; done"#,
        );
        let adapter = CommandAdapter::with_tools_dir(ToolKind::Dnsx, dir.path());
        assert!(adapter.is_available());

        let mut config = ToolConfig::new("dnsx", 10);
        config.output_path = Some(dir.path().join("out/dnsx.json"));
        let result = adapter
            .run(&["a.example.com".into(), "b.example.com".into()], &config)
            .await
            .unwrap();

        assert!(result.success());
        assert_eq!(
            adapter.extract_items(&result.stdout),
            vec!["a.example.com", "b.example.com"]
        );
        let written = std::fs::read_to_string(dir.path().join("out/dnsx.json")).unwrap();
        assert_eq!(written, result.stdout);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported_not_raised() {
        let dir = tempdir().unwrap();
        install_script(dir.path(), "httpx", "echo boom >&2; exit 3");
        let adapter = CommandAdapter::with_tools_dir(ToolKind::Httpx, dir.path());
        let result = adapter
            .run(&["a.com".into()], &ToolConfig::new("httpx", 10))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 3);
        assert!(result.stderr.contains("boom"));
    }

    #[tokio::test]
    async fn test_timeout_kills_tool() {
        let dir = tempdir().unwrap();
        install_script(dir.path(), "katana", "sleep 30");
        let adapter = CommandAdapter::with_tools_dir(ToolKind::Katana, dir.path());
        let err = adapter
            .run(&["http://a.com".into()], &ToolConfig::new("katana", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolTimeout { timeout_secs: 1, .. }));
    }

    #[test]
    fn test_availability_is_looked_up_once() {
        let dir = tempdir().unwrap();
        install_script(dir.path(), "gau", "exit 0");
        let adapter = CommandAdapter::with_tools_dir(ToolKind::Gau, dir.path());
        assert!(adapter.is_available());

        std::fs::remove_file(dir.path().join("bin/gau")).unwrap();
        assert!(adapter.is_available());
    }

    #[test]
    fn test_path_lookup_misses_unknown_binary() {
        let adapter = CommandAdapter {
            kind: ToolKind::Gau,
            binary: PathBuf::from("scanflow-no-such-tool"),
            pinned: false,
            available: OnceLock::new(),
        };
        assert!(!adapter.is_available());
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = tempdir().unwrap();
        let adapter = CommandAdapter::with_tools_dir(ToolKind::Ffuf, dir.path());
        assert_eq!(adapter.binary(), Path::new("ffuf"));

        let adapter = CommandAdapter {
            kind: ToolKind::Ffuf,
            binary: dir.path().join("bin/ffuf"),
            pinned: true,
            available: OnceLock::new(),
        };
        assert!(!adapter.is_available());
        let err = adapter
            .run(&["http://a.com".into()], &ToolConfig::new("ffuf", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }

    #[test]
    fn test_parse_output_dispatch() {
        let adapter = CommandAdapter::new(ToolKind::Httpx);
        assert!(adapter.parse_output(r#"{"template-id":"x"}"#).is_empty());
        let adapter = CommandAdapter::new(ToolKind::Nuclei);
        assert_eq!(adapter.parse_output(r#"{"template-id":"x"}"#).len(), 1);
    }
}
