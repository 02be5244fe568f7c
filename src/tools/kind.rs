//! The closed set of external tools the pipeline knows how to drive

use std::path::Path;

use crate::domain::{OutputFormat, PipelineStage, ToolConfig};

/// Every tool the engine can invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Subfinder,
    Dnsx,
    Httpx,
    Katana,
    Gau,
    Nuclei,
    Dalfox,
    Ffuf,
    Sqlmap,
}

impl ToolKind {
    pub const ALL: [ToolKind; 9] = [
        ToolKind::Subfinder,
        ToolKind::Dnsx,
        ToolKind::Httpx,
        ToolKind::Katana,
        ToolKind::Gau,
        ToolKind::Nuclei,
        ToolKind::Dalfox,
        ToolKind::Ffuf,
        ToolKind::Sqlmap,
    ];

    /// Tool name, which is also the binary name
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Subfinder => "subfinder",
            ToolKind::Dnsx => "dnsx",
            ToolKind::Httpx => "httpx",
            ToolKind::Katana => "katana",
            ToolKind::Gau => "gau",
            ToolKind::Nuclei => "nuclei",
            ToolKind::Dalfox => "dalfox",
            ToolKind::Ffuf => "ffuf",
            ToolKind::Sqlmap => "sqlmap",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn stage(&self) -> Option<PipelineStage> {
        PipelineStage::for_tool(self.as_str())
    }

    pub fn output_format(&self) -> OutputFormat {
        match self {
            ToolKind::Gau | ToolKind::Sqlmap => OutputFormat::Text,
            _ => OutputFormat::Json,
        }
    }

    /// Whether inputs are written to the child's stdin
    pub fn reads_stdin(&self) -> bool {
        !matches!(self, ToolKind::Ffuf | ToolKind::Sqlmap)
    }

    /// Command-line arguments for one invocation.
    ///
    /// `targets_file` is only consulted by tools that take their targets
    /// from a file (sqlmap with more than one URL).
    pub fn build_args(
        &self,
        inputs: &[String],
        config: &ToolConfig,
        targets_file: Option<&Path>,
    ) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        let timeout = config.timeout.to_string();

        match self {
            ToolKind::Subfinder | ToolKind::Dnsx => {
                args.extend(["-json", "-silent", "-timeout"].map(String::from));
                args.push(timeout);
            }
            ToolKind::Httpx | ToolKind::Katana => {
                args.extend(["-json", "-silent", "-timeout"].map(String::from));
                args.push(timeout);
                push_rate(&mut args, "-rate-limit", config.rate_limit);
            }
            ToolKind::Nuclei => {
                args.extend(["-jsonl", "-silent", "-timeout"].map(String::from));
                args.push(timeout);
                push_rate(&mut args, "-rate-limit", config.rate_limit);
            }
            ToolKind::Gau => {
                args.extend(["--threads", "2"].map(String::from));
            }
            ToolKind::Dalfox => {
                args.extend(["pipe", "--format", "json", "--silence", "--timeout"].map(String::from));
                args.push(timeout);
                // dalfox throttles with a per-request delay in milliseconds
                if let Some(rate) = config.rate_limit.filter(|r| *r > 0.0) {
                    args.push("--delay".to_string());
                    args.push(((1000.0 / rate) as u64).to_string());
                }
            }
            ToolKind::Ffuf => {
                args.extend(["-json", "-s", "-maxtime"].map(String::from));
                args.push(timeout);
                push_rate(&mut args, "-rate", config.rate_limit);
                if let Some(url) = inputs.first() {
                    args.push("-u".to_string());
                    args.push(fuzz_url(url));
                }
            }
            ToolKind::Sqlmap => {
                args.extend(["--batch", "--random-agent", "--timeout"].map(String::from));
                args.push(timeout);
                if let Some(rate) = config.rate_limit {
                    let threads = (rate as u64).clamp(1, 10);
                    args.push("--threads".to_string());
                    args.push(threads.to_string());
                }
                if let Some(dir) = config.output_path.as_deref().and_then(Path::parent) {
                    args.push(format!("--output-dir={}", dir.join("sqlmap").display()));
                }
                match (targets_file, inputs) {
                    (Some(file), _) => {
                        args.push("-m".to_string());
                        args.push(file.display().to_string());
                    }
                    (None, [first, ..]) => {
                        args.push("-u".to_string());
                        args.push(first.clone());
                    }
                    (None, []) => {}
                }
            }
        }

        args.extend(config.args.iter().cloned());
        args
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn push_rate(args: &mut Vec<String>, flag: &str, rate: Option<f64>) {
    if let Some(rate) = rate {
        args.push(flag.to_string());
        args.push(format!("{}", rate.max(1.0).round() as u64));
    }
}

/// ffuf needs a FUZZ keyword; append it as a path segment when missing
fn fuzz_url(url: &str) -> String {
    if url.contains("FUZZ") {
        url.to_string()
    } else if url.ends_with('/') {
        format!("{}FUZZ", url)
    } else {
        format!("{}/FUZZ", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(rate: Option<f64>) -> ToolConfig {
        let mut config = ToolConfig::new("x", 60);
        config.rate_limit = rate;
        config
    }

    #[test]
    fn test_every_kind_maps_to_a_stage() {
        for kind in ToolKind::ALL {
            assert!(kind.stage().is_some(), "{}", kind);
            assert_eq!(ToolKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ToolKind::from_str("Nuclei"), Some(ToolKind::Nuclei));
        assert_eq!(ToolKind::from_str("masscan"), None);
    }

    #[test]
    fn test_httpx_args() {
        let mut cfg = config(Some(5.0));
        cfg.args = vec!["-follow-redirects".into()];
        let args = ToolKind::Httpx.build_args(&["a.com".into()], &cfg, None);
        assert_eq!(
            args,
            vec!["-json", "-silent", "-timeout", "60", "-rate-limit", "5", "-follow-redirects"]
        );
    }

    #[test]
    fn test_dalfox_delay_from_rate() {
        let args = ToolKind::Dalfox.build_args(&[], &config(Some(4.0)), None);
        assert_eq!(args[0], "pipe");
        let delay = args.iter().position(|a| a == "--delay").unwrap();
        assert_eq!(args[delay + 1], "250");
    }

    #[test]
    fn test_ffuf_appends_fuzz_keyword() {
        let args = ToolKind::Ffuf.build_args(&["https://e.com/app".into()], &config(None), None);
        assert!(args.contains(&"https://e.com/app/FUZZ".to_string()));
        assert_eq!(fuzz_url("https://e.com/FUZZ?x=1"), "https://e.com/FUZZ?x=1");
        assert!(!ToolKind::Ffuf.reads_stdin());
    }

    #[test]
    fn test_sqlmap_targets() {
        let single = ToolKind::Sqlmap.build_args(&["http://e.com/?id=1".into()], &config(Some(30.0)), None);
        assert!(single.windows(2).any(|w| w == ["-u", "http://e.com/?id=1"]));
        assert!(single.windows(2).any(|w| w == ["--threads", "10"]));

        let file = PathBuf::from("/tmp/targets.txt");
        let bulk = ToolKind::Sqlmap.build_args(
            &["http://a/?id=1".into(), "http://b/?id=2".into()],
            &config(None),
            Some(&file),
        );
        assert!(bulk.windows(2).any(|w| w == ["-m", "/tmp/targets.txt"]));
    }
}
