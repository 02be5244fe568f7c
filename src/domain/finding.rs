//! Normalized security findings produced by tool output parsers

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "critical" | "crit" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" | "med" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "info" | "informational" | "unknown" => Some(Severity::Info),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How certain the tool is about a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Confirmed,
    Firm,
    #[default]
    Tentative,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Confirmed => "confirmed",
            Confidence::Firm => "firm",
            Confidence::Tentative => "tentative",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "confirmed" => Some(Confidence::Confirmed),
            "firm" => Some(Confidence::Firm),
            "tentative" => Some(Confidence::Tentative),
            _ => None,
        }
    }
}

/// A security-relevant fact discovered by a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    /// Owning run (stamped by the run state manager)
    pub run_id: String,
    /// Finding type, e.g. "xss", "sqli" or a nuclei template id
    #[serde(rename = "type")]
    pub finding_type: String,
    pub severity: Severity,
    pub confidence: Confidence,
    pub host: String,
    pub url: String,
    pub parameter: Option<String>,
    #[serde(default)]
    pub evidence_paths: Vec<PathBuf>,
    /// Tool that reported it
    pub tool: String,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub reproduction_steps: Option<String>,
    pub remediation: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

impl Finding {
    /// Create a finding with a fresh id and the current timestamp
    pub fn new(
        tool: impl Into<String>,
        finding_type: impl Into<String>,
        severity: Severity,
        url: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let host = host_of(&url);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: String::new(),
            finding_type: finding_type.into(),
            severity,
            confidence: Confidence::default(),
            host,
            url,
            parameter: None,
            evidence_paths: Vec::new(),
            tool: tool.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            title: None,
            description: None,
            reproduction_steps: None,
            remediation: None,
            references: Vec::new(),
        }
    }
}

fn host_of(raw: &str) -> String {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_aliases() {
        assert_eq!(Severity::from_str("CRIT"), Some(Severity::Critical));
        assert_eq!(Severity::from_str("unknown"), Some(Severity::Info));
        assert_eq!(Severity::from_str("bogus"), None);
    }

    #[test]
    fn test_new_finding_extracts_host() {
        let finding = Finding::new("nuclei", "exposure", Severity::High, "https://a.example.com/x?y=1");
        assert_eq!(finding.host, "a.example.com");
        assert_eq!(finding.confidence, Confidence::Tentative);
        assert!(finding.run_id.is_empty());
    }

    #[test]
    fn test_host_falls_back_to_raw_value() {
        let finding = Finding::new("subfinder", "info", Severity::Info, "a.example.com");
        assert_eq!(finding.host, "a.example.com");
    }
}
