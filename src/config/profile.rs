//! Scan profiles: named tool selections with execution parameters

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A named selection of tools and how hard to run them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanProfile {
    #[serde(default)]
    pub description: String,

    /// Tool names in execution order
    pub steps: Vec<String>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Requests per second, written as "30/s" or "30"
    #[serde(default = "default_rate_limit")]
    pub rate_limit: String,

    /// Per-tool timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub use_cases: Vec<String>,
}

fn default_concurrency() -> usize {
    10
}

fn default_rate_limit() -> String {
    "30/s".to_string()
}

fn default_timeout() -> u64 {
    1800
}

impl ScanProfile {
    fn builtin(description: &str, steps: &[&str], rate_limit: &str, timeout: u64) -> Self {
        Self {
            description: description.to_string(),
            steps: steps.iter().map(|s| s.to_string()).collect(),
            concurrency: default_concurrency(),
            rate_limit: rate_limit.to_string(),
            timeout,
            use_cases: Vec::new(),
        }
    }

    /// Fast reconnaissance only
    pub fn quick() -> Self {
        Self::builtin(
            "Fast reconnaissance only",
            &["subfinder", "dnsx", "httpx"],
            "50/s",
            300,
        )
    }

    /// Reconnaissance plus template-based vulnerability scanning
    pub fn standard() -> Self {
        Self::builtin(
            "Balanced recon + vuln scan",
            &["subfinder", "dnsx", "httpx", "katana", "gau", "nuclei"],
            "30/s",
            1800,
        )
    }

    /// Every stage, including injection testing
    pub fn deep() -> Self {
        Self::builtin(
            "Full pipeline with injection testing",
            &[
                "subfinder", "dnsx", "httpx", "katana", "gau", "nuclei", "dalfox", "ffuf", "sqlmap",
            ],
            "10/s",
            7200,
        )
    }

    /// Built-in profile by name
    pub fn builtin_named(name: &str) -> Option<Self> {
        match name {
            "quick" => Some(Self::quick()),
            "standard" => Some(Self::standard()),
            "deep" => Some(Self::deep()),
            _ => None,
        }
    }

    /// Parse `rate_limit` into requests per second
    pub fn rate_limit_value(&self) -> Result<f64> {
        let raw = self.rate_limit.trim();
        let number = raw.strip_suffix("/s").unwrap_or(raw).trim();
        match number.parse::<f64>() {
            Ok(value) if value.is_finite() && value > 0.0 => Ok(value),
            _ => Err(Error::Config(format!(
                "invalid rate limit '{}', expected e.g. \"30/s\"",
                self.rate_limit
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_parsing() {
        let mut profile = ScanProfile::standard();
        assert_eq!(profile.rate_limit_value().unwrap(), 30.0);
        profile.rate_limit = "12".into();
        assert_eq!(profile.rate_limit_value().unwrap(), 12.0);
        profile.rate_limit = " 7.5/s ".into();
        assert_eq!(profile.rate_limit_value().unwrap(), 7.5);
        profile.rate_limit = "fast".into();
        assert!(profile.rate_limit_value().is_err());
        profile.rate_limit = "0/s".into();
        assert!(profile.rate_limit_value().is_err());
    }

    #[test]
    fn test_builtin_profiles() {
        assert_eq!(ScanProfile::builtin_named("quick").unwrap().steps.len(), 3);
        assert_eq!(ScanProfile::builtin_named("deep").unwrap().timeout, 7200);
        assert!(ScanProfile::builtin_named("custom").is_none());
    }

    #[test]
    fn test_profile_defaults_from_toml() {
        let profile: ScanProfile = toml::from_str(r#"steps = ["subfinder", "httpx"]"#).unwrap();
        assert_eq!(profile.concurrency, 10);
        assert_eq!(profile.rate_limit, "30/s");
        assert_eq!(profile.timeout, 1800);
    }
}
