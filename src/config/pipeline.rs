//! Per-run pipeline configuration

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::profile::ScanProfile;
use crate::domain::{EngagementMode, ModeLimits, PipelineStage};
use crate::error::{Error, Result};

/// What a run executes and under which limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stages in execution order; must respect stage dependencies
    pub stages: Vec<PipelineStage>,
    pub profile: String,
    pub engagement_mode: EngagementMode,
    /// Scheduler worker count
    pub concurrency: usize,
    /// Global requests per second
    pub rate_limit_global: f64,
    /// Requests per second against one host, passed on to tools
    pub rate_limit_per_host: f64,
    /// Per-tool timeout in seconds
    pub timeout: u64,
    /// Fail the run as soon as one stage fails
    pub stop_on_failure: bool,
    /// Treat audit log write failures as fatal
    pub strict_audit: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: PipelineStage::ALL.to_vec(),
            profile: "standard".to_string(),
            engagement_mode: EngagementMode::default(),
            concurrency: 10,
            rate_limit_global: 30.0,
            rate_limit_per_host: 5.0,
            timeout: 300,
            stop_on_failure: false,
            strict_audit: false,
        }
    }
}

impl PipelineConfig {
    /// Build the stage list for a profile under an engagement mode's limits.
    ///
    /// Tools map to their stages (duplicates collapse), stages are put in
    /// dependency order, and URL classification is inserted before the first
    /// testing stage when any testing stage is present.
    pub fn standard(
        profile_name: &str,
        profile: &ScanProfile,
        engagement_mode: EngagementMode,
        limits: &ModeLimits,
    ) -> Result<Self> {
        let mut stages = Vec::new();
        for tool in &profile.steps {
            let stage = PipelineStage::for_tool(tool).ok_or_else(|| {
                Error::Config(format!(
                    "profile '{}' references unknown tool '{}'",
                    profile_name, tool
                ))
            })?;
            if !stages.contains(&stage) {
                stages.push(stage);
            }
        }
        stages.sort();

        if let Some(first_testing) = stages.iter().position(|s| s.is_testing()) {
            stages.insert(first_testing, PipelineStage::UrlClassification);
        }

        let config = Self {
            stages,
            profile: profile_name.to_string(),
            engagement_mode,
            concurrency: limits.concurrency,
            rate_limit_global: limits.global,
            rate_limit_per_host: limits.per_host,
            timeout: profile.timeout,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject limits the engine cannot run with and stage lists that break dependency order
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        for (name, value) in [
            ("rate_limit_global", self.rate_limit_global),
            ("rate_limit_per_host", self.rate_limit_per_host),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if self.timeout == 0 {
            return Err(Error::Config("timeout must be at least 1 second".to_string()));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(*stage) {
                return Err(Error::Config(format!("stage {} listed twice", stage)));
            }
        }

        // A dependency that is part of the run must come first
        for (index, stage) in self.stages.iter().enumerate() {
            for dep in stage.dependencies() {
                if let Some(dep_index) = self.stages.iter().position(|s| s == dep) {
                    if dep_index > index {
                        return Err(Error::Config(format!(
                            "stage {} is listed before its dependency {}",
                            stage, dep
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn mode_limits(&self) -> ModeLimits {
        ModeLimits {
            global: self.rate_limit_global,
            per_host: self.rate_limit_per_host,
            concurrency: self.concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ModeLimits {
        EngagementMode::Bugbounty.default_limits()
    }

    #[test]
    fn test_standard_profile_inserts_classification() {
        let config = PipelineConfig::standard(
            "standard",
            &ScanProfile::standard(),
            EngagementMode::Bugbounty,
            &limits(),
        )
        .unwrap();
        assert_eq!(
            config.stages,
            vec![
                PipelineStage::SubdomainEnum,
                PipelineStage::DnsResolution,
                PipelineStage::HttpProbing,
                PipelineStage::WebCrawling,
                PipelineStage::UrlClassification,
                PipelineStage::VulnScanning,
            ]
        );
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.rate_limit_global, 30.0);
        assert_eq!(config.rate_limit_per_host, 5.0);
        assert_eq!(config.timeout, 1800);
    }

    #[test]
    fn test_quick_profile_has_no_classification() {
        let config = PipelineConfig::standard(
            "quick",
            &ScanProfile::quick(),
            EngagementMode::Aggressive,
            &EngagementMode::Aggressive.default_limits(),
        )
        .unwrap();
        assert_eq!(config.stages.len(), 3);
        assert!(!config.stages.contains(&PipelineStage::UrlClassification));
        assert_eq!(config.concurrency, 100);
    }

    #[test]
    fn test_out_of_order_profile_steps_are_sorted() {
        let mut profile = ScanProfile::quick();
        profile.steps = vec!["sqlmap".into(), "httpx".into(), "dalfox".into()];
        let config =
            PipelineConfig::standard("custom", &profile, EngagementMode::Bugbounty, &limits())
                .unwrap();
        assert_eq!(
            config.stages,
            vec![
                PipelineStage::HttpProbing,
                PipelineStage::UrlClassification,
                PipelineStage::XssTesting,
                PipelineStage::SqliTesting,
            ]
        );
    }

    #[test]
    fn test_unknown_tool_is_config_error() {
        let mut profile = ScanProfile::quick();
        profile.steps.push("masscan".into());
        let err = PipelineConfig::standard("bad", &profile, EngagementMode::Bugbounty, &limits())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            PipelineConfig {
                concurrency: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                rate_limit_global: 0.0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                rate_limit_per_host: f64::INFINITY,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                timeout: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                stages: vec![PipelineStage::DnsResolution, PipelineStage::DnsResolution],
                ..PipelineConfig::default()
            },
            PipelineConfig {
                stages: vec![PipelineStage::HttpProbing, PipelineStage::DnsResolution],
                ..PipelineConfig::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?}", config);
        }
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_missing_dependency_is_allowed() {
        // Dependency gating handles absent upstream stages at run time
        let config = PipelineConfig {
            stages: vec![PipelineStage::HttpProbing],
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
