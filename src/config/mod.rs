//! Configuration loading and management

mod pipeline;
mod profile;

pub use pipeline::PipelineConfig;
pub use profile::ScanProfile;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{EngagementMode, ModeLimits};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub settings: Settings,

    /// Scan profiles (merged over the built-in quick/standard/deep)
    #[serde(default)]
    pub profile: BTreeMap<String, ScanProfile>,

    /// Engagement mode limit overrides, keyed by mode name
    #[serde(default)]
    pub mode: BTreeMap<String, ModeLimits>,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root for run directories and the database (defaults to ~/.scanflow)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Directory holding tool binaries; tools are looked up on PATH when unset
    #[serde(default)]
    pub tools_dir: Option<PathBuf>,

    #[serde(default)]
    pub default_mode: EngagementMode,

    #[serde(default = "default_profile")]
    pub default_profile: String,

    #[serde(default)]
    pub stop_on_failure: bool,

    /// Abort the run when the audit log cannot be written
    #[serde(default)]
    pub strict_audit: bool,
}

fn default_profile() -> String {
    "standard".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: None,
            tools_dir: None,
            default_mode: EngagementMode::default(),
            default_profile: default_profile(),
            stop_on_failure: false,
            strict_audit: false,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load `.scanflow/config.toml` from a directory, or defaults if absent
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(".scanflow/config.toml");
        if path.exists() {
            return Self::from_file(&path);
        }
        Ok(Self::with_defaults())
    }

    /// Explicit path if given, else the global config file, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let global = Self::global_config_path();
        if global.exists() {
            return Self::from_file(&global);
        }
        Ok(Self::with_defaults())
    }

    /// Create a config with the built-in profiles
    pub fn with_defaults() -> Self {
        let mut config = Self::default();
        for name in ["quick", "standard", "deep"] {
            if let Some(profile) = ScanProfile::builtin_named(name) {
                config.profile.insert(name.to_string(), profile);
            }
        }
        config
    }

    /// Get the global config directory path (~/.scanflow/)
    pub fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".scanflow")
    }

    /// Get the global config file path (~/.scanflow/config.toml)
    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    /// Save configuration with an atomic temp-file + rename
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config file: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to replace config file: {}", path.display()))?;
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.settings
            .data_dir
            .clone()
            .unwrap_or_else(Self::global_config_dir)
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir().join("runs")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("scanflow.db")
    }

    /// Profile from the config, falling back to the built-in one of that name
    pub fn get_profile(&self, name: &str) -> Option<ScanProfile> {
        self.profile
            .get(name)
            .cloned()
            .or_else(|| ScanProfile::builtin_named(name))
    }

    /// Limits for a mode, honouring `[mode.<name>]` overrides
    pub fn mode_limits(&self, mode: EngagementMode) -> ModeLimits {
        self.mode
            .get(mode.as_str())
            .copied()
            .unwrap_or_else(|| mode.default_limits())
    }

    /// Pipeline configuration for a profile and mode (defaults from settings)
    pub fn pipeline_config(
        &self,
        profile_name: Option<&str>,
        mode: Option<EngagementMode>,
    ) -> Result<PipelineConfig> {
        let profile_name = profile_name.unwrap_or(&self.settings.default_profile);
        let mode = mode.unwrap_or(self.settings.default_mode);
        let profile = self
            .get_profile(profile_name)
            .with_context(|| format!("Unknown profile: {}", profile_name))?;

        let mut config =
            PipelineConfig::standard(profile_name, &profile, mode, &self.mode_limits(mode))?;
        config.stop_on_failure = self.settings.stop_on_failure;
        config.strict_audit = self.settings.strict_audit;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PipelineStage;
    use tempfile::tempdir;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [settings]
            data_dir = "/var/lib/scanflow"
            default_mode = "authorized"
            default_profile = "web"
            stop_on_failure = true

            [profile.web]
            description = "Web only"
            steps = ["httpx", "katana", "nuclei"]
            timeout = 600

            [mode.authorized]
            global = 75.0
            per_host = 10.0
            concurrency = 20
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.runs_dir(), PathBuf::from("/var/lib/scanflow/runs"));
        assert_eq!(config.mode_limits(EngagementMode::Authorized).concurrency, 20);
        assert_eq!(config.mode_limits(EngagementMode::Aggressive).global, 500.0);

        let pipeline = config.pipeline_config(None, None).unwrap();
        assert_eq!(pipeline.profile, "web");
        assert_eq!(pipeline.engagement_mode, EngagementMode::Authorized);
        assert_eq!(pipeline.rate_limit_global, 75.0);
        assert_eq!(pipeline.timeout, 600);
        assert!(pipeline.stop_on_failure);
        assert_eq!(
            pipeline.stages,
            vec![
                PipelineStage::HttpProbing,
                PipelineStage::WebCrawling,
                PipelineStage::UrlClassification,
                PipelineStage::VulnScanning,
            ]
        );
    }

    #[test]
    fn test_builtin_profiles_are_available_without_config() {
        let config = Config::default();
        assert!(config.get_profile("deep").is_some());
        assert!(config.pipeline_config(Some("nope"), None).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".scanflow/config.toml");
        let mut config = Config::with_defaults();
        config.settings.tools_dir = Some(PathBuf::from("/opt/tools"));
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_dir(dir.path()).unwrap();
        assert_eq!(loaded.settings.tools_dir, Some(PathBuf::from("/opt/tools")));
        assert_eq!(loaded.profile.len(), 3);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_from_dir_without_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::from_dir(dir.path()).unwrap();
        assert_eq!(config.settings.default_profile, "standard");
        assert!(config.profile.contains_key("quick"));
    }
}
