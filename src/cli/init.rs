//! Init command implementation

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

use scanflow::config::Config;

/// Default configuration content for scanflow init
pub const DEFAULT_CONFIG: &str = r#"# Scanflow Configuration
# =======================
#
# Only scan targets you are authorized to test.

# ============================================================================
# SETTINGS - Global configuration options
# ============================================================================
#
# Available options:
#   data_dir         - Root for run directories and the database (default: ~/.scanflow)
#   tools_dir        - Directory holding tool binaries (default: look up on PATH)
#   default_mode     - bugbounty, authorized or aggressive (default: bugbounty)
#   default_profile  - Profile used when --profile is not given (default: standard)
#   stop_on_failure  - Fail the run as soon as one stage fails (default: false)
#   strict_audit     - Abort the run when the audit log cannot be written (default: false)

[settings]
default_mode = "bugbounty"
default_profile = "standard"
stop_on_failure = false
strict_audit = false
# tools_dir = "/opt/scanflow/tools"

# ============================================================================
# PROFILES - Which tools run, and how hard
# ============================================================================
#
# Available options:
#   description - Free text
#   steps       - Tool names: subfinder, dnsx, httpx, katana, gau, nuclei,
#                 dalfox, ffuf, sqlmap
#   rate_limit  - Requests per second, "30/s" or "30"
#   timeout     - Per-tool timeout in seconds
#
# quick, standard and deep are built in; entries here replace them.

[profile.quick]
description = "Fast reconnaissance only"
steps = ["subfinder", "dnsx", "httpx"]
rate_limit = "50/s"
timeout = 300

[profile.standard]
description = "Balanced recon + vuln scan"
steps = ["subfinder", "dnsx", "httpx", "katana", "gau", "nuclei"]
rate_limit = "30/s"
timeout = 1800

[profile.deep]
description = "Full pipeline with injection testing"
steps = ["subfinder", "dnsx", "httpx", "katana", "gau", "nuclei", "dalfox", "ffuf", "sqlmap"]
rate_limit = "10/s"
timeout = 7200

# ============================================================================
# MODES - Engagement mode limit overrides
# ============================================================================
#
#   global      - Requests per second across the whole run
#   per_host    - Requests per second against one host, passed to tools
#   concurrency - Tools running at the same time

# [mode.bugbounty]
# global = 30.0
# per_host = 5.0
# concurrency = 10
"#;

/// Initialize a new Scanflow configuration
/// By default creates the global config at ~/.scanflow/config.toml
/// Use --config to specify a custom path
pub async fn init_command(config_path: Option<&Path>, force: bool) -> Result<()> {
    let config_path: PathBuf = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::global_config_path);

    if config_path.exists() && !force {
        bail!(
            "Configuration already exists: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    // Create parent directory (if any)
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    std::fs::write(&config_path, DEFAULT_CONFIG)?;
    println!("Created: {}", config_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.profile.len(), 3);
        assert!(config.pipeline_config(Some("deep"), None).is_ok());
    }
}
