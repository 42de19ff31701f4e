//! Daemon configuration
//!
//! Loaded from a TOML file; every key has a sensible default so the daemon
//! runs without any file present. The `[policy]` section carries the keys
//! that the Cinnamon settings schema exposes for this plugin
//! (`default-monitors-setup`, `default-configuration-file`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Boot-behavior policy: what layout to fall back to when no stored
/// configuration matches the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MonitorsSetup {
    /// Leave whatever the server picked; auto-configuration still builds an
    /// extended layout when explicitly asked to recover
    DoNothing,
    /// Track the laptop lid: extended layout while open, external-only when
    /// closed
    FollowLid,
    /// Mirror all outputs
    Clone,
    /// Laptop panel off, external outputs mirrored ("docked")
    Dock,
}

impl Default for MonitorsSetup {
    fn default() -> Self {
        MonitorsSetup::FollowLid
    }
}

impl MonitorsSetup {
    /// Whether lid close/open events should drive reconfiguration.
    pub fn follow_laptop_lid(self) -> bool {
        matches!(self, MonitorsSetup::FollowLid | MonitorsSetup::Clone)
    }
}

/// `[policy]` section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyConfig {
    /// Layout policy applied when nothing stored matches
    #[serde(default)]
    pub default_monitors_setup: MonitorsSetup,
    /// System-provided configuration file tried before the boot-behavior
    /// fallback (e.g. an OEM default shipped in /etc)
    #[serde(default)]
    pub default_configuration_file: Option<PathBuf>,
}

/// `[confirmation]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Seconds before an unconfirmed configuration is rolled back
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        ConfirmationConfig {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DaemonConfig {
    /// Layout policy
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Confirmation dialog behavior
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        let config: DaemonConfig =
            toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.confirmation.timeout_seconds == 0 {
            anyhow::bail!("confirmation.timeout_seconds must be at least 1");
        }
        if self.confirmation.timeout_seconds > 600 {
            anyhow::bail!(
                "confirmation.timeout_seconds ({}) is unreasonably long",
                self.confirmation.timeout_seconds
            );
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        if let Some(path) = &self.policy.default_configuration_file {
            if !path.is_absolute() {
                anyhow::bail!(
                    "policy.default_configuration_file must be an absolute path: {:?}",
                    path
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(
            config.policy.default_monitors_setup,
            MonitorsSetup::FollowLid
        );
        assert_eq!(config.confirmation.timeout_seconds, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_policy_enum() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [policy]
            default_monitors_setup = "do-nothing"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.policy.default_monitors_setup,
            MonitorsSetup::DoNothing
        );
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let mut config = DaemonConfig::default();
        config.confirmation.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_relative_default_file() {
        let mut config = DaemonConfig::default();
        config.policy.default_configuration_file = Some(PathBuf::from("monitors.json"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_follow_laptop_lid_policy() {
        assert!(MonitorsSetup::FollowLid.follow_laptop_lid());
        assert!(MonitorsSetup::Clone.follow_laptop_lid());
        assert!(!MonitorsSetup::DoNothing.follow_laptop_lid());
        assert!(!MonitorsSetup::Dock.follow_laptop_lid());
    }
}
