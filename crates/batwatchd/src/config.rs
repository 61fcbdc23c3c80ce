//! Configuration management for batwatchd.
//!
//! Loads settings from /etc/batwatch/config.toml (or `$BATWATCH_CONFIG`) and
//! falls back to defaults when no file exists.

use anyhow::{Context, Result};
use batwatch_common::{InterfaceName, ValidationError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/batwatch/config.toml";

/// Environment variable overriding `CONFIG_PATH`
pub const CONFIG_ENV: &str = "BATWATCH_CONFIG";

const HOSTNAME_PATH: &str = "/etc/hostname";

/// Upper bound for any command timeout
pub const MAX_COMMAND_TIMEOUT_SECS: u64 = 3600;

/// Timeouts for the external commands the daemon runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Per health-check / metrics command
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Interface and gateway actions
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,

    #[serde(default = "default_daemon_restart_timeout")]
    pub daemon_restart_timeout_secs: u64,

    /// Pause between taking something down and bringing it back
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_action_timeout() -> u64 {
    10
}

fn default_daemon_restart_timeout() -> u64 {
    30
}

fn default_settle_delay() -> u64 {
    1000
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
            action_timeout_secs: default_action_timeout(),
            daemon_restart_timeout_secs: default_daemon_restart_timeout(),
            settle_delay_ms: default_settle_delay(),
        }
    }
}

impl CommandConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn daemon_restart_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon_restart_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, secs) in [
            ("probe_timeout_secs", self.probe_timeout_secs),
            ("action_timeout_secs", self.action_timeout_secs),
            ("daemon_restart_timeout_secs", self.daemon_restart_timeout_secs),
        ] {
            if secs == 0 || secs > MAX_COMMAND_TIMEOUT_SECS {
                return Err(ValidationError::Config(format!(
                    "commands.{} must be between 1 and {}, got {}",
                    name, MAX_COMMAND_TIMEOUT_SECS, secs
                )));
            }
        }
        Ok(())
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_node_id")]
    pub node_id: String,

    #[serde(default)]
    pub interface: InterfaceName,

    /// Seconds between MAPE-K cycles
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// Execute recovery plans instead of only planning them
    #[serde(default = "default_true")]
    pub auto_heal: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// systemd unit restarted by the restart_daemon action
    #[serde(default = "default_daemon_unit")]
    pub daemon_unit: String,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    #[serde(default)]
    pub commands: CommandConfig,
}

fn default_node_id() -> String {
    fs::read_to_string(HOSTNAME_PATH)
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "batwatch-node".to_string())
}

fn default_cycle_interval() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_daemon_unit() -> String {
    "batman-adv".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            interface: InterfaceName::default(),
            cycle_interval_secs: default_cycle_interval(),
            auto_heal: true,
            log_level: default_log_level(),
            daemon_unit: default_daemon_unit(),
            metrics_enabled: true,
            commands: CommandConfig::default(),
        }
    }
}

impl Config {
    /// Load config from `$BATWATCH_CONFIG` or the default path.
    ///
    /// A missing file yields defaults; an unreadable or invalid one is an error.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| CONFIG_PATH.to_string());
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Config not found at {}, using defaults", path.display());
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cycle_interval_secs == 0 {
            return Err(ValidationError::Config(
                "cycle_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.node_id.trim().is_empty() {
            return Err(ValidationError::Config("node_id must not be empty".to_string()));
        }
        if self.daemon_unit.trim().is_empty() {
            return Err(ValidationError::Config(
                "daemon_unit must not be empty".to_string(),
            ));
        }
        // Passed straight to systemctl
        let unit_ok = self
            .daemon_unit
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
        if !unit_ok {
            return Err(ValidationError::Config(format!(
                "daemon_unit contains invalid characters: {:?}",
                self.daemon_unit
            )));
        }
        self.commands.validate()
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.interface.as_str(), "bat0");
        assert_eq!(config.cycle_interval_secs, 30);
        assert!(config.auto_heal);
        assert_eq!(config.daemon_unit, "batman-adv");
        assert_eq!(config.commands.probe_timeout_secs, 5);
        assert_eq!(config.commands.action_timeout_secs, 10);
        assert_eq!(config.commands.daemon_restart_timeout_secs, 30);
        assert_eq!(config.commands.settle_delay(), Duration::from_secs(1));
        assert!(!config.node_id.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            node_id = "mesh-07"
            interface = "bat1"
            cycle_interval_secs = 10
            auto_heal = false

            [commands]
            action_timeout_secs = 3
        "#;
        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.node_id, "mesh-07");
        assert_eq!(config.interface.as_str(), "bat1");
        assert!(!config.auto_heal);
        assert_eq!(config.commands.action_timeout(), Duration::from_secs(3));
        assert_eq!(config.commands.probe_timeout_secs, 5);
    }

    #[test]
    fn test_rejects_injected_interface() {
        assert!(Config::from_toml(r#"interface = "bat0; reboot""#).is_err());
    }

    #[test]
    fn test_rejects_bad_daemon_unit() {
        assert!(Config::from_toml(r#"daemon_unit = "batman-adv --now; reboot""#).is_err());
        assert!(Config::from_toml(r#"daemon_unit = "batman-adv@bat0.service""#).is_ok());
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        assert!(Config::from_toml("[commands]\nprobe_timeout_secs = 0").is_err());
        assert!(Config::from_toml("[commands]\naction_timeout_secs = 0").is_err());
        assert!(Config::from_toml("[commands]\ndaemon_restart_timeout_secs = 0").is_err());
    }

    #[test]
    fn test_rejects_oversized_timeouts() {
        assert!(Config::from_toml("[commands]\nprobe_timeout_secs = 7000000000000000000").is_err());
        assert!(Config::from_toml("[commands]\naction_timeout_secs = 3601").is_err());
        assert!(Config::from_toml("[commands]\nprobe_timeout_secs = 3600").is_ok());
    }

    #[test]
    fn test_rejects_zero_interval() {
        assert!(Config::from_toml("cycle_interval_secs = 0").is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.cycle_interval_secs, 30);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "node_id = \"from-file\"").unwrap();
        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.node_id, "from-file");
    }

    #[test]
    fn test_invalid_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cycle_interval_secs = \"soon\"").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());
    }
}
