//! Configuration management for rebootd.
//!
//! Loads the daemon settings from /etc/rebootd/config.toml (or `--config`).
//! Durations are human strings such as `30s`, `1h30m` or `2d`. Structural
//! checks live in [`Config::validate`]; value checks (intervals, streaks,
//! states, hours) happen in the core constructors during wiring.

use anyhow::{bail, Context, Result};
use reboot_common::{format_duration, parse_duration};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/rebootd/config.toml";

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Append-only JSONL journal of reboot requests
    #[serde(default)]
    pub journal_file: Option<PathBuf>,

    /// Serve `/metrics` on this address
    #[serde(default)]
    pub metrics_listen_addr: Option<String>,

    /// Write `rebootd.prom` into this directory (node_exporter textfile collector)
    #[serde(default)]
    pub metrics_dir: Option<PathBuf>,

    /// Never reboot a machine that has been up for less than this
    #[serde(default = "default_safe_min_uptime")]
    pub safe_min_uptime: String,

    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

/// One group of conditions sharing an evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    pub name: String,

    /// `and` or `or`
    #[serde(default = "default_evaluator")]
    pub evaluator: String,

    #[serde(default = "default_tick_interval")]
    pub tick_interval: String,

    /// State name -> minimum time in that state
    #[serde(default = "default_wanted_states")]
    pub wanted_states: HashMap<String, String>,

    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
}

/// One checker plus its scheduling and hysteresis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionConfig {
    /// `needrestart`, `file`, `dns`, `tcp` or `prometheus`
    pub checker: String,

    pub check_interval: String,

    /// Defaults to `check_interval`
    #[serde(default)]
    pub probe_timeout: Option<String>,

    #[serde(default = "default_streak_until_ok")]
    pub streak_until_ok: u32,

    #[serde(default = "default_streak_until_reboot")]
    pub streak_until_reboot: u32,

    /// `always` (default) or `time_window`
    #[serde(default)]
    pub precondition: Option<String>,

    #[serde(default)]
    pub checker_args: toml::Table,

    #[serde(default)]
    pub precondition_args: toml::Table,
}

fn default_safe_min_uptime() -> String {
    "4h".to_string()
}

fn default_evaluator() -> String {
    "or".to_string()
}

fn default_tick_interval() -> String {
    "15s".to_string()
}

fn default_wanted_states() -> HashMap<String, String> {
    HashMap::from([("reboot_needed".to_string(), "0s".to_string())])
}

fn default_streak_until_ok() -> u32 {
    3
}

fn default_streak_until_reboot() -> u32 {
    1
}

impl Config {
    /// Load config from a specific path
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn safe_min_uptime(&self) -> Result<Duration> {
        parse_duration(&self.safe_min_uptime).context("Invalid 'safe_min_uptime'")
    }

    /// Structural checks that do not belong to any single component
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            bail!("No groups configured");
        }

        if self.metrics_listen_addr.is_some() && self.metrics_dir.is_some() {
            bail!("'metrics_listen_addr' and 'metrics_dir' are mutually exclusive");
        }

        if let Some(addr) = &self.metrics_listen_addr {
            addr.parse::<std::net::SocketAddr>()
                .with_context(|| format!("Invalid 'metrics_listen_addr' {}", addr))?;
        }

        if let Some(journal) = &self.journal_file {
            if journal.as_os_str().is_empty() {
                bail!("'journal_file' must not be empty");
            }
        }

        let mut names = std::collections::HashSet::new();
        for group in &self.groups {
            if !names.insert(group.name.as_str()) {
                bail!("Duplicate group name '{}'", group.name);
            }
            if group.conditions.is_empty() {
                bail!("Group '{}' has no conditions", group.name);
            }
        }

        Ok(())
    }

    /// Log the active configuration
    pub fn log_summary(&self) {
        match self.safe_min_uptime() {
            Ok(uptime) => info!("  Safe minimum uptime: {}", format_duration(uptime)),
            Err(_) => info!("  Safe minimum uptime: {}", self.safe_min_uptime),
        }

        match &self.journal_file {
            Some(path) => info!("  Journal: {}", path.display()),
            None => info!("  Journal: disabled"),
        }

        match (&self.metrics_listen_addr, &self.metrics_dir) {
            (Some(addr), _) => info!("  Metrics: http://{}/metrics", addr),
            (None, Some(dir)) => info!("  Metrics: textfile in {}", dir.display()),
            (None, None) => warn!("  Metrics: not exported"),
        }

        for group in &self.groups {
            info!(
                "  Group '{}': evaluator={}, tick={}, {} condition(s)",
                group.name,
                group.evaluator,
                group.tick_interval,
                group.conditions.len()
            );
            for condition in &group.conditions {
                info!(
                    "    {} every {} (ok after {}, reboot after {}){}",
                    condition.checker,
                    condition.check_interval,
                    condition.streak_until_ok,
                    condition.streak_until_reboot,
                    condition
                        .precondition
                        .as_deref()
                        .map(|p| format!(", precondition {}", p))
                        .unwrap_or_default()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[[groups]]
name = "updates"

[[groups.conditions]]
checker = "needrestart"
check_interval = "30m"
"#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.safe_min_uptime().unwrap(), Duration::from_secs(4 * 3600));
        assert!(config.journal_file.is_none());

        let group = &config.groups[0];
        assert_eq!(group.evaluator, "or");
        assert_eq!(group.tick_interval, "15s");
        assert_eq!(group.wanted_states.get("reboot_needed").map(String::as_str), Some("0s"));

        let condition = &group.conditions[0];
        assert_eq!(condition.streak_until_ok, 3);
        assert_eq!(condition.streak_until_reboot, 1);
        assert!(condition.precondition.is_none());
        assert!(condition.checker_args.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
journal_file = "/var/log/rebootd/journal.jsonl"
metrics_dir = "/var/lib/node_exporter"
safe_min_uptime = "6h"

[[groups]]
name = "updates"
evaluator = "and"
tick_interval = "1m"
[groups.wanted_states]
reboot_needed = "1h"
error = "2d"

[[groups.conditions]]
checker = "needrestart"
check_interval = "30m"
probe_timeout = "20s"
streak_until_ok = 2
streak_until_reboot = 4
precondition = "time_window"
[groups.conditions.checker_args]
reboot_on_svc = false
min_ksta = 2
[groups.conditions.precondition_args]
from = 2
to = 5
"#;
        let config = Config::from_toml(toml_str).unwrap();
        config.validate().unwrap();

        assert_eq!(config.safe_min_uptime().unwrap(), Duration::from_secs(6 * 3600));
        let group = &config.groups[0];
        assert_eq!(group.wanted_states.len(), 2);
        let condition = &group.conditions[0];
        assert_eq!(condition.probe_timeout.as_deref(), Some("20s"));
        assert_eq!(condition.checker_args.get("min_ksta").and_then(|v| v.as_integer()), Some(2));
        assert_eq!(condition.precondition_args.get("to").and_then(|v| v.as_integer()), Some(5));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml_str = r#"
safe_min_uptim = "4h"
"#;
        assert!(Config::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_and_conflicting() {
        let config = Config::from_toml("").unwrap();
        assert!(config.validate().is_err());

        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.metrics_listen_addr = Some("127.0.0.1:9199".to_string());
        config.validate().unwrap();
        config.metrics_dir = Some(PathBuf::from("/tmp"));
        assert!(config.validate().is_err());

        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.metrics_listen_addr = Some("localhost".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_and_empty_groups() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.groups.push(config.groups[0].clone());
        assert!(config.validate().is_err());

        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.groups[0].conditions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let err = Config::load(Path::new("/nonexistent/rebootd.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/rebootd.toml"));
    }
}
