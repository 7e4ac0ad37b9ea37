//! Configuration resolution for borekeeper.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Settings file (`--config` path, or the global
//!    `<config-dir>/borekeeper/settings.json`)
//! 3. Environment variables
//! 4. CLI arguments (applied by the binary, highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// Public bore server used when nothing else is configured.
pub const DEFAULT_SERVER_HOST: &str = "bore.pub";

/// Complete borekeeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub tunnel: TunnelSettings,
    #[serde(default)]
    pub binary: BinarySettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub logging: LogSettings,
}

/// Where the tunnel should be opened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TunnelSettings {
    pub server_host: String,
    pub secret: Option<String>,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            secret: None,
        }
    }
}

/// How the `bore` executable is found.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct BinarySettings {
    /// Explicit executable, bypasses the platform table.
    pub path: Option<PathBuf>,
    /// Directory holding `binaries/bore-<target>/bore`.
    pub install_root: Option<PathBuf>,
}

/// Lifecycle bounds, in the units operators usually think in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutSettings {
    pub startup_secs: u64,
    pub stop_grace_secs: u64,
    pub verify_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            startup_secs: 30,
            stop_grace_secs: 5,
            verify_ms: 2000,
        }
    }
}

impl TimeoutSettings {
    pub const fn startup(&self) -> Duration {
        Duration::from_secs(self.startup_secs)
    }

    pub const fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub const fn verify(&self) -> Duration {
        Duration::from_millis(self.verify_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `config_file` must exist; the global settings file is only
/// read when present.
pub fn load_settings(config_file: Option<&Path>) -> Result<Settings> {
    let mut settings = match config_file {
        Some(path) => load_settings_file(path)?,
        None => match global_config_path() {
            Some(path) if path.exists() => load_settings_file(&path)?,
            _ => Settings::default(),
        },
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    Ok(settings)
}

/// Get the global settings file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("borekeeper").join("settings.json"))
}

pub fn load_settings_file(path: &Path) -> Result<Settings> {
    debug!(path = %path.display(), "Loading settings file");
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Apply `BOREKEEPER_*` overrides read through `lookup`.
///
/// Numeric values that fail to parse are ignored.
pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("BOREKEEPER_SERVER") {
        settings.tunnel.server_host = val;
    }
    if let Some(val) = lookup("BOREKEEPER_SECRET") {
        settings.tunnel.secret = Some(val);
    }
    if let Some(val) = lookup("BOREKEEPER_BIN") {
        settings.binary.path = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("BOREKEEPER_INSTALL_ROOT") {
        settings.binary.install_root = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("BOREKEEPER_STARTUP_TIMEOUT") {
        if let Ok(n) = val.parse() {
            settings.timeouts.startup_secs = n;
        }
    }
    if let Some(val) = lookup("BOREKEEPER_STOP_TIMEOUT") {
        if let Ok(n) = val.parse() {
            settings.timeouts.stop_grace_secs = n;
        }
    }
    if let Some(val) = lookup("BOREKEEPER_LOG_LEVEL") {
        settings.logging.level = val;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_bore_conventions() {
        let settings = Settings::default();
        assert_eq!(settings.tunnel.server_host, "bore.pub");
        assert!(settings.tunnel.secret.is_none());
        assert_eq!(settings.timeouts.startup(), Duration::from_secs(30));
        assert_eq!(settings.timeouts.stop_grace(), Duration::from_secs(5));
        assert_eq!(settings.timeouts.verify(), Duration::from_millis(2000));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"tunnel": {"secret": "hunter2"}}"#).unwrap();

        let settings = load_settings_file(&path).unwrap();
        assert_eq!(settings.tunnel.secret.as_deref(), Some("hunter2"));
        assert_eq!(settings.tunnel.server_host, "bore.pub");
        assert_eq!(settings.timeouts, TimeoutSettings::default());
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_settings_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = load_settings(Some(&dir.path().join("absent.json")));
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_replace_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("BOREKEEPER_SERVER", "tunnel.example.com"),
            ("BOREKEEPER_SECRET", "s"),
            ("BOREKEEPER_BIN", "/opt/bore/bore"),
            ("BOREKEEPER_STARTUP_TIMEOUT", "10"),
            ("BOREKEEPER_STOP_TIMEOUT", "not-a-number"),
        ]);
        let mut settings = Settings::default();
        apply_env_overrides(&mut settings, |k| env.get(k).map(ToString::to_string));

        assert_eq!(settings.tunnel.server_host, "tunnel.example.com");
        assert_eq!(settings.tunnel.secret.as_deref(), Some("s"));
        assert_eq!(settings.binary.path, Some(PathBuf::from("/opt/bore/bore")));
        assert_eq!(settings.timeouts.startup_secs, 10);
        assert_eq!(settings.timeouts.stop_grace_secs, 5);
    }
}
