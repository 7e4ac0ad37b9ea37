//! Tunnel and lifecycle configuration for the supervisor.

use std::time::Duration;

use borekeeper_core::config::{DEFAULT_SERVER_HOST, TimeoutSettings, TunnelSettings};

use crate::error::TunnelError;

/// What to expose and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    local_port: u16,
    server_host: String,
    secret: Option<String>,
}

impl TunnelConfig {
    /// Expose `local_port` through the public bore server.
    pub fn new(local_port: u16) -> Self {
        Self {
            local_port,
            server_host: DEFAULT_SERVER_HOST.to_string(),
            secret: None,
        }
    }

    /// Build from resolved settings.
    pub fn from_settings(local_port: u16, settings: &TunnelSettings) -> Self {
        Self {
            local_port,
            server_host: settings.server_host.clone(),
            secret: settings.secret.clone(),
        }
    }

    #[must_use]
    pub fn with_server_host(mut self, server_host: impl Into<String>) -> Self {
        self.server_host = server_host.into();
        self
    }

    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub const fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn server_host(&self) -> &str {
        &self.server_host
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub(crate) fn validate(&self) -> Result<(), TunnelError> {
        if self.local_port == 0 {
            return Err(TunnelError::InvalidConfig(
                "local port must be greater than 0".to_string(),
            ));
        }
        if self.server_host.trim().is_empty() {
            return Err(TunnelError::InvalidConfig(
                "server host must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Arguments for `bore local <port> --to <host> [--secret <secret>]`.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec![
            "local".to_string(),
            self.local_port.to_string(),
            "--to".to_string(),
            self.server_host.clone(),
        ];
        if let Some(secret) = &self.secret {
            args.push("--secret".to_string());
            args.push(secret.clone());
        }
        args
    }
}

/// Bounds on the tunnel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// How long to wait for the readiness notice after spawning.
    pub startup: Duration,
    /// How long a stopped child gets to exit before it is killed.
    pub stop_grace: Duration,
    /// Bound on the `--version` self-check.
    pub verify: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup: Duration::from_secs(30),
            stop_grace: Duration::from_secs(5),
            verify: crate::binary::DEFAULT_VERIFY_TIMEOUT,
        }
    }
}

impl From<&TimeoutSettings> for Timeouts {
    fn from(settings: &TimeoutSettings) -> Self {
        Self {
            startup: settings.startup(),
            stop_grace: settings.stop_grace(),
            verify: settings.verify(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_without_secret() {
        let config = TunnelConfig::new(4020);
        assert_eq!(config.command_args(), ["local", "4020", "--to", "bore.pub"]);
    }

    #[test]
    fn args_with_secret() {
        let config = TunnelConfig::new(4020)
            .with_server_host("tunnel.example.com")
            .with_secret("s");
        assert_eq!(
            config.command_args(),
            ["local", "4020", "--to", "tunnel.example.com", "--secret", "s"]
        );
    }

    #[test]
    fn zero_port_is_rejected() {
        let err = TunnelConfig::new(0).validate();
        assert!(matches!(err, Err(TunnelError::InvalidConfig(_))));
    }

    #[test]
    fn blank_host_is_rejected() {
        let err = TunnelConfig::new(8080).with_server_host(" ").validate();
        assert!(matches!(err, Err(TunnelError::InvalidConfig(_))));
    }

    #[test]
    fn settings_carry_over() {
        let settings = TunnelSettings {
            server_host: "relay.internal".to_string(),
            secret: Some("x".to_string()),
        };
        let config = TunnelConfig::from_settings(3000, &settings);
        assert_eq!(config.server_host(), "relay.internal");
        assert_eq!(config.secret(), Some("x"));
        assert_eq!(config.local_port(), 3000);
    }

    #[test]
    fn default_timeouts_match_settings_defaults() {
        assert_eq!(Timeouts::default(), Timeouts::from(&TimeoutSettings::default()));
    }
}
