//! Supervisor state and the published tunnel status.

use serde::Serialize;

/// Lifecycle phase of a [`TunnelSupervisor`](super::TunnelSupervisor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Public endpoint assigned by the bore server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelInfo {
    public_url: String,
    public_port: u16,
}

impl TunnelInfo {
    /// Derive the public endpoint from the host and port bore reported.
    ///
    /// Port 443 is implied by `https://` and left out of the URL.
    pub fn from_endpoint(host: &str, port: u16) -> Self {
        let public_url = if port == 443 {
            format!("https://{host}")
        } else {
            format!("https://{host}:{port}")
        };
        Self {
            public_url,
            public_port: port,
        }
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub const fn public_port(&self) -> u16 {
        self.public_port
    }
}

/// Snapshot published on every state transition.
///
/// Tunnel details only exist while running.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TunnelStatus {
    #[default]
    Idle,
    Starting,
    Running(TunnelInfo),
    Stopping,
}

impl TunnelStatus {
    pub const fn state(&self) -> SupervisorState {
        match self {
            Self::Idle => SupervisorState::Idle,
            Self::Starting => SupervisorState::Starting,
            Self::Running(_) => SupervisorState::Running,
            Self::Stopping => SupervisorState::Stopping,
        }
    }

    pub const fn tunnel(&self) -> Option<&TunnelInfo> {
        match self {
            Self::Running(info) => Some(info),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_includes_non_default_port() {
        let info = TunnelInfo::from_endpoint("bore.pub", 54321);
        assert_eq!(info.public_url(), "https://bore.pub:54321");
        assert_eq!(info.public_port(), 54321);
    }

    #[test]
    fn url_omits_port_443() {
        let info = TunnelInfo::from_endpoint("bore.pub", 443);
        assert_eq!(info.public_url(), "https://bore.pub");
        assert_eq!(info.public_port(), 443);
    }

    #[test]
    fn tunnel_only_present_while_running() {
        let info = TunnelInfo::from_endpoint("bore.pub", 1);
        assert!(TunnelStatus::Idle.tunnel().is_none());
        assert!(TunnelStatus::Starting.tunnel().is_none());
        assert!(TunnelStatus::Stopping.tunnel().is_none());
        assert_eq!(TunnelStatus::Running(info.clone()).tunnel(), Some(&info));
        assert_eq!(TunnelStatus::Running(info).state(), SupervisorState::Running);
    }

    #[test]
    fn info_serializes_camel_case() {
        let info = TunnelInfo::from_endpoint("bore.pub", 443);
        let json = serde_json::to_value(&info).unwrap_or_default();
        assert_eq!(json["publicUrl"], "https://bore.pub");
        assert_eq!(json["publicPort"], 443);
    }
}
