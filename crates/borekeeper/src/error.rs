//! Errors surfaced by the tunnel supervisor.

use std::process::ExitStatus;
use std::time::Duration;

use crate::supervisor::SupervisorState;

/// Errors from tunnel supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("Unsupported platform/arch: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error(
        "bore binary not found (tried {candidate}). Install bore or point --bore-bin at it"
    )]
    BinaryNotFound { candidate: String },

    #[error("Failed to start bore: {0}")]
    SpawnFailure(#[source] std::io::Error),

    #[error("Bore startup timeout - tunnel failed to start within {}s", .0.as_secs_f64())]
    StartupTimeout(Duration),

    #[error("bore exited before the tunnel was ready ({0})")]
    AbnormalExit(ExitStatus),

    #[error("Tunnel was stopped before it became ready")]
    Stopped,

    #[error("Tunnel supervisor is busy ({0})")]
    Busy(SupervisorState),

    #[error("Invalid tunnel configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to wait for bore process: {0}")]
    Wait(#[source] std::io::Error),
}
