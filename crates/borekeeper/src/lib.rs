//! borekeeper
//!
//! Exposes a local port on the public internet by supervising an external
//! `bore` process:
//! - Binary resolution against a platform table, with `PATH` fallback
//! - Self-check verification before any tunnel is spawned
//! - Readiness detection from the child's stdout/stderr
//! - Graceful stop with forced termination after a grace window

pub mod binary;
pub mod error;
pub mod platform;
pub mod supervisor;

pub use binary::BinaryLocator;
pub use error::TunnelError;
pub use supervisor::{
    StopOutcome, SupervisorState, Timeouts, TunnelConfig, TunnelInfo, TunnelStatus,
    TunnelSupervisor,
};
