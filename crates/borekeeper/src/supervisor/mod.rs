//! Supervision of a single bore tunnel process.
//!
//! [`TunnelSupervisor`] moves through `Idle → Starting → Running → Stopping
//! → Idle`. Caller-initiated transitions (`start`, `stop`) are serialized by
//! the control lock; the child task owns the process and publishes
//! readiness and exit on the status channel.

mod child;
pub mod config;
pub mod readiness;
pub mod state;

use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{info, warn};

use crate::binary::BinaryLocator;
use crate::error::TunnelError;
use child::{ChildTask, Control, ReadyReceiver};

pub use config::{Timeouts, TunnelConfig};
pub use state::{SupervisorState, TunnelInfo, TunnelStatus};

/// How a `stop()` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running; no signal was sent.
    AlreadyIdle,
    /// The process exited within the grace window after SIGTERM.
    Graceful,
    /// The grace window elapsed and the process was killed.
    Forced,
}

/// Starts, watches and stops one bore process.
pub struct TunnelSupervisor {
    config: TunnelConfig,
    locator: BinaryLocator,
    timeouts: Timeouts,
    status: watch::Sender<TunnelStatus>,
    /// Channel to the live child task, if one was spawned.
    control: Mutex<Option<mpsc::Sender<Control>>>,
}

impl TunnelSupervisor {
    /// Create a supervisor for the host platform with default timeouts.
    pub fn new(config: TunnelConfig) -> Result<Self, TunnelError> {
        config.validate()?;
        let (status, _) = watch::channel(TunnelStatus::Idle);
        Ok(Self {
            config,
            locator: BinaryLocator::new(BinaryLocator::default_install_root()),
            timeouts: Timeouts::default(),
            status,
            control: Mutex::new(None),
        })
    }

    /// Use `locator` to find the bore executable.
    #[must_use]
    pub fn with_locator(mut self, locator: BinaryLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Override the startup, grace and self-check bounds.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Tunnel parameters this supervisor was built with.
    pub const fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Start the tunnel and wait for bore to report its public endpoint.
    ///
    /// Returns the cached endpoint if the tunnel is already running.
    pub async fn start(&self) -> Result<TunnelInfo, TunnelError> {
        let mut slot = self.control.lock().await;

        let mut current = TunnelStatus::Idle;
        let claimed = self.status.send_if_modified(|status| {
            if matches!(status, TunnelStatus::Idle) {
                *status = TunnelStatus::Starting;
                true
            } else {
                current = status.clone();
                false
            }
        });
        if !claimed {
            return match current {
                TunnelStatus::Running(info) => {
                    warn!(public_url = info.public_url(), "Bore tunnel is already running");
                    Ok(info)
                }
                other => Err(TunnelError::Busy(other.state())),
            };
        }

        // Reverts the claim if launching fails or this future is dropped
        // mid-launch; until a child exists nothing else would reset it.
        let claim = StartClaim {
            status: &self.status,
        };
        let (control, ready) = self.launch().await?;
        claim.disarm();
        *slot = Some(control);
        drop(slot);

        ready.await.unwrap_or(Err(TunnelError::Stopped))
    }

    /// Locate bore, spawn it and hand it to a child task.
    async fn launch(&self) -> Result<(mpsc::Sender<Control>, ReadyReceiver), TunnelError> {
        let program = self.locator.locate(self.timeouts.verify).await?;

        info!(
            local_port = self.config.local_port(),
            server = self.config.server_host(),
            has_secret = self.config.secret().is_some(),
            "Starting bore tunnel"
        );
        let child = Command::new(&program)
            .args(self.config.command_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TunnelError::SpawnFailure)?;

        let (control_tx, control_rx) = mpsc::channel(1);
        let (ready_tx, ready_rx) = oneshot::channel();
        let task = ChildTask::new(
            child,
            ready_tx,
            control_rx,
            self.status.clone(),
            self.timeouts,
        );
        tokio::spawn(task.run());

        Ok((control_tx, ready_rx))
    }

    /// Stop the tunnel: SIGTERM, wait out the grace window, then kill.
    ///
    /// Resolves immediately when nothing is running.
    pub async fn stop(&self) -> StopOutcome {
        let mut slot = self.control.lock().await;

        let control = slot.take();
        let Some(control) = control.filter(|_| self.state() != SupervisorState::Idle) else {
            return StopOutcome::AlreadyIdle;
        };

        info!("Stopping bore tunnel...");
        self.status.send_if_modified(|status| {
            if matches!(status, TunnelStatus::Starting | TunnelStatus::Running(_)) {
                *status = TunnelStatus::Stopping;
                true
            } else {
                false
            }
        });

        let (done_tx, done_rx) = oneshot::channel();
        if control.send(Control::Stop { done: done_tx }).await.is_ok() {
            if let Ok(outcome) = done_rx.await {
                return outcome;
            }
        }

        // The child task had already finished before the request reached it.
        // If it ended through a startup timeout the signals were its own, so
        // this call sent none.
        let mut rx = self.status.subscribe();
        rx.wait_for(|status| matches!(status, TunnelStatus::Idle))
            .await
            .ok();
        StopOutcome::AlreadyIdle
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SupervisorState {
        self.status.borrow().state()
    }

    /// Snapshot of the current status, including tunnel info when running.
    pub fn status(&self) -> TunnelStatus {
        self.status.borrow().clone()
    }

    /// Whether bore has reported its public endpoint and is still alive.
    pub fn is_running(&self) -> bool {
        self.state() == SupervisorState::Running
    }

    /// Endpoint of the running tunnel.
    pub fn tunnel(&self) -> Option<TunnelInfo> {
        self.status.borrow().tunnel().cloned()
    }

    /// Public URL of the running tunnel.
    pub fn public_url(&self) -> Option<String> {
        self.status.borrow().tunnel().map(|t| t.public_url().to_string())
    }

    /// Public port on the bore server.
    pub fn public_port(&self) -> Option<u16> {
        self.status.borrow().tunnel().map(TunnelInfo::public_port)
    }

    /// Watch status transitions, including exits nobody asked for.
    pub fn subscribe(&self) -> watch::Receiver<TunnelStatus> {
        self.status.subscribe()
    }
}

/// An `Idle -> Starting` claim that has no child behind it yet.
struct StartClaim<'a> {
    status: &'a watch::Sender<TunnelStatus>,
}

impl StartClaim<'_> {
    /// The child task now owns the status.
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for StartClaim<'_> {
    fn drop(&mut self) {
        self.status.send_replace(TunnelStatus::Idle);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_rejected_up_front() {
        assert!(matches!(
            TunnelSupervisor::new(TunnelConfig::new(0)),
            Err(TunnelError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn idle_supervisor_reports_nothing() {
        let supervisor = TunnelSupervisor::new(TunnelConfig::new(4020)).unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Idle);
        assert!(!supervisor.is_running());
        assert!(supervisor.public_url().is_none());
        assert!(supervisor.public_port().is_none());
    }

    #[tokio::test]
    async fn stop_on_idle_is_a_no_op() {
        let supervisor = TunnelSupervisor::new(TunnelConfig::new(4020)).unwrap();
        assert_eq!(supervisor.stop().await, StopOutcome::AlreadyIdle);
        assert_eq!(supervisor.state(), SupervisorState::Idle);
    }

    #[tokio::test]
    async fn unsupported_platform_leaves_supervisor_idle() {
        let locator = BinaryLocator::for_platform("plan9", "mips", "/nowhere".into());
        let supervisor = TunnelSupervisor::new(TunnelConfig::new(4020))
            .unwrap()
            .with_locator(locator);

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, TunnelError::UnsupportedPlatform { .. }), "got {err:?}");
        assert_eq!(supervisor.state(), SupervisorState::Idle);
    }
}
