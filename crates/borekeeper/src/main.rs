//! borekeeper
//!
//! Exposes a local port through a supervised `bore` tunnel, prints the public
//! URL, and keeps the tunnel up until interrupted.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use borekeeper::{BinaryLocator, Timeouts, TunnelConfig, TunnelInfo, TunnelStatus, TunnelSupervisor};
use borekeeper_core::Settings;
use borekeeper_core::config::load_settings;
use borekeeper_core::tracing_init::{default_filter, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "borekeeper")]
#[command(version, about = "Expose a local port through a supervised bore tunnel")]
struct Args {
    /// Local port to expose
    #[arg(long, short = 'p', env = "BOREKEEPER_PORT")]
    port: u16,

    /// bore server to tunnel through (default: bore.pub)
    #[arg(long = "to")]
    server: Option<String>,

    /// Secret for authenticating with the bore server
    #[arg(long)]
    secret: Option<String>,

    /// Path to the `bore` binary; skips the bundled-binary lookup
    #[arg(long)]
    bore_bin: Option<PathBuf>,

    /// Directory containing `binaries/bore-<platform>-<arch>/bore`
    #[arg(long)]
    install_root: Option<PathBuf>,

    /// Seconds to wait for bore to report its public port
    #[arg(long)]
    startup_timeout: Option<u64>,

    /// Seconds to wait for graceful bore shutdown before SIGKILL
    #[arg(long)]
    stop_timeout: Option<u64>,

    /// Settings file (default: `<config-dir>/borekeeper/settings.json`)
    #[arg(long, env = "BOREKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation)
    #[arg(long)]
    log_json: bool,

    /// Print the tunnel endpoint as JSON instead of a bare URL
    #[arg(long)]
    json: bool,
}

impl Args {
    /// Layer CLI flags over file and environment settings.
    fn apply(&self, settings: &mut Settings) {
        if let Some(server) = &self.server {
            settings.tunnel.server_host.clone_from(server);
        }
        if self.secret.is_some() {
            settings.tunnel.secret.clone_from(&self.secret);
        }
        if self.bore_bin.is_some() {
            settings.binary.path.clone_from(&self.bore_bin);
        }
        if self.install_root.is_some() {
            settings.binary.install_root.clone_from(&self.install_root);
        }
        if let Some(secs) = self.startup_timeout {
            settings.timeouts.startup_secs = secs;
        }
        if let Some(secs) = self.stop_timeout {
            settings.timeouts.stop_grace_secs = secs;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    args.apply(&mut settings);

    let level = &settings.logging.level;
    let filter = format!(
        "{},{}",
        default_filter(env!("CARGO_PKG_NAME"), level),
        default_filter("borekeeper-core", level)
    );
    init_tracing(&filter, settings.logging.json);

    let install_root = settings
        .binary
        .install_root
        .clone()
        .unwrap_or_else(BinaryLocator::default_install_root);
    let mut locator = BinaryLocator::new(install_root);
    if let Some(bin) = settings.binary.path.clone() {
        locator = locator.with_explicit_binary(bin);
    }

    let supervisor = TunnelSupervisor::new(TunnelConfig::from_settings(args.port, &settings.tunnel))?
        .with_locator(locator)
        .with_timeouts(Timeouts::from(&settings.timeouts));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        local_port = supervisor.config().local_port(),
        server = supervisor.config().server_host(),
        "Starting borekeeper"
    );

    let mut status_rx = supervisor.subscribe();
    let tunnel = supervisor.start().await?;
    print_tunnel(&tunnel, args.json)?;

    // Notify systemd that the tunnel is up (unix only).
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    let tunnel_lost = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
            false
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
            false
        }
        _ = status_rx.wait_for(|status| matches!(status, TunnelStatus::Idle)) => true,
    };

    if tunnel_lost {
        error!("Bore tunnel exited unexpectedly");
        anyhow::bail!("bore tunnel exited unexpectedly");
    }

    let outcome = supervisor.stop().await;
    info!(?outcome, "borekeeper stopped");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_tunnel(tunnel: &TunnelInfo, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(tunnel)?);
    } else {
        println!("{}", tunnel.public_url());
    }
    Ok(())
}
