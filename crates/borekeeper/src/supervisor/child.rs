//! Event loop that owns a spawned bore process.
//!
//! One task per child multiplexes stdout/stderr lines, the startup deadline,
//! stop requests and process exit. It is the only code that touches the
//! `Child`, so signals and reads never race.

use std::process::ExitStatus;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::StopOutcome;
use super::config::Timeouts;
use super::readiness::parse_ready_line;
use super::state::{TunnelInfo, TunnelStatus};
use crate::error::TunnelError;

pub(super) type ReadySender = oneshot::Sender<Result<TunnelInfo, TunnelError>>;
pub(super) type ReadyReceiver = oneshot::Receiver<Result<TunnelInfo, TunnelError>>;

/// Requests from the supervisor to the child task.
pub(super) enum Control {
    Stop { done: oneshot::Sender<StopOutcome> },
}

/// Why the event loop ended.
enum Ended {
    Stopped {
        outcome: StopOutcome,
        done: Option<oneshot::Sender<StopOutcome>>,
    },
    StartupTimeout {
        outcome: StopOutcome,
    },
    Exited(ExitStatus),
    WaitFailed(std::io::Error),
}

pub(super) struct ChildTask {
    child: Child,
    ready: Option<ReadySender>,
    control: mpsc::Receiver<Control>,
    status: watch::Sender<TunnelStatus>,
    timeouts: Timeouts,
}

impl ChildTask {
    pub(super) fn new(
        child: Child,
        ready: ReadySender,
        control: mpsc::Receiver<Control>,
        status: watch::Sender<TunnelStatus>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            child,
            ready: Some(ready),
            control,
            status,
            timeouts,
        }
    }

    pub(super) async fn run(mut self) {
        let mut stdout = self.child.stdout.take().map(OutputLines::new);
        let mut stderr = self.child.stderr.take().map(OutputLines::new);

        let deadline = tokio::time::sleep(self.timeouts.startup);
        tokio::pin!(deadline);

        let ended = loop {
            tokio::select! {
                // Output first, so a notice written just before exit is seen.
                biased;

                line = next_line(&mut stdout) => match line {
                    Ok(Some(line)) => self.on_output("stdout", &line),
                    Ok(None) => stdout = None,
                    Err(e) => {
                        warn!(stream = "stdout", error = %e, "Failed to read bore output");
                        stdout = None;
                    }
                },
                line = next_line(&mut stderr) => match line {
                    Ok(Some(line)) => self.on_output("stderr", &line),
                    Ok(None) => stderr = None,
                    Err(e) => {
                        warn!(stream = "stderr", error = %e, "Failed to read bore output");
                        stderr = None;
                    }
                },
                cmd = self.control.recv() => match cmd {
                    Some(Control::Stop { done }) => {
                        let outcome = self.shutdown().await;
                        break Ended::Stopped { outcome, done: Some(done) };
                    }
                    None => {
                        debug!("Supervisor dropped, killing bore");
                        self.child.kill().await.ok();
                        break Ended::Stopped { outcome: StopOutcome::Forced, done: None };
                    }
                },
                result = self.child.wait() => match result {
                    Ok(status) => break Ended::Exited(status),
                    Err(e) => break Ended::WaitFailed(e),
                },
                () = &mut deadline, if self.ready.is_some() => {
                    warn!(timeout = ?self.timeouts.startup, "Bore startup timeout, stopping process");
                    self.status.send_replace(TunnelStatus::Stopping);
                    let outcome = self.shutdown().await;
                    break Ended::StartupTimeout { outcome };
                }
            }
        };

        // Stop requests that arrived while the loop was busy shutting down
        // are answered with the outcome it reached.
        self.control.close();
        let mut late_stops = Vec::new();
        while let Ok(Control::Stop { done }) = self.control.try_recv() {
            late_stops.push(done);
        }

        self.status.send_replace(TunnelStatus::Idle);
        self.settle(ended, late_stops);
    }

    /// Scan one line of output for the readiness notice.
    fn on_output(&mut self, stream: &'static str, line: &str) {
        debug!(stream, line, "Bore output");

        if self.ready.is_none() {
            return;
        }
        let Some(info) = parse_ready_line(line) else {
            return;
        };

        // A stop may already be underway; never flip Stopping back to Running.
        let published = self.status.send_if_modified(|status| {
            if matches!(status, TunnelStatus::Starting) {
                *status = TunnelStatus::Running(info.clone());
                true
            } else {
                false
            }
        });
        if !published {
            return;
        }

        info!(public_url = info.public_url(), "Bore tunnel started");
        if let Some(ready) = self.ready.take() {
            ready.send(Ok(info)).ok();
        }
    }

    /// Graceful signal, bounded wait, then kill.
    async fn shutdown(&mut self) -> StopOutcome {
        send_terminate(&mut self.child);

        match tokio::time::timeout(self.timeouts.stop_grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(?status, "Bore tunnel stopped");
                StopOutcome::Graceful
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Error waiting for bore process, killing");
                self.child.kill().await.ok();
                StopOutcome::Forced
            }
            Err(_) => {
                warn!(
                    grace = ?self.timeouts.stop_grace,
                    "Bore process did not exit gracefully, forcing kill"
                );
                self.child.kill().await.ok();
                StopOutcome::Forced
            }
        }
    }

    /// Report the end of the loop to whoever is still waiting.
    fn settle(mut self, ended: Ended, late_stops: Vec<oneshot::Sender<StopOutcome>>) {
        let reached = match &ended {
            Ended::Stopped { outcome, .. } | Ended::StartupTimeout { outcome } => *outcome,
            Ended::Exited(_) | Ended::WaitFailed(_) => StopOutcome::AlreadyIdle,
        };
        for done in late_stops {
            done.send(reached).ok();
        }

        let ready_result = match ended {
            Ended::Stopped { outcome, done } => {
                if let Some(done) = done {
                    done.send(outcome).ok();
                }
                Err(TunnelError::Stopped)
            }
            Ended::StartupTimeout { .. } => Err(TunnelError::StartupTimeout(self.timeouts.startup)),
            Ended::Exited(status) => {
                match status.code() {
                    Some(code) if code != 0 => {
                        error!(code, "Bore process exited with code {code}");
                    }
                    _ => info!(?status, "Bore process exited"),
                }
                Err(TunnelError::AbnormalExit(status))
            }
            Ended::WaitFailed(e) => {
                error!(error = %e, "Failed to wait for bore process");
                Err(TunnelError::Wait(e))
            }
        };

        if let Some(ready) = self.ready.take() {
            ready.send(ready_result).ok();
        }
    }
}

/// Line reader over a child pipe that tolerates non-UTF-8 output.
struct OutputLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next line, invalid UTF-8 replaced with U+FFFD; `None` at EOF.
    ///
    /// Cancel safe: bytes of a partially read line stay in `buf`. A trailing
    /// line without a newline is returned at EOF.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        self.buf.clear();
        Ok(Some(line))
    }
}

/// Next line from an optional reader; pends forever once the stream is gone.
async fn next_line<R>(lines: &mut Option<OutputLines<R>>) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    match lines {
        Some(reader) => reader.next_line().await,
        None => std::future::pending().await,
    }
}

/// Ask the child to exit: SIGTERM on unix, immediate kill elsewhere.
#[cfg_attr(unix, allow(clippy::needless_pass_by_ref_mut))]
fn send_terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: pid comes from our own un-reaped Child handle, and
            // kill(2) with SIGTERM has no memory-safety preconditions.
            #[allow(unsafe_code)]
            #[allow(clippy::cast_possible_wrap)]
            let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
            if ret != 0 {
                let err = std::io::Error::last_os_error();
                warn!(pid, error = %err, "Failed to send SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = child.start_kill() {
            warn!(error = %e, "Failed to terminate bore process");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_utf8_does_not_end_the_stream() {
        let input: &[u8] = b"conn \xff\xfe ok\nlistening at bore.pub:1234\n";
        let mut lines = OutputLines::new(input);

        let first = lines.next_line().await.unwrap().unwrap();
        assert_eq!(first, "conn \u{fffd}\u{fffd} ok");
        let second = lines.next_line().await.unwrap().unwrap();
        assert_eq!(second, "listening at bore.pub:1234");
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unterminated_last_line_is_returned_at_eof() {
        let input: &[u8] = b"starting\r\nlistening at bore.pub:1234";
        let mut lines = OutputLines::new(input);

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "starting");
        let last = lines.next_line().await.unwrap().unwrap();
        assert!(parse_ready_line(&last).is_some(), "got {last:?}");
        assert!(lines.next_line().await.unwrap().is_none());
    }
}
