//! Locating and verifying the `bore` executable.
//!
//! Resolution order: an explicit override, then a bundled build under
//! `<install-root>/binaries/bore-<target>/bore`, then `bore` on `PATH`.
//! Whatever is chosen must pass a `--version` self-check before the
//! supervisor will spawn it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::TunnelError;
use crate::platform::{self, Platform};

/// Name of the bore executable, both bundled and on `PATH`.
pub const EXECUTABLE_NAME: &str = "bore";

/// Directory prefix of bundled builds (`binaries/bore-linux-x64/`).
const BUNDLE_PREFIX: &str = "bore";

/// Default bound on the `--version` self-check.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Outcome of mapping a platform to a bore executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// An operator-supplied executable.
    Configured(PathBuf),
    /// A bundled build exists on disk.
    Bundled(PathBuf),
    /// No bundled build; rely on `PATH` lookup at spawn time.
    SearchPath(&'static str),
    /// The platform has no bore build at all.
    Unsupported,
}

/// Path where the bundled build for `target` is expected.
pub fn bundled_path(install_root: &Path, target: &str) -> PathBuf {
    install_root
        .join("binaries")
        .join(format!("{BUNDLE_PREFIX}-{target}"))
        .join(EXECUTABLE_NAME)
}

/// Map a platform to a bore executable.
pub fn resolve(platform: Option<Platform>, install_root: &Path) -> Resolution {
    let Some(target) = platform.and_then(|p| p.bore_target()) else {
        return Resolution::Unsupported;
    };

    let path = bundled_path(install_root, target);
    if path.is_file() {
        debug!(path = %path.display(), "Found bundled bore binary");
        return Resolution::Bundled(path);
    }

    debug!(
        install_root = %install_root.display(),
        "Bundled bore binary not found, falling back to PATH"
    );
    Resolution::SearchPath(EXECUTABLE_NAME)
}

/// Run `<program> --version` and report whether it exited cleanly in time.
///
/// A check that outlives `timeout` is killed and counts as a failure.
pub async fn verify(program: &Path, timeout: Duration) -> bool {
    let mut child = match Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            debug!(program = %program.display(), error = %e, "bore self-check failed to spawn");
            return false;
        }
    };

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => {
            debug!(program = %program.display(), "Bore binary verified");
            true
        }
        Ok(Ok(status)) => {
            debug!(program = %program.display(), %status, "bore self-check exited unsuccessfully");
            false
        }
        Ok(Err(e)) => {
            debug!(program = %program.display(), error = %e, "Error waiting for bore self-check");
            false
        }
        Err(_) => {
            warn!(program = %program.display(), ?timeout, "bore self-check timed out, killing");
            child.kill().await.ok();
            false
        }
    }
}

/// Finds a verified bore executable for the supervisor.
#[derive(Debug, Clone)]
pub struct BinaryLocator {
    os: String,
    arch: String,
    install_root: PathBuf,
    explicit: Option<PathBuf>,
}

impl BinaryLocator {
    /// Locator for the host platform, looking for bundles under `install_root`.
    pub fn new(install_root: PathBuf) -> Self {
        Self::for_platform(std::env::consts::OS, std::env::consts::ARCH, install_root)
    }

    /// Locator for an arbitrary OS/arch pair, named as in `std::env::consts`.
    pub fn for_platform(os: &str, arch: &str, install_root: PathBuf) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
            install_root,
            explicit: None,
        }
    }

    /// Use this executable instead of consulting the platform table.
    #[must_use]
    pub fn with_explicit_binary(mut self, path: PathBuf) -> Self {
        self.explicit = Some(path);
        self
    }

    /// Directory containing the running executable, or the working
    /// directory if that cannot be determined.
    pub fn default_install_root() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Pick a candidate without running it.
    pub fn resolution(&self) -> Resolution {
        if let Some(path) = &self.explicit {
            return Resolution::Configured(path.clone());
        }
        resolve(platform::detect(&self.os, &self.arch), &self.install_root)
    }

    /// Resolve and verify, returning the program to spawn.
    pub async fn locate(&self, verify_timeout: Duration) -> Result<PathBuf, TunnelError> {
        let program = match self.resolution() {
            Resolution::Configured(path) | Resolution::Bundled(path) => path,
            Resolution::SearchPath(name) => PathBuf::from(name),
            Resolution::Unsupported => {
                warn!(os = %self.os, arch = %self.arch, "Unsupported platform/arch for bore");
                return Err(TunnelError::UnsupportedPlatform {
                    os: self.os.clone(),
                    arch: self.arch.clone(),
                });
            }
        };

        if verify(&program, verify_timeout).await {
            Ok(program)
        } else {
            Err(TunnelError::BinaryNotFound {
                candidate: program.display().to_string(),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bundled_path_follows_convention() {
        let path = bundled_path(Path::new("/srv/app"), "darwin-arm64");
        assert_eq!(path, PathBuf::from("/srv/app/binaries/bore-darwin-arm64/bore"));
    }

    #[test]
    fn unsupported_platform_resolves_to_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let p = platform::detect("windows", "x86_64");
        assert_eq!(resolve(p, dir.path()), Resolution::Unsupported);
        assert_eq!(resolve(None, dir.path()), Resolution::Unsupported);
    }

    #[test]
    fn missing_bundle_falls_back_to_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let p = platform::detect("linux", "x86_64");
        assert_eq!(resolve(p, dir.path()), Resolution::SearchPath("bore"));
    }

    #[test]
    fn existing_bundle_is_preferred() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = bundled_path(dir.path(), "linux-x64");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();

        let p = platform::detect("linux", "x86_64");
        assert_eq!(resolve(p, dir.path()), Resolution::Bundled(path));
    }

    #[test]
    fn explicit_binary_skips_table() {
        let locator = BinaryLocator::for_platform("plan9", "mips", PathBuf::from("/nowhere"))
            .with_explicit_binary(PathBuf::from("/opt/bore"));
        assert_eq!(locator.resolution(), Resolution::Configured(PathBuf::from("/opt/bore")));
    }

    #[tokio::test]
    async fn unsupported_platform_is_reported_before_spawning() {
        let locator = BinaryLocator::for_platform("linux", "riscv64", PathBuf::from("/nowhere"));
        let err = locator.locate(DEFAULT_VERIFY_TIMEOUT).await.unwrap_err();
        assert!(
            matches!(err, TunnelError::UnsupportedPlatform { ref os, ref arch } if os == "linux" && arch == "riscv64"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn nonexistent_program_fails_verification() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(!verify(&dir.path().join("no-such-bore"), DEFAULT_VERIFY_TIMEOUT).await);
    }
}
