//! Host platform detection and the bore release target table.

/// Operating system and CPU architecture of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X64,
    Arm64,
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::Darwin => write!(f, "darwin"),
            Self::Windows => write!(f, "windows"),
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X64 => write!(f, "x64"),
            Self::Arm64 => write!(f, "arm64"),
        }
    }
}

impl Os {
    /// Classify an OS name as reported by `std::env::consts::OS`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "linux" => Some(Self::Linux),
            "macos" | "darwin" => Some(Self::Darwin),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }
}

impl Arch {
    /// Classify an architecture name as reported by `std::env::consts::ARCH`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "x86_64" | "x64" | "amd64" => Some(Self::X64),
            "aarch64" | "arm64" => Some(Self::Arm64),
            _ => None,
        }
    }
}

/// Bundled bore builds, keyed by (os, arch).
const BORE_TARGETS: &[(Os, Arch, &str)] = &[
    (Os::Linux, Arch::X64, "linux-x64"),
    (Os::Darwin, Arch::X64, "darwin-x64"),
    (Os::Darwin, Arch::Arm64, "darwin-arm64"),
];

impl Platform {
    /// Target identifier of the bundled bore build, if one exists for this
    /// platform.
    pub fn bore_target(&self) -> Option<&'static str> {
        BORE_TARGETS
            .iter()
            .find(|(os, arch, _)| *os == self.os && *arch == self.arch)
            .map(|(_, _, target)| *target)
    }
}

/// Parse an OS/arch name pair. Returns `None` if either is unknown.
pub fn detect(os: &str, arch: &str) -> Option<Platform> {
    Some(Platform {
        os: Os::from_name(os)?,
        arch: Arch::from_name(arch)?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn linux_x64_maps_to_bundle() {
        let p = detect("linux", "x86_64").unwrap();
        assert_eq!(p.bore_target(), Some("linux-x64"));
    }

    #[test]
    fn macos_both_arches_map_to_bundle() {
        assert_eq!(detect("macos", "x86_64").unwrap().bore_target(), Some("darwin-x64"));
        assert_eq!(detect("macos", "aarch64").unwrap().bore_target(), Some("darwin-arm64"));
    }

    #[test]
    fn linux_arm64_has_no_bundle() {
        let p = detect("linux", "aarch64").unwrap();
        assert_eq!(p.arch, Arch::Arm64);
        assert_eq!(p.bore_target(), None);
    }

    #[test]
    fn windows_has_no_bundle() {
        let p = Platform { os: Os::Windows, arch: Arch::X64 };
        assert_eq!(p.bore_target(), None);
    }

    #[test]
    fn unknown_names_are_not_detected() {
        assert!(detect("freebsd", "x86_64").is_none());
        assert!(detect("linux", "riscv64").is_none());
    }

    #[test]
    fn target_ids_follow_display_names() {
        for (os, arch, target) in BORE_TARGETS {
            assert_eq!(*target, format!("{os}-{arch}"));
        }
    }
}
