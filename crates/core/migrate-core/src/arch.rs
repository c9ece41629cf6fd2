//! Architecture tags for migration sources and destinations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// CPU architecture of a cluster node or a captured register snapshot.
///
/// `Unsupported` is the sentinel recorded for nodes that are absent,
/// inactive, or report an architecture this runtime cannot target. A tag is
/// immutable once assigned to a snapshot or a directory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    Aarch64,
    Powerpc64,
    X86_64,
    Unsupported,
}

impl Architecture {
    /// Number of architectures a migration can target.
    pub const NUM_SUPPORTED: usize = 3;

    /// Decode the kernel's node-info architecture encoding.
    ///
    /// The wire encoding is positional: 0 = aarch64, 1 = powerpc64,
    /// 2 = x86_64. Anything else maps to the sentinel.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Architecture::Aarch64,
            1 => Architecture::Powerpc64,
            2 => Architecture::X86_64,
            _ => Architecture::Unsupported,
        }
    }

    /// Architecture this process was compiled for.
    pub fn host() -> Self {
        #[cfg(target_arch = "aarch64")]
        {
            Architecture::Aarch64
        }
        #[cfg(target_arch = "powerpc64")]
        {
            Architecture::Powerpc64
        }
        #[cfg(target_arch = "x86_64")]
        {
            Architecture::X86_64
        }
        #[cfg(not(any(
            target_arch = "aarch64",
            target_arch = "powerpc64",
            target_arch = "x86_64"
        )))]
        {
            Architecture::Unsupported
        }
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, Architecture::Unsupported)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Aarch64 => write!(f, "aarch64"),
            Architecture::Powerpc64 => write!(f, "powerpc64"),
            Architecture::X86_64 => write!(f, "x86_64"),
            Architecture::Unsupported => write!(f, "unsupported"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_known_values() {
        assert_eq!(Architecture::from_raw(0), Architecture::Aarch64);
        assert_eq!(Architecture::from_raw(1), Architecture::Powerpc64);
        assert_eq!(Architecture::from_raw(2), Architecture::X86_64);
    }

    #[test]
    fn test_from_raw_out_of_range() {
        assert_eq!(Architecture::from_raw(-1), Architecture::Unsupported);
        assert_eq!(Architecture::from_raw(3), Architecture::Unsupported);
        assert_eq!(Architecture::from_raw(i32::MAX), Architecture::Unsupported);
    }

    #[test]
    fn test_is_supported() {
        assert!(Architecture::X86_64.is_supported());
        assert!(Architecture::Aarch64.is_supported());
        assert!(Architecture::Powerpc64.is_supported());
        assert!(!Architecture::Unsupported.is_supported());
    }

    #[test]
    fn test_display() {
        assert_eq!(Architecture::Aarch64.to_string(), "aarch64");
        assert_eq!(Architecture::X86_64.to_string(), "x86_64");
        assert_eq!(Architecture::Powerpc64.to_string(), "powerpc64");
    }

    #[test]
    fn test_host_is_consistent() {
        // Whatever the build host is, it must round-trip through Display.
        let host = Architecture::host();
        let _ = host.to_string();
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&Architecture::Powerpc64).unwrap();
        let back: Architecture = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Architecture::Powerpc64);
    }
}
