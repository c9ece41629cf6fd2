//! Runtime configuration.
//!
//! Migration points for testing are configured through the environment, one
//! address-range pair per architecture; the pair for the host architecture
//! is read once at startup. When it is absent the range detector stays
//! inert.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use migrate_core::{Architecture, NodeId};

use crate::detect::MigrationRange;

/// Environment variables naming the migration address range, per
/// architecture. Values are hex addresses.
pub const ENV_START_AARCH64: &str = "AARCH64_MIGRATE_START";
pub const ENV_END_AARCH64: &str = "AARCH64_MIGRATE_END";
pub const ENV_START_POWERPC64: &str = "POWERPC64_MIGRATE_START";
pub const ENV_END_POWERPC64: &str = "POWERPC64_MIGRATE_END";
pub const ENV_START_X86_64: &str = "X86_64_MIGRATE_START";
pub const ENV_END_X86_64: &str = "X86_64_MIGRATE_END";

/// Destination node tied to each architecture's env-configured range.
fn default_range_node(arch: Architecture) -> NodeId {
    match arch {
        Architecture::Aarch64 => 0,
        Architecture::Powerpc64 => 1,
        Architecture::X86_64 => 2,
        Architecture::Unsupported => 0,
    }
}

/// Tunables for a [`crate::shim::MigrationRuntime`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Ranges for the range-based detector.
    pub ranges: Vec<MigrationRange>,
    /// Spin after resumption until released, so a debugger can attach to
    /// the freshly-resumed thread. Must stay off by default.
    pub debug_hold: bool,
    /// Measure and log the stack-rewrite latency.
    pub time_rewrite: bool,
}

impl RuntimeConfig {
    /// Read the host architecture's migration range from the environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Same as [`RuntimeConfig::from_env`] with an explicit variable lookup,
    /// so the parsing is testable without touching the process environment.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let host = Architecture::host();
        let (start_var, end_var) = match host {
            Architecture::Aarch64 => (ENV_START_AARCH64, ENV_END_AARCH64),
            Architecture::Powerpc64 => (ENV_START_POWERPC64, ENV_END_POWERPC64),
            Architecture::X86_64 => (ENV_START_X86_64, ENV_END_X86_64),
            Architecture::Unsupported => return config,
        };

        let (Some(start), Some(end)) = (lookup(start_var), lookup(end_var)) else {
            return config;
        };
        match (parse_hex(&start), parse_hex(&end)) {
            (Some(start), Some(end)) if start != 0 && end != 0 => {
                debug!(
                    "migration range from environment: [{:#x}, {:#x}) -> node {}",
                    start,
                    end,
                    default_range_node(host)
                );
                config.ranges.push(MigrationRange {
                    start,
                    end,
                    node: default_range_node(host),
                });
            }
            _ => {
                warn!(
                    "ignoring unparsable migration range: {}={:?} {}={:?}",
                    start_var, start, end_var, end
                );
            }
        }
        config
    }
}

fn parse_hex(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(digits, 16).ok()
}
