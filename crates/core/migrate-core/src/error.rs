//! Error taxonomy for the migration runtime.
//!
//! The detector and the node directory never raise; they report sentinel
//! values. Everything in this enum is unrecoverable for the migrating
//! thread: the process-wide entry points treat these as fatal, while the
//! instance-level APIs surface them as `Result` so callers and tests can
//! observe the failure.

use thiserror::Error;

use crate::arch::Architecture;
use crate::node::NodeId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MigrationError {
    /// Destination node has no usable architecture tag. Configuration
    /// error; no valid destination register layout can be produced.
    #[error("node {node} has unsupported architecture {arch}")]
    UnsupportedArchitecture { node: NodeId, arch: Architecture },

    /// The stack-transformation engine could not rewrite the stack. The
    /// transfer must not be attempted.
    #[error("stack rewrite {source_arch} -> {target_arch} failed: {reason}")]
    RewriteFailed {
        source_arch: Architecture,
        target_arch: Architecture,
        reason: String,
    },

    /// The transfer primitive did not hand the thread off.
    #[error("couldn't migrate to node {node}: {reason}")]
    TransferFailed { node: NodeId, reason: String },

    /// A migration was requested while this thread already has one in
    /// flight.
    #[error("migration already outstanding for this thread")]
    MigrationOutstanding,

    /// Register capture is not implemented for the host architecture.
    #[error("register capture unsupported on {arch}")]
    CaptureUnsupported { arch: Architecture },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_failure() {
        let err = MigrationError::TransferFailed {
            node: 3,
            reason: "handoff rejected".into(),
        };
        assert!(err.to_string().contains("couldn't migrate"));
        assert!(err.to_string().contains("node 3"));

        let err = MigrationError::UnsupportedArchitecture {
            node: 1,
            arch: Architecture::Unsupported,
        };
        assert!(err.to_string().contains("unsupported"));
    }
}
