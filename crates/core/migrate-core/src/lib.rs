//! # migrate-core
//!
//! Core data model for heterogeneous-ISA thread migration: architecture
//! tags, per-architecture register snapshots, the floating-point state
//! carried in userspace across a transfer, and the process-wide node
//! directory.
//!
//! ## Modules
//!
//! - [`arch`]: architecture tags and host detection
//! - [`regs`]: register set layouts and tagged snapshots
//! - [`node`]: node/architecture directory and the node-info query boundary
//! - [`error`]: the migration error taxonomy

pub mod arch;
pub mod error;
pub mod node;
pub mod regs;

pub use arch::Architecture;
pub use error::MigrationError;
pub use node::{MAX_NODES, NodeDirectory, NodeId, NodeInfo, NodeInfoSource, NodeStatus};
pub use regs::{
    FpuAarch64, FpuPowerpc64, FpuSnapshot, FpuX86_64, RegisterSnapshot, RegsetAarch64,
    RegsetPowerpc64, RegsetX86_64, StackBounds,
};
