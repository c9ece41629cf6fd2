//! # migrate-runtime
//!
//! Orchestration for live migration of a running thread between nodes of a
//! heterogeneous-ISA cluster: migration-point detection, execution-state
//! capture, the boundary calls into the stack-transformation engine and
//! the transfer primitive, and the reentrant shim that resumes the thread
//! on the destination architecture.
//!
//! ## Modules
//!
//! - [`config`]: runtime tunables and environment-configured test ranges
//! - [`detect`]: migration-point detection policies
//! - [`context`]: host register/FPU capture and restore
//! - [`rewrite`]: boundary to the external stack-transformation engine
//! - [`transfer`]: boundary to the opaque node-to-node transfer primitive
//! - [`shim`]: the migration shim and resumption protocol
//! - [`loopback`]: in-process backends for tests and single-node use
//! - [`facade`]: process-wide entry points

pub mod config;
pub mod context;
pub mod detect;
pub mod facade;
pub mod loopback;
pub mod macros;
pub mod rewrite;
pub mod shim;
pub mod transfer;

pub use config::RuntimeConfig;
pub use detect::{DetectionPolicy, MigrationRange, ProposalSource, RangeDetector};
pub use facade::{
    check_migrate_at, global_runtime, init, migrate, profile_func_enter, profile_func_exit,
    register_migrate_callback,
};
pub use loopback::{LoopbackTransfer, PassthroughRewriter};
pub use rewrite::StackRewriter;
pub use shim::{Continuation, MigrationRuntime, MigrationStatsSnapshot, shim_resume_entry};
pub use transfer::TransferPrimitive;

// The core data model is part of this crate's public API.
pub use migrate_core::{
    Architecture, FpuSnapshot, MAX_NODES, MigrationError, NodeDirectory, NodeId, NodeInfo,
    NodeInfoSource, NodeStatus, RegisterSnapshot, StackBounds,
};
