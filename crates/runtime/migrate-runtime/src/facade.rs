//! Process-wide entry points.
//!
//! A single runtime is installed once during startup; the free functions
//! here are the thin public surface that user code and compiler-inserted
//! hooks call. Failures at this surface are fatal, matching the protocol's
//! error taxonomy: there is no recovery from a half-performed migration.

use std::sync::{Arc, OnceLock};

use log::error;

use migrate_core::NodeId;

use crate::shim::{Continuation, MigrationRuntime};

static RUNTIME: OnceLock<Arc<MigrationRuntime>> = OnceLock::new();

/// Install the process-wide runtime. Returns `false` if one was already
/// installed (the first writer wins).
pub fn init(runtime: Arc<MigrationRuntime>) -> bool {
    RUNTIME.set(runtime).is_ok()
}

/// The installed runtime, if any.
pub fn global_runtime() -> Option<&'static Arc<MigrationRuntime>> {
    RUNTIME.get()
}

fn runtime_or_abort() -> &'static Arc<MigrationRuntime> {
    match RUNTIME.get() {
        Some(runtime) => runtime,
        None => {
            error!("migration requested before runtime initialization");
            panic!("migration runtime not initialized");
        }
    }
}

/// Unconditionally migrate the calling thread to `node`. Control resumes
/// inside the continuation (if any) on the destination; failure aborts.
pub fn migrate(node: NodeId, callback: Option<Continuation>) {
    if let Err(err) = runtime_or_abort().migrate(node, callback) {
        error!("couldn't migrate: {}", err);
        panic!("couldn't migrate: {}", err);
    }
}

/// Opportunistic migration check for the candidate program counter `pc`.
/// A "no migration" detector answer returns normally.
pub fn check_migrate_at(pc: u64, callback: Option<Continuation>) {
    if let Err(err) = runtime_or_abort().check_migrate_at(pc, callback) {
        error!("couldn't migrate: {}", err);
        panic!("couldn't migrate: {}", err);
    }
}

/// Set the process-wide continuation used by the compiler-inserted
/// function-boundary hooks. Last writer wins.
pub fn register_migrate_callback(callback: Continuation) {
    runtime_or_abort().register_migrate_callback(callback);
}

/// Hook inserted at function entry by an instrumentation pass. A no-op
/// until the runtime is installed.
pub fn profile_func_enter(function: u64) {
    if let Some(runtime) = RUNTIME.get()
        && let Err(err) = runtime.on_function_enter(function)
    {
        error!("couldn't migrate: {}", err);
        panic!("couldn't migrate: {}", err);
    }
}

/// Hook inserted at function exit by an instrumentation pass. A no-op
/// until the runtime is installed.
pub fn profile_func_exit(function: u64) {
    if let Some(runtime) = RUNTIME.get()
        && let Err(err) = runtime.on_function_exit(function)
    {
        error!("couldn't migrate: {}", err);
        panic!("couldn't migrate: {}", err);
    }
}
