//! The migration shim and resumption protocol.
//!
//! One reentrant routine drives every migration. It runs twice per
//! migration: once on the source node to package state and invoke the
//! transfer, and once on the destination node to finish resumption. The
//! two cases are disambiguated solely by whether this thread's handshake
//! data is present. Before the transfer the destination program counter is
//! pointed back at the shim, so the far side reenters it; the shim is its
//! own trampoline across the architecture boundary.
//!
//! Resume order: take and clear the handshake, hold for a debugger if
//! configured, restore floating-point state, run the continuation, clear
//! the migration flag. Floating-point state is restored *before* the
//! continuation so user code never observes partially-restored state.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use log::{debug, error, info};

use migrate_core::{MigrationError, NodeDirectory, NodeId, RegisterSnapshot};

use crate::config::RuntimeConfig;
use crate::context;
use crate::detect::DetectionPolicy;
use crate::rewrite::{StackRewriter, invoke_rewrite};
use crate::transfer::TransferPrimitive;

/// Continuation invoked immediately after successful resumption.
pub type Continuation = Arc<dyn Fn() + Send + Sync + 'static>;

/// Per-thread handshake record. Created immediately before the transfer is
/// requested; consumed and cleared exactly once upon resumption, before any
/// user continuation logic runs.
struct ShimData {
    callback: Option<Continuation>,
    /// Destination register snapshot. A kernel-backed transfer installs it
    /// on the far side; the resumption branch dumps it for post-mortems.
    regset: RegisterSnapshot,
    /// Floating-point state, already rewritten for the destination
    /// architecture. The transfer cannot carry it, so resumption installs
    /// it from here.
    fpu: migrate_core::FpuSnapshot,
}

thread_local! {
    // The handshake lives in thread-local storage so the resumption branch
    // can locate it with no other channel. At most one per thread.
    static HANDSHAKE: RefCell<Option<ShimData>> = const { RefCell::new(None) };

    // Destination of the in-flight migration, if any. Strictly per-thread.
    static MIGRATE_FLAG: Cell<Option<NodeId>> = const { Cell::new(None) };
}

/// Protocol counters.
#[derive(Debug, Default)]
pub struct MigrationStats {
    initiated: AtomicU64,
    resumed: AtomicU64,
    fpu_restores: AtomicU64,
}

/// Point-in-time view of [`MigrationStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatsSnapshot {
    pub initiated: u64,
    pub resumed: u64,
    pub fpu_restores: u64,
}

impl MigrationStats {
    pub fn snapshot(&self) -> MigrationStatsSnapshot {
        MigrationStatsSnapshot {
            initiated: self.initiated.load(Ordering::Relaxed),
            resumed: self.resumed.load(Ordering::Relaxed),
            fpu_restores: self.fpu_restores.load(Ordering::Relaxed),
        }
    }
}

/// Orchestrates migrations for this process: detector, capture, rewrite
/// boundary, transfer boundary and the resumption protocol.
pub struct MigrationRuntime {
    directory: NodeDirectory,
    policy: DetectionPolicy,
    rewriter: Arc<dyn StackRewriter>,
    transfer: Arc<dyn TransferPrimitive>,
    config: RuntimeConfig,
    stats: MigrationStats,
    // Process-wide continuation for compiler-inserted migration points.
    registered: RwLock<Option<Continuation>>,
    hold_released: AtomicBool,
}

impl MigrationRuntime {
    pub fn new(
        directory: NodeDirectory,
        policy: DetectionPolicy,
        rewriter: Arc<dyn StackRewriter>,
        transfer: Arc<dyn TransferPrimitive>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            directory,
            policy,
            rewriter,
            transfer,
            config,
            stats: MigrationStats::default(),
            registered: RwLock::new(None),
            hold_released: AtomicBool::new(false),
        }
    }

    pub fn directory(&self) -> &NodeDirectory {
        &self.directory
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn stats(&self) -> MigrationStatsSnapshot {
        self.stats.snapshot()
    }

    /// Destination of this thread's in-flight migration, if one is pending.
    pub fn migration_in_flight() -> Option<NodeId> {
        MIGRATE_FLAG.get()
    }

    /// Whether this thread has un-consumed handshake data.
    pub fn handshake_pending() -> bool {
        HANDSHAKE.with(|h| h.borrow().is_some())
    }

    /// Set the process-wide continuation used by the function-boundary
    /// hooks. Last writer wins; there is no unregister.
    pub fn register_migrate_callback(&self, callback: Continuation) {
        *self.registered.write().unwrap() = Some(callback);
    }

    /// Release a thread spinning in the post-resumption debug hold.
    pub fn release_debug_hold(&self) {
        self.hold_released.store(true, Ordering::Release);
    }

    /// Unconditionally migrate the calling thread to `node`, running
    /// `callback` immediately after resumption on the destination.
    pub fn migrate(&self, node: NodeId, callback: Option<Continuation>) -> Result<(), MigrationError> {
        self.migration_shim(node, callback)
    }

    /// Detector-gated migration for an explicit candidate program counter;
    /// a "no migration" answer is a cheap no-op.
    pub fn check_migrate_at(
        &self,
        pc: u64,
        callback: Option<Continuation>,
    ) -> Result<(), MigrationError> {
        match self.policy.decide_migration(pc) {
            Some(node) => self.migration_shim(node, callback),
            None => Ok(()),
        }
    }

    /// Compiler hook: function entry.
    pub fn on_function_enter(&self, function: u64) -> Result<(), MigrationError> {
        self.check_instrumented_point(function)
    }

    /// Compiler hook: function exit.
    pub fn on_function_exit(&self, function: u64) -> Result<(), MigrationError> {
        self.check_instrumented_point(function)
    }

    fn check_instrumented_point(&self, function: u64) -> Result<(), MigrationError> {
        match self.policy.decide_migration(function) {
            Some(node) => {
                let callback = self.registered.read().unwrap().clone();
                self.migration_shim(node, callback)
            }
            None => Ok(()),
        }
    }

    /// Finish a resumption if this thread has handshake data pending.
    ///
    /// This is what the shim reentry address leads to on the destination
    /// node. Returns `Ok(false)` when there is nothing to resume.
    pub fn resume_pending(&self) -> Result<bool, MigrationError> {
        match HANDSHAKE.with(|h| h.borrow_mut().take()) {
            Some(data) => {
                self.finish_resume(data);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The reentrant shim. Handshake data present means we are on the
    /// destination side of a transfer; absent means a migration is being
    /// initiated.
    fn migration_shim(
        &self,
        node: NodeId,
        callback: Option<Continuation>,
    ) -> Result<(), MigrationError> {
        match HANDSHAKE.with(|h| h.borrow_mut().take()) {
            Some(data) => {
                self.finish_resume(data);
                Ok(())
            }
            None => self.initiate(node, callback),
        }
    }

    fn initiate(&self, node: NodeId, callback: Option<Continuation>) -> Result<(), MigrationError> {
        if MIGRATE_FLAG.get().is_some() {
            return Err(MigrationError::MigrationOutstanding);
        }

        let dst_arch = self.directory.architecture_of(node);
        if !dst_arch.is_supported() {
            error!("migration requested to node {} with no usable architecture", node);
            return Err(MigrationError::UnsupportedArchitecture {
                node,
                arch: dst_arch,
            });
        }

        let src = context::capture_registers()?;
        src.dump();
        let src_fpu = context::capture_fpu()?;
        let stack = context::stack_bounds();
        MIGRATE_FLAG.set(Some(node));

        let (mut dst, dst_fpu) = match invoke_rewrite(
            self.rewriter.as_ref(),
            &src,
            &src_fpu,
            &stack,
            dst_arch,
            self.config.time_rewrite,
        ) {
            Ok(rewritten) => rewritten,
            Err(err) => {
                // The stack was not rewritten; the transfer must not run.
                MIGRATE_FLAG.set(None);
                error!("stack rewrite failed, aborting migration: {}", err);
                return Err(err);
            }
        };

        // Reenter this same routine on the far side.
        dst.set_program_counter(shim_reentry_address());

        HANDSHAKE.with(|h| {
            *h.borrow_mut() = Some(ShimData {
                callback,
                regset: dst.clone(),
                fpu: dst_fpu,
            });
        });
        self.stats.initiated.fetch_add(1, Ordering::Relaxed);
        info!("migrating to node {} ({})", node, dst_arch);

        match self.transfer.transfer(node, &dst) {
            Ok(()) => {
                // Logically on the destination now; the reentry consumes the
                // handshake and finishes resumption.
                self.migration_shim(node, None)
            }
            Err(err) => {
                // No partial migration state may be left resumable.
                HANDSHAKE.with(|h| *h.borrow_mut() = None);
                MIGRATE_FLAG.set(None);
                error!("couldn't migrate: {}", err);
                Err(err)
            }
        }
    }

    fn finish_resume(&self, data: ShimData) {
        if self.config.debug_hold {
            // Wait for a debugger to attach to the freshly-resumed thread.
            while !self.hold_released.load(Ordering::Acquire) {
                std::thread::yield_now();
            }
        }

        data.regset.dump();
        context::restore_fpu(&data.fpu);
        self.stats.fpu_restores.fetch_add(1, Ordering::Relaxed);

        if let Some(callback) = data.callback {
            callback();
        }

        MIGRATE_FLAG.set(None);
        self.stats.resumed.fetch_add(1, Ordering::Relaxed);
        debug!("resumption complete");
    }
}

/// Address a kernel-backed transfer points the destination program counter
/// at: the thread lands here and finishes resumption through the global
/// runtime.
pub extern "C" fn shim_resume_entry() {
    if let Some(runtime) = crate::facade::global_runtime() {
        // A missing handshake here means a stray reentry; nothing to do.
        let _ = runtime.resume_pending();
    }
}

fn shim_reentry_address() -> u64 {
    shim_resume_entry as usize as u64
}
