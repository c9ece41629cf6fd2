//! In-process backends for the rewrite and transfer boundaries.
//!
//! These stand in for the external stack-transformation engine and the
//! kernel transfer primitive during tests and single-node (same-process)
//! operation. The passthrough rewriter keeps a same-architecture stack
//! untouched and maps the general-purpose file index-wise when the
//! destination differs.

use std::sync::Mutex;

use log::debug;

use migrate_core::{
    Architecture, FpuSnapshot, MigrationError, NodeId, RegisterSnapshot, StackBounds,
};

use crate::rewrite::StackRewriter;
use crate::transfer::TransferPrimitive;

/// Degenerate rewrite engine: same-architecture rewrites return the source
/// snapshots unchanged; cross-architecture rewrites carry the
/// general-purpose and floating-point files over index-wise along with
/// sp/fp/pc, retagged for the destination.
pub struct PassthroughRewriter;

impl StackRewriter for PassthroughRewriter {
    fn rewrite_stack(
        &self,
        src: &RegisterSnapshot,
        src_fpu: &FpuSnapshot,
        src_stack: &StackBounds,
        dst: Architecture,
    ) -> Result<(RegisterSnapshot, FpuSnapshot), MigrationError> {
        if src_stack.is_empty() {
            return Err(MigrationError::RewriteFailed {
                source_arch: src.architecture(),
                target_arch: dst,
                reason: "empty source stack".into(),
            });
        }
        if src.architecture() == dst {
            return Ok((src.clone(), src_fpu.clone()));
        }

        let mut out = RegisterSnapshot::zeroed(dst).ok_or_else(|| {
            MigrationError::RewriteFailed {
                source_arch: src.architecture(),
                target_arch: dst,
                reason: "no destination register layout".into(),
            }
        })?;
        let lanes = src.gpr_count().min(out.gpr_count());
        for index in 0..lanes {
            if let Some(value) = src.gpr(index) {
                out.set_gpr(index, value);
            }
        }
        out.set_stack_pointer(src.stack_pointer());
        out.set_frame_pointer(src.frame_pointer());
        out.set_program_counter(src.program_counter());

        let mut out_fpu = FpuSnapshot::zeroed(dst).ok_or_else(|| {
            MigrationError::RewriteFailed {
                source_arch: src.architecture(),
                target_arch: dst,
                reason: "no destination floating-point layout".into(),
            }
        })?;
        let fp_lanes = src_fpu.lane_count().min(out_fpu.lane_count());
        for index in 0..fp_lanes {
            if let Some(value) = src_fpu.lane(index) {
                out_fpu.set_lane(index, value);
            }
        }

        debug!(
            "passthrough rewrite {} -> {}: {} gpr lanes, {} fp lanes",
            src.architecture(),
            dst,
            lanes,
            fp_lanes
        );
        Ok((out, out_fpu))
    }
}

/// Transfer backend that never leaves the process: it records the handoff
/// and reports success, so the shim's resumption branch runs on the same
/// thread.
#[derive(Default)]
pub struct LoopbackTransfer {
    last: Mutex<Option<(NodeId, RegisterSnapshot)>>,
    /// When set, the next transfer is refused. Lets tests exercise the
    /// fatal handoff path.
    refuse: Mutex<bool>,
}

impl LoopbackTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_next(&self) {
        *self.refuse.lock().unwrap() = true;
    }

    /// Destination and snapshot of the most recent handoff.
    pub fn last_transfer(&self) -> Option<(NodeId, RegisterSnapshot)> {
        self.last.lock().unwrap().clone()
    }
}

impl TransferPrimitive for LoopbackTransfer {
    fn transfer(&self, node: NodeId, snapshot: &RegisterSnapshot) -> Result<(), MigrationError> {
        if std::mem::take(&mut *self.refuse.lock().unwrap()) {
            return Err(MigrationError::TransferFailed {
                node,
                reason: "loopback transfer refused".into(),
            });
        }
        debug!("loopback transfer to node {}", node);
        *self.last.lock().unwrap() = Some((node, snapshot.clone()));
        Ok(())
    }
}
