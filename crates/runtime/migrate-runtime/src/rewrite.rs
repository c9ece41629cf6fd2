//! Boundary to the external stack-transformation engine.
//!
//! The engine rewrites the captured call stack frame-by-frame into the
//! destination architecture's ABI and returns a destination register
//! snapshot whose stack and frame pointers reference the rewritten stack.
//! The engine does *not* choose where execution resumes: the shim points
//! the destination program counter back at itself afterwards, so that the
//! far side reenters the resumption protocol.

use std::time::Instant;

use log::{debug, error};

use migrate_core::{Architecture, FpuSnapshot, MigrationError, RegisterSnapshot, StackBounds};

/// Frame-by-frame stack rewrite for a destination architecture.
pub trait StackRewriter: Send + Sync {
    /// Produce destination-architecture register and floating-point
    /// snapshots equivalent to `src` and `src_fpu`.
    ///
    /// The floating-point file must come back retagged for `dst`. It never
    /// crosses the transfer primitive, so whatever this returns is exactly
    /// what gets reinstalled on the destination side.
    ///
    /// A failure here is fatal to the migration attempt; no partially
    /// rewritten stack is ever resumable.
    fn rewrite_stack(
        &self,
        src: &RegisterSnapshot,
        src_fpu: &FpuSnapshot,
        src_stack: &StackBounds,
        dst: Architecture,
    ) -> Result<(RegisterSnapshot, FpuSnapshot), MigrationError>;
}

/// Validate the destination tag and invoke the engine, optionally timing
/// the rewrite.
///
/// An unrecognized destination tag is a configuration error and fails
/// before the engine runs.
pub fn invoke_rewrite(
    engine: &dyn StackRewriter,
    src: &RegisterSnapshot,
    src_fpu: &FpuSnapshot,
    src_stack: &StackBounds,
    dst: Architecture,
    time_rewrite: bool,
) -> Result<(RegisterSnapshot, FpuSnapshot), MigrationError> {
    if !dst.is_supported() {
        error!("stack rewrite requested for unsupported destination tag");
        return Err(MigrationError::RewriteFailed {
            source_arch: src.architecture(),
            target_arch: dst,
            reason: "unsupported destination architecture".into(),
        });
    }

    let started = time_rewrite.then(Instant::now);
    let (dst_regs, dst_fpu) = engine.rewrite_stack(src, src_fpu, src_stack, dst)?;
    if let Some(started) = started {
        debug!(
            "stack transformation time: {}ns",
            started.elapsed().as_nanos()
        );
    }

    debug_assert_eq!(dst_regs.architecture(), dst);
    debug_assert_eq!(dst_fpu.architecture(), dst);
    Ok((dst_regs, dst_fpu))
}
