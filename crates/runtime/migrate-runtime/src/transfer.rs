//! Boundary to the opaque node-to-node transfer primitive.

use migrate_core::{MigrationError, NodeId, RegisterSnapshot};

/// Relocate the calling thread to another node.
///
/// Contract: on a kernel-backed implementation a successful transfer does
/// not return on the source side; the thread's next observable execution
/// is at the snapshot's program counter on the destination node. A return
/// of `Ok(())` therefore means "this invocation is now logically executing
/// on the destination"; in-process loopback backends return `Ok`
/// immediately. `Err` means the handoff did not happen, which is fatal to
/// the migration attempt.
pub trait TransferPrimitive: Send + Sync {
    fn transfer(&self, node: NodeId, snapshot: &RegisterSnapshot) -> Result<(), MigrationError>;
}
