//! Migration-point detection.
//!
//! Decides, at a candidate program-counter location, whether this thread
//! should migrate right now and to which node. Two mutually exclusive
//! policies: address-range matching for deterministic testing, and a
//! non-blocking query to the scheduling subsystem for production. "No
//! migration" is the overwhelmingly common result and must stay cheap.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use log::debug;
use serde::{Deserialize, Serialize};

use migrate_core::NodeId;

/// Half-open program-counter range `[start, end)` with its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRange {
    pub start: u64,
    pub end: u64,
    pub node: NodeId,
}

impl MigrationRange {
    pub fn contains(&self, pc: u64) -> bool {
        self.start <= pc && pc < self.end
    }
}

/// Non-blocking query to the scheduler: has a migration been proposed for
/// the calling thread? A `Some(node)` answer names the destination.
pub trait ProposalSource: Send + Sync {
    fn proposed_node(&self) -> Option<NodeId>;
}

/// Range-based detector: each configured range triggers at most once per
/// thread, so a test harness can force a migration at a specific call site
/// deterministically.
#[derive(Debug)]
pub struct RangeDetector {
    ranges: Vec<MigrationRange>,
    // (thread, range index) pairs that already fired. Owned here so the
    // one-shot bookkeeping is reclaimed with the detector.
    fired: Mutex<HashSet<(ThreadId, usize)>>,
}

impl RangeDetector {
    pub fn new(ranges: Vec<MigrationRange>) -> Self {
        Self {
            ranges,
            fired: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_inert(&self) -> bool {
        self.ranges.is_empty()
    }

    fn decide(&self, pc: u64) -> Option<NodeId> {
        if self.ranges.is_empty() {
            return None;
        }
        let thread = std::thread::current().id();
        let mut fired = match self.fired.lock() {
            Ok(fired) => fired,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (index, range) in self.ranges.iter().enumerate() {
            if range.contains(pc) && fired.insert((thread, index)) {
                debug!(
                    "migration point hit: pc {:#x} in [{:#x}, {:#x}) -> node {}",
                    pc, range.start, range.end, range.node
                );
                return Some(range.node);
            }
        }
        None
    }
}

/// Detector policy, selected once when the runtime is built.
pub enum DetectionPolicy {
    /// Testing policy: environment/config-driven address ranges.
    Ranges(RangeDetector),
    /// Production policy: defer placement to the external scheduler.
    Proposals(Arc<dyn ProposalSource>),
}

impl DetectionPolicy {
    pub fn from_ranges(ranges: Vec<MigrationRange>) -> Self {
        Self::Ranges(RangeDetector::new(ranges))
    }

    /// At most one destination per call; callers invoke this at every
    /// candidate migration point.
    pub fn decide_migration(&self, pc: u64) -> Option<NodeId> {
        match self {
            Self::Ranges(detector) => detector.decide(pc),
            Self::Proposals(source) => source.proposed_node(),
        }
    }
}

impl std::fmt::Debug for DetectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ranges(detector) => f.debug_tuple("Ranges").field(detector).finish(),
            Self::Proposals(_) => f.debug_tuple("Proposals").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u64, end: u64, node: NodeId) -> MigrationRange {
        MigrationRange { start, end, node }
    }

    #[test]
    fn test_range_contains_is_half_open() {
        let r = range(0x100, 0x200, 0);
        assert!(r.contains(0x100));
        assert!(r.contains(0x1ff));
        assert!(!r.contains(0x200));
        assert!(!r.contains(0xff));
    }

    #[test]
    fn test_empty_detector_is_inert() {
        let policy = DetectionPolicy::from_ranges(vec![]);
        assert_eq!(policy.decide_migration(0x1234), None);
    }

    #[test]
    fn test_range_detector_fires_once_per_thread() {
        let policy = DetectionPolicy::from_ranges(vec![range(0x1000, 0x2000, 4)]);
        assert_eq!(policy.decide_migration(0x1800), Some(4));
        // Same in-range pc on the same thread: already migrated here.
        assert_eq!(policy.decide_migration(0x1800), None);
        assert_eq!(policy.decide_migration(0x1000), None);
    }

    #[test]
    fn test_out_of_range_pc_never_fires() {
        let policy = DetectionPolicy::from_ranges(vec![range(0x1000, 0x2000, 4)]);
        assert_eq!(policy.decide_migration(0x2000), None);
        assert_eq!(policy.decide_migration(0xfff), None);
        // Misses must not consume the one-shot.
        assert_eq!(policy.decide_migration(0x1000), Some(4));
    }

    #[test]
    fn test_disjoint_ranges_fire_independently() {
        let policy = DetectionPolicy::from_ranges(vec![
            range(0x1000, 0x2000, 1),
            range(0x8000, 0x9000, 2),
        ]);
        assert_eq!(policy.decide_migration(0x1100), Some(1));
        assert_eq!(policy.decide_migration(0x8100), Some(2));
        assert_eq!(policy.decide_migration(0x1100), None);
        assert_eq!(policy.decide_migration(0x8100), None);
    }

    #[test]
    fn test_detectors_do_not_share_one_shot_state() {
        let first = DetectionPolicy::from_ranges(vec![range(0x1000, 0x2000, 1)]);
        let second = DetectionPolicy::from_ranges(vec![range(0x1000, 0x2000, 2)]);
        assert_eq!(first.decide_migration(0x1500), Some(1));
        assert_eq!(second.decide_migration(0x1500), Some(2));
    }

    #[test]
    fn test_one_shot_state_dies_with_the_detector() {
        let policy = DetectionPolicy::from_ranges(vec![range(0x1000, 0x2000, 1)]);
        assert_eq!(policy.decide_migration(0x1500), Some(1));
        assert_eq!(policy.decide_migration(0x1500), None);
        drop(policy);

        // A replacement detector over the same range starts fresh; nothing
        // spent by the dropped one lingers.
        let policy = DetectionPolicy::from_ranges(vec![range(0x1000, 0x2000, 1)]);
        assert_eq!(policy.decide_migration(0x1500), Some(1));
    }

    #[test]
    fn test_one_shot_is_per_thread() {
        let policy = Arc::new(DetectionPolicy::from_ranges(vec![range(0x1000, 0x2000, 3)]));
        assert_eq!(policy.decide_migration(0x1500), Some(3));
        assert_eq!(policy.decide_migration(0x1500), None);

        let other = Arc::clone(&policy);
        let from_other_thread = std::thread::spawn(move || other.decide_migration(0x1500))
            .join()
            .unwrap();
        // A fresh thread has not migrated under this range yet.
        assert_eq!(from_other_thread, Some(3));
    }

    struct QueueSource(std::sync::Mutex<Vec<Option<NodeId>>>);

    impl ProposalSource for QueueSource {
        fn proposed_node(&self) -> Option<NodeId> {
            self.0.lock().unwrap().pop().flatten()
        }
    }

    #[test]
    fn test_proposal_policy_reports_scheduler_answer() {
        let source = Arc::new(QueueSource(std::sync::Mutex::new(vec![
            None,
            Some(5),
        ])));
        let policy = DetectionPolicy::Proposals(source);
        assert_eq!(policy.decide_migration(0), Some(5));
        assert_eq!(policy.decide_migration(0), None);
    }
}
