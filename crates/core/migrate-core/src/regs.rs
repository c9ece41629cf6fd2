//! Per-architecture register sets and the tagged snapshot types that carry
//! them across a migration.
//!
//! Each supported architecture has its own register file layout; a
//! [`RegisterSnapshot`] is always tagged with the architecture it was
//! captured for and dispatches stack/frame-pointer access by that tag.
//! Snapshots are produced fresh for each migration attempt and owned
//! exclusively by the migrating thread.

use log::debug;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

use crate::arch::Architecture;

/// aarch64 general-purpose state: x0..x30, stack pointer, program counter.
///
/// The frame pointer is `x29`, the link register `x30` (AAPCS64).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegsetAarch64 {
    pub x: [u64; 31],
    pub sp: u64,
    pub pc: u64,
}

/// powerpc64 general-purpose state: r0..r31 plus link/count registers.
///
/// The stack pointer is `r1`, the frame pointer `r31` (ELFv2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegsetPowerpc64 {
    pub r: [u64; 32],
    pub lr: u64,
    pub ctr: u64,
    pub pc: u64,
}

/// x86-64 general-purpose state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegsetX86_64 {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rflags: u64,
    pub rip: u64,
}

impl Default for RegsetAarch64 {
    fn default() -> Self {
        Self {
            x: [0; 31],
            sp: 0,
            pc: 0,
        }
    }
}

impl Default for RegsetPowerpc64 {
    fn default() -> Self {
        Self {
            r: [0; 32],
            lr: 0,
            ctr: 0,
            pc: 0,
        }
    }
}

impl Default for RegsetX86_64 {
    fn default() -> Self {
        Self {
            rax: 0,
            rbx: 0,
            rcx: 0,
            rdx: 0,
            rsi: 0,
            rdi: 0,
            rbp: 0,
            rsp: 0,
            r8: 0,
            r9: 0,
            r10: 0,
            r11: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rflags: 0,
            rip: 0,
        }
    }
}

// Register files are plain u64 words; a layout change here changes what a
// transfer backend ships between nodes.
const_assert_eq!(core::mem::size_of::<RegsetAarch64>(), 33 * 8);
const_assert_eq!(core::mem::size_of::<RegsetPowerpc64>(), 35 * 8);
const_assert_eq!(core::mem::size_of::<RegsetX86_64>(), 18 * 8);

/// A captured general-purpose register file, tagged with its architecture.
///
/// Always a tagged variant, never an untagged overlay: every access
/// dispatches on the architecture explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterSnapshot {
    Aarch64(RegsetAarch64),
    Powerpc64(RegsetPowerpc64),
    X86_64(RegsetX86_64),
}

impl RegisterSnapshot {
    /// An all-zero snapshot for a supported architecture.
    ///
    /// Returns `None` for the `Unsupported` sentinel; there is no register
    /// layout to instantiate.
    pub fn zeroed(arch: Architecture) -> Option<Self> {
        match arch {
            Architecture::Aarch64 => Some(Self::Aarch64(RegsetAarch64::default())),
            Architecture::Powerpc64 => Some(Self::Powerpc64(RegsetPowerpc64::default())),
            Architecture::X86_64 => Some(Self::X86_64(RegsetX86_64::default())),
            Architecture::Unsupported => None,
        }
    }

    pub fn architecture(&self) -> Architecture {
        match self {
            Self::Aarch64(_) => Architecture::Aarch64,
            Self::Powerpc64(_) => Architecture::Powerpc64,
            Self::X86_64(_) => Architecture::X86_64,
        }
    }

    pub fn program_counter(&self) -> u64 {
        match self {
            Self::Aarch64(r) => r.pc,
            Self::Powerpc64(r) => r.pc,
            Self::X86_64(r) => r.rip,
        }
    }

    pub fn set_program_counter(&mut self, pc: u64) {
        match self {
            Self::Aarch64(r) => r.pc = pc,
            Self::Powerpc64(r) => r.pc = pc,
            Self::X86_64(r) => r.rip = pc,
        }
    }

    /// Stack pointer: `sp` / `r1` / `rsp` depending on the tag.
    pub fn stack_pointer(&self) -> u64 {
        match self {
            Self::Aarch64(r) => r.sp,
            Self::Powerpc64(r) => r.r[1],
            Self::X86_64(r) => r.rsp,
        }
    }

    pub fn set_stack_pointer(&mut self, sp: u64) {
        match self {
            Self::Aarch64(r) => r.sp = sp,
            Self::Powerpc64(r) => r.r[1] = sp,
            Self::X86_64(r) => r.rsp = sp,
        }
    }

    /// Frame pointer: `x29` / `r31` / `rbp` depending on the tag.
    pub fn frame_pointer(&self) -> u64 {
        match self {
            Self::Aarch64(r) => r.x[29],
            Self::Powerpc64(r) => r.r[31],
            Self::X86_64(r) => r.rbp,
        }
    }

    pub fn set_frame_pointer(&mut self, fp: u64) {
        match self {
            Self::Aarch64(r) => r.x[29] = fp,
            Self::Powerpc64(r) => r.r[31] = fp,
            Self::X86_64(r) => r.rbp = fp,
        }
    }

    /// Number of indexable general-purpose registers for this tag.
    pub fn gpr_count(&self) -> usize {
        match self {
            Self::Aarch64(_) => 31,
            Self::Powerpc64(_) => 32,
            Self::X86_64(_) => 16,
        }
    }

    /// Read a general-purpose register by index.
    ///
    /// x86-64 uses the hardware encoding order (RAX=0, RCX=1, RDX=2, RBX=3,
    /// RSP=4, RBP=5, RSI=6, RDI=7, R8..R15); aarch64 and powerpc64 index
    /// `x0..x30` and `r0..r31` directly.
    pub fn gpr(&self, index: usize) -> Option<u64> {
        match self {
            Self::Aarch64(r) => r.x.get(index).copied(),
            Self::Powerpc64(r) => r.r.get(index).copied(),
            Self::X86_64(r) => match index {
                0 => Some(r.rax),
                1 => Some(r.rcx),
                2 => Some(r.rdx),
                3 => Some(r.rbx),
                4 => Some(r.rsp),
                5 => Some(r.rbp),
                6 => Some(r.rsi),
                7 => Some(r.rdi),
                8 => Some(r.r8),
                9 => Some(r.r9),
                10 => Some(r.r10),
                11 => Some(r.r11),
                12 => Some(r.r12),
                13 => Some(r.r13),
                14 => Some(r.r14),
                15 => Some(r.r15),
                _ => None,
            },
        }
    }

    /// Write a general-purpose register by index; out-of-range writes are
    /// ignored. Index order matches [`RegisterSnapshot::gpr`].
    pub fn set_gpr(&mut self, index: usize, value: u64) {
        match self {
            Self::Aarch64(r) => {
                if let Some(slot) = r.x.get_mut(index) {
                    *slot = value;
                }
            }
            Self::Powerpc64(r) => {
                if let Some(slot) = r.r.get_mut(index) {
                    *slot = value;
                }
            }
            Self::X86_64(r) => match index {
                0 => r.rax = value,
                1 => r.rcx = value,
                2 => r.rdx = value,
                3 => r.rbx = value,
                4 => r.rsp = value,
                5 => r.rbp = value,
                6 => r.rsi = value,
                7 => r.rdi = value,
                8 => r.r8 = value,
                9 => r.r9 = value,
                10 => r.r10 = value,
                11 => r.r11 = value,
                12 => r.r12 = value,
                13 => r.r13 = value,
                14 => r.r14 = value,
                15 => r.r15 = value,
                _ => {}
            },
        }
    }

    /// Log pc/sp/fp at debug level.
    pub fn dump(&self) {
        debug!(
            "regset[{}] pc={:#018x} sp={:#018x} fp={:#018x}",
            self.architecture(),
            self.program_counter(),
            self.stack_pointer(),
            self.frame_pointer()
        );
    }
}

/// aarch64 SIMD/FP state: v0..v31.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpuAarch64 {
    pub v: [u128; 32],
}

/// powerpc64 vector-scalar state: vsr0..vsr31.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpuPowerpc64 {
    pub vsr: [u128; 32],
}

/// x86-64 SSE state: xmm0..xmm15.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpuX86_64 {
    pub xmm: [u128; 16],
}

impl Default for FpuAarch64 {
    fn default() -> Self {
        Self { v: [0; 32] }
    }
}

impl Default for FpuPowerpc64 {
    fn default() -> Self {
        Self { vsr: [0; 32] }
    }
}

impl Default for FpuX86_64 {
    fn default() -> Self {
        Self { xmm: [0; 16] }
    }
}

/// Floating-point register state carried in userspace across a migration.
///
/// The transfer mechanism cannot move floating-point registers between
/// nodes, so the shim saves them before the transfer and reinstalls them on
/// the destination immediately after resumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FpuSnapshot {
    Aarch64(FpuAarch64),
    Powerpc64(FpuPowerpc64),
    X86_64(FpuX86_64),
}

impl FpuSnapshot {
    /// An all-zero snapshot for a supported architecture.
    pub fn zeroed(arch: Architecture) -> Option<Self> {
        match arch {
            Architecture::Aarch64 => Some(Self::Aarch64(FpuAarch64::default())),
            Architecture::Powerpc64 => Some(Self::Powerpc64(FpuPowerpc64::default())),
            Architecture::X86_64 => Some(Self::X86_64(FpuX86_64::default())),
            Architecture::Unsupported => None,
        }
    }

    pub fn architecture(&self) -> Architecture {
        match self {
            Self::Aarch64(_) => Architecture::Aarch64,
            Self::Powerpc64(_) => Architecture::Powerpc64,
            Self::X86_64(_) => Architecture::X86_64,
        }
    }

    /// Number of 128-bit lanes for this tag.
    pub fn lane_count(&self) -> usize {
        match self {
            Self::Aarch64(f) => f.v.len(),
            Self::Powerpc64(f) => f.vsr.len(),
            Self::X86_64(f) => f.xmm.len(),
        }
    }

    /// Read a 128-bit lane by index.
    pub fn lane(&self, index: usize) -> Option<u128> {
        match self {
            Self::Aarch64(f) => f.v.get(index).copied(),
            Self::Powerpc64(f) => f.vsr.get(index).copied(),
            Self::X86_64(f) => f.xmm.get(index).copied(),
        }
    }

    /// Write a 128-bit lane by index; out-of-range writes are ignored.
    pub fn set_lane(&mut self, index: usize, value: u128) {
        let slot = match self {
            Self::Aarch64(f) => f.v.get_mut(index),
            Self::Powerpc64(f) => f.vsr.get_mut(index),
            Self::X86_64(f) => f.xmm.get_mut(index),
        };
        if let Some(slot) = slot {
            *slot = value;
        }
    }
}

/// Bounds of the migrating thread's stack, handed to the rewrite engine.
///
/// `high` is the highest (base) address, `low` the lowest; the live stack
/// occupies `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackBounds {
    pub high: u64,
    pub low: u64,
}

impl StackBounds {
    pub fn len(&self) -> u64 {
        self.high.saturating_sub(self.low)
    }

    pub fn is_empty(&self) -> bool {
        self.high <= self.low
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.low <= addr && addr < self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_snapshot_tags() {
        for arch in [
            Architecture::Aarch64,
            Architecture::Powerpc64,
            Architecture::X86_64,
        ] {
            let snap = RegisterSnapshot::zeroed(arch).unwrap();
            assert_eq!(snap.architecture(), arch);
            assert_eq!(snap.program_counter(), 0);
        }
    }

    #[test]
    fn test_zeroed_unsupported_is_none() {
        assert!(RegisterSnapshot::zeroed(Architecture::Unsupported).is_none());
    }

    #[test]
    fn test_x86_64_sp_fp_mapping() {
        let mut snap = RegisterSnapshot::zeroed(Architecture::X86_64).unwrap();
        snap.set_stack_pointer(0x7fff_0000);
        snap.set_frame_pointer(0x7fff_1000);
        snap.set_program_counter(0x40_0000);
        match &snap {
            RegisterSnapshot::X86_64(r) => {
                assert_eq!(r.rsp, 0x7fff_0000);
                assert_eq!(r.rbp, 0x7fff_1000);
                assert_eq!(r.rip, 0x40_0000);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_aarch64_frame_pointer_is_x29() {
        let mut snap = RegisterSnapshot::zeroed(Architecture::Aarch64).unwrap();
        snap.set_frame_pointer(0xdead_beef);
        match &snap {
            RegisterSnapshot::Aarch64(r) => assert_eq!(r.x[29], 0xdead_beef),
            _ => unreachable!(),
        }
        assert_eq!(snap.gpr(29), Some(0xdead_beef));
    }

    #[test]
    fn test_powerpc64_sp_is_r1_fp_is_r31() {
        let mut snap = RegisterSnapshot::zeroed(Architecture::Powerpc64).unwrap();
        snap.set_stack_pointer(0x1000);
        snap.set_frame_pointer(0x2000);
        match &snap {
            RegisterSnapshot::Powerpc64(r) => {
                assert_eq!(r.r[1], 0x1000);
                assert_eq!(r.r[31], 0x2000);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_gpr_index_bounds() {
        let snap = RegisterSnapshot::zeroed(Architecture::X86_64).unwrap();
        assert!(snap.gpr(15).is_some());
        assert!(snap.gpr(16).is_none());

        let snap = RegisterSnapshot::zeroed(Architecture::Aarch64).unwrap();
        assert!(snap.gpr(30).is_some());
        assert!(snap.gpr(31).is_none());
    }

    #[test]
    fn test_set_gpr_out_of_range_is_ignored() {
        let mut snap = RegisterSnapshot::zeroed(Architecture::Powerpc64).unwrap();
        snap.set_gpr(64, 7);
        assert_eq!(snap, RegisterSnapshot::zeroed(Architecture::Powerpc64).unwrap());
    }

    #[test]
    fn test_snapshot_serde_round_trip() {
        let mut snap = RegisterSnapshot::zeroed(Architecture::Aarch64).unwrap();
        snap.set_program_counter(0x1234);
        snap.set_stack_pointer(0x5678);
        let json = serde_json::to_string(&snap).unwrap();
        let back: RegisterSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn test_fpu_lane_round_trip() {
        let mut fpu = FpuSnapshot::zeroed(Architecture::Aarch64).unwrap();
        fpu.set_lane(0, 0x1111_2222_3333_4444);
        fpu.set_lane(31, u128::MAX);
        assert_eq!(fpu.lane(0), Some(0x1111_2222_3333_4444));
        assert_eq!(fpu.lane(31), Some(u128::MAX));
        assert_eq!(fpu.lane(32), None);
    }

    #[test]
    fn test_fpu_set_lane_out_of_range_is_ignored() {
        let mut fpu = FpuSnapshot::zeroed(Architecture::X86_64).unwrap();
        fpu.set_lane(16, 7);
        assert_eq!(fpu, FpuSnapshot::zeroed(Architecture::X86_64).unwrap());
    }

    #[test]
    fn test_fpu_zeroed_unsupported_is_none() {
        assert!(FpuSnapshot::zeroed(Architecture::Unsupported).is_none());
    }

    #[test]
    fn test_fpu_lane_counts() {
        assert_eq!(FpuSnapshot::X86_64(FpuX86_64::default()).lane_count(), 16);
        assert_eq!(FpuSnapshot::Aarch64(FpuAarch64::default()).lane_count(), 32);
        assert_eq!(
            FpuSnapshot::Powerpc64(FpuPowerpc64::default()).lane_count(),
            32
        );
    }

    #[test]
    fn test_stack_bounds() {
        let bounds = StackBounds {
            high: 0x8000,
            low: 0x4000,
        };
        assert_eq!(bounds.len(), 0x4000);
        assert!(bounds.contains(0x4000));
        assert!(bounds.contains(0x7fff));
        assert!(!bounds.contains(0x8000));
        assert!(!bounds.is_empty());
    }
}
