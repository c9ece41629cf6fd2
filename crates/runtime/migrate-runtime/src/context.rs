//! Execution-state capture and restore for the host architecture.
//!
//! Capture reads the live stack/frame pointers, program counter and
//! callee-saved general-purpose registers into a host-tagged snapshot.
//! Restore reinstalls floating-point register contents after resumption;
//! the transfer mechanism cannot carry floating-point state, so skipping
//! the restore leaves the thread with undefined floating-point values.
//!
//! Stable inline assembly exists for x86_64 and aarch64; powerpc64 capture
//! reports [`MigrationError::CaptureUnsupported`] (a powerpc64 node is
//! still a valid migration destination).

use migrate_core::{Architecture, FpuSnapshot, MigrationError, RegisterSnapshot, StackBounds};

/// Window above the live stack pointer assumed to hold the thread's stack
/// when the platform does not report exact bounds.
const DEFAULT_STACK_WINDOW: u64 = 512 * 1024;

/// Snapshot the calling thread's general-purpose register file.
pub fn capture_registers() -> Result<RegisterSnapshot, MigrationError> {
    imp::capture_registers()
}

/// Save the calling thread's floating-point register file.
pub fn capture_fpu() -> Result<FpuSnapshot, MigrationError> {
    imp::capture_fpu()
}

/// Reinstall floating-point register contents.
///
/// Must run exactly once per resumption, on the destination node, before
/// user code can observe floating-point state. The rewrite boundary hands
/// the shim a snapshot already retagged for the destination, so on a real
/// destination node the tag always matches the host. A mismatched tag
/// means untranslated state; it is refused with a log message rather than
/// installed.
pub fn restore_fpu(fpu: &FpuSnapshot) {
    if fpu.architecture() != Architecture::host() {
        log::warn!(
            "fpu snapshot tagged {} on {} host, skipping userspace restore",
            fpu.architecture(),
            Architecture::host()
        );
        return;
    }
    imp::restore_fpu(fpu);
}

/// Conservative bounds of the current thread's stack around the live stack
/// pointer.
pub fn stack_bounds() -> StackBounds {
    let probe = 0u8;
    let low = &probe as *const u8 as u64;
    StackBounds {
        high: low.saturating_add(DEFAULT_STACK_WINDOW),
        low,
    }
}

#[cfg(target_arch = "x86_64")]
mod imp {
    use std::arch::asm;

    use migrate_core::{FpuSnapshot, FpuX86_64, MigrationError, RegisterSnapshot, RegsetX86_64};

    pub(super) fn capture_registers() -> Result<RegisterSnapshot, MigrationError> {
        let mut regs = RegsetX86_64::default();
        // Callee-saved registers plus the stack/frame pointers are what the
        // rewrite engine needs to reconstruct the call stack; caller-saved
        // registers are dead at a migration point by the ABI.
        unsafe {
            asm!(
                "mov {rbx_tmp}, rbx",
                "mov {r12_tmp}, r12",
                "mov {r13_tmp}, r13",
                "mov {r14_tmp}, r14",
                "mov {r15_tmp}, r15",
                "mov {rsp_tmp}, rsp",
                "mov {rbp_tmp}, rbp",
                "lea {rip_tmp}, [rip]",
                rbx_tmp = out(reg) regs.rbx,
                r12_tmp = out(reg) regs.r12,
                r13_tmp = out(reg) regs.r13,
                r14_tmp = out(reg) regs.r14,
                r15_tmp = out(reg) regs.r15,
                rsp_tmp = out(reg) regs.rsp,
                rbp_tmp = out(reg) regs.rbp,
                rip_tmp = out(reg) regs.rip,
                options(nomem, nostack, preserves_flags)
            );
        }
        Ok(RegisterSnapshot::X86_64(regs))
    }

    pub(super) fn capture_fpu() -> Result<FpuSnapshot, MigrationError> {
        let mut fpu = FpuX86_64::default();
        unsafe {
            asm!(
                "movups [{p} + 0x00], xmm0",
                "movups [{p} + 0x10], xmm1",
                "movups [{p} + 0x20], xmm2",
                "movups [{p} + 0x30], xmm3",
                "movups [{p} + 0x40], xmm4",
                "movups [{p} + 0x50], xmm5",
                "movups [{p} + 0x60], xmm6",
                "movups [{p} + 0x70], xmm7",
                "movups [{p} + 0x80], xmm8",
                "movups [{p} + 0x90], xmm9",
                "movups [{p} + 0xa0], xmm10",
                "movups [{p} + 0xb0], xmm11",
                "movups [{p} + 0xc0], xmm12",
                "movups [{p} + 0xd0], xmm13",
                "movups [{p} + 0xe0], xmm14",
                "movups [{p} + 0xf0], xmm15",
                p = in(reg) fpu.xmm.as_mut_ptr(),
                options(nostack, preserves_flags)
            );
        }
        Ok(FpuSnapshot::X86_64(fpu))
    }

    pub(super) fn restore_fpu(fpu: &FpuSnapshot) {
        let FpuSnapshot::X86_64(fpu) = fpu else {
            return;
        };
        unsafe {
            asm!(
                "movups xmm0, [{p} + 0x00]",
                "movups xmm1, [{p} + 0x10]",
                "movups xmm2, [{p} + 0x20]",
                "movups xmm3, [{p} + 0x30]",
                "movups xmm4, [{p} + 0x40]",
                "movups xmm5, [{p} + 0x50]",
                "movups xmm6, [{p} + 0x60]",
                "movups xmm7, [{p} + 0x70]",
                "movups xmm8, [{p} + 0x80]",
                "movups xmm9, [{p} + 0x90]",
                "movups xmm10, [{p} + 0xa0]",
                "movups xmm11, [{p} + 0xb0]",
                "movups xmm12, [{p} + 0xc0]",
                "movups xmm13, [{p} + 0xd0]",
                "movups xmm14, [{p} + 0xe0]",
                "movups xmm15, [{p} + 0xf0]",
                p = in(reg) fpu.xmm.as_ptr(),
                out("xmm0") _, out("xmm1") _, out("xmm2") _, out("xmm3") _,
                out("xmm4") _, out("xmm5") _, out("xmm6") _, out("xmm7") _,
                out("xmm8") _, out("xmm9") _, out("xmm10") _, out("xmm11") _,
                out("xmm12") _, out("xmm13") _, out("xmm14") _, out("xmm15") _,
                options(nostack, preserves_flags)
            );
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod imp {
    use std::arch::asm;

    use migrate_core::{FpuAarch64, FpuSnapshot, MigrationError, RegisterSnapshot, RegsetAarch64};

    pub(super) fn capture_registers() -> Result<RegisterSnapshot, MigrationError> {
        let mut regs = RegsetAarch64::default();
        let x19: u64;
        let x20: u64;
        let x21: u64;
        let x22: u64;
        let x23: u64;
        let x24: u64;
        let x25: u64;
        let x26: u64;
        let x27: u64;
        let x28: u64;
        let fp: u64;
        let lr: u64;
        let sp: u64;
        let pc: u64;
        unsafe {
            asm!(
                "mov {x19_tmp}, x19",
                "mov {x20_tmp}, x20",
                "mov {x21_tmp}, x21",
                "mov {x22_tmp}, x22",
                "mov {x23_tmp}, x23",
                "mov {x24_tmp}, x24",
                "mov {x25_tmp}, x25",
                "mov {x26_tmp}, x26",
                "mov {x27_tmp}, x27",
                "mov {x28_tmp}, x28",
                "mov {fp_tmp}, x29",
                "mov {lr_tmp}, x30",
                "mov {sp_tmp}, sp",
                "adr {pc_tmp}, .",
                x19_tmp = out(reg) x19,
                x20_tmp = out(reg) x20,
                x21_tmp = out(reg) x21,
                x22_tmp = out(reg) x22,
                x23_tmp = out(reg) x23,
                x24_tmp = out(reg) x24,
                x25_tmp = out(reg) x25,
                x26_tmp = out(reg) x26,
                x27_tmp = out(reg) x27,
                x28_tmp = out(reg) x28,
                fp_tmp = out(reg) fp,
                lr_tmp = out(reg) lr,
                sp_tmp = out(reg) sp,
                pc_tmp = out(reg) pc,
                options(nomem, nostack, preserves_flags)
            );
        }
        regs.x[19] = x19;
        regs.x[20] = x20;
        regs.x[21] = x21;
        regs.x[22] = x22;
        regs.x[23] = x23;
        regs.x[24] = x24;
        regs.x[25] = x25;
        regs.x[26] = x26;
        regs.x[27] = x27;
        regs.x[28] = x28;
        regs.x[29] = fp;
        regs.x[30] = lr;
        regs.sp = sp;
        regs.pc = pc;
        Ok(RegisterSnapshot::Aarch64(regs))
    }

    pub(super) fn capture_fpu() -> Result<FpuSnapshot, MigrationError> {
        let mut fpu = FpuAarch64::default();
        unsafe {
            asm!(
                "stp q0, q1, [{p}, #0x000]",
                "stp q2, q3, [{p}, #0x020]",
                "stp q4, q5, [{p}, #0x040]",
                "stp q6, q7, [{p}, #0x060]",
                "stp q8, q9, [{p}, #0x080]",
                "stp q10, q11, [{p}, #0x0a0]",
                "stp q12, q13, [{p}, #0x0c0]",
                "stp q14, q15, [{p}, #0x0e0]",
                "stp q16, q17, [{p}, #0x100]",
                "stp q18, q19, [{p}, #0x120]",
                "stp q20, q21, [{p}, #0x140]",
                "stp q22, q23, [{p}, #0x160]",
                "stp q24, q25, [{p}, #0x180]",
                "stp q26, q27, [{p}, #0x1a0]",
                "stp q28, q29, [{p}, #0x1c0]",
                "stp q30, q31, [{p}, #0x1e0]",
                p = in(reg) fpu.v.as_mut_ptr(),
                options(nostack, preserves_flags)
            );
        }
        Ok(FpuSnapshot::Aarch64(fpu))
    }

    pub(super) fn restore_fpu(fpu: &FpuSnapshot) {
        let FpuSnapshot::Aarch64(fpu) = fpu else {
            return;
        };
        unsafe {
            asm!(
                "ldp q0, q1, [{p}, #0x000]",
                "ldp q2, q3, [{p}, #0x020]",
                "ldp q4, q5, [{p}, #0x040]",
                "ldp q6, q7, [{p}, #0x060]",
                "ldp q8, q9, [{p}, #0x080]",
                "ldp q10, q11, [{p}, #0x0a0]",
                "ldp q12, q13, [{p}, #0x0c0]",
                "ldp q14, q15, [{p}, #0x0e0]",
                "ldp q16, q17, [{p}, #0x100]",
                "ldp q18, q19, [{p}, #0x120]",
                "ldp q20, q21, [{p}, #0x140]",
                "ldp q22, q23, [{p}, #0x160]",
                "ldp q24, q25, [{p}, #0x180]",
                "ldp q26, q27, [{p}, #0x1a0]",
                "ldp q28, q29, [{p}, #0x1c0]",
                "ldp q30, q31, [{p}, #0x1e0]",
                p = in(reg) fpu.v.as_ptr(),
                out("v0") _, out("v1") _, out("v2") _, out("v3") _,
                out("v4") _, out("v5") _, out("v6") _, out("v7") _,
                out("v8") _, out("v9") _, out("v10") _, out("v11") _,
                out("v12") _, out("v13") _, out("v14") _, out("v15") _,
                out("v16") _, out("v17") _, out("v18") _, out("v19") _,
                out("v20") _, out("v21") _, out("v22") _, out("v23") _,
                out("v24") _, out("v25") _, out("v26") _, out("v27") _,
                out("v28") _, out("v29") _, out("v30") _, out("v31") _,
                options(nostack, preserves_flags)
            );
        }
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
mod imp {
    use migrate_core::{Architecture, FpuSnapshot, MigrationError, RegisterSnapshot};

    pub(super) fn capture_registers() -> Result<RegisterSnapshot, MigrationError> {
        Err(MigrationError::CaptureUnsupported {
            arch: Architecture::host(),
        })
    }

    pub(super) fn capture_fpu() -> Result<FpuSnapshot, MigrationError> {
        Err(MigrationError::CaptureUnsupported {
            arch: Architecture::host(),
        })
    }

    pub(super) fn restore_fpu(_fpu: &FpuSnapshot) {}
}
