//! Machine-mode trap entry and the high-level dispatch behind it. Grounded
//! in `original_source/sbi/src/ctrap.c` for the C-level dispatch, and in
//! the (unincluded in the source pack) assembly trap stub its comments
//! reference — rebuilt here following the standard mscratch-swap save/
//! restore idiom used by bare-metal RISC-V trap vectors.
//!
//! `mscratch` always holds a pointer to this hart's 32-word GPR save area
//! (one of [`crate::config::MAX_ALLOWABLE_HARTS`] slots, set up once in
//! [`crate::main`]). The vector swaps it into `t6`, spills every other
//! register there, then calls into [`handle`] with the saved frame and
//! hart id.

use crate::csr::{self, cause};
use crate::{clint, hart, plic, svcall};

core::arch::global_asm!(
    r#"
.section .text
.align 4
.global sbi_trap_vector
sbi_trap_vector:
    csrrw t6, mscratch, t6
    sd x1,  1*8(t6)
    sd x2,  2*8(t6)
    sd x3,  3*8(t6)
    sd x4,  4*8(t6)
    sd x5,  5*8(t6)
    sd x6,  6*8(t6)
    sd x7,  7*8(t6)
    sd x8,  8*8(t6)
    sd x9,  9*8(t6)
    sd x10, 10*8(t6)
    sd x11, 11*8(t6)
    sd x12, 12*8(t6)
    sd x13, 13*8(t6)
    sd x14, 14*8(t6)
    sd x15, 15*8(t6)
    sd x16, 16*8(t6)
    sd x17, 17*8(t6)
    sd x18, 18*8(t6)
    sd x19, 19*8(t6)
    sd x20, 20*8(t6)
    sd x21, 21*8(t6)
    sd x22, 22*8(t6)
    sd x23, 23*8(t6)
    sd x24, 24*8(t6)
    sd x25, 25*8(t6)
    sd x26, 26*8(t6)
    sd x27, 27*8(t6)
    sd x28, 28*8(t6)
    sd x29, 29*8(t6)
    sd x30, 30*8(t6)
    csrr t5, mscratch
    sd t5, 31*8(t6)
    csrw mscratch, t6
    mv a0, t6
    csrr a1, mhartid
    call rust_trap_handler
    csrr t6, mscratch
    ld x1,  1*8(t6)
    ld x2,  2*8(t6)
    ld x3,  3*8(t6)
    ld x4,  4*8(t6)
    ld x5,  5*8(t6)
    ld x6,  6*8(t6)
    ld x7,  7*8(t6)
    ld x8,  8*8(t6)
    ld x9,  9*8(t6)
    ld x10, 10*8(t6)
    ld x11, 11*8(t6)
    ld x12, 12*8(t6)
    ld x13, 13*8(t6)
    ld x14, 14*8(t6)
    ld x15, 15*8(t6)
    ld x16, 16*8(t6)
    ld x17, 17*8(t6)
    ld x18, 18*8(t6)
    ld x19, 19*8(t6)
    ld x20, 20*8(t6)
    ld x21, 21*8(t6)
    ld x22, 22*8(t6)
    ld x23, 23*8(t6)
    ld x24, 24*8(t6)
    ld x25, 25*8(t6)
    ld x26, 26*8(t6)
    ld x27, 27*8(t6)
    ld x28, 28*8(t6)
    ld x29, 29*8(t6)
    ld x30, 30*8(t6)
    ld x31, 31*8(t6)
    mret

.global park
park:
    wfi
    j park
"#
);

extern "C" {
    pub fn park();
    pub fn sbi_trap_vector();
}

/// Called from the asm vector above with the saved GPR frame and the
/// current hart id. Handles machine-software/timer/external interrupts and
/// S-mode ECALLs directly; everything else hangs the hart (matches the
/// source this is grounded on, which treats an unrecognized synchronous
/// trap as unrecoverable).
#[no_mangle]
extern "C" fn rust_trap_handler(trapframe: *mut usize, hart_id: usize) {
    let mcause = unsafe { csr::read_mcause() };
    let mepc = unsafe { csr::read_mepc() };

    if csr::mcause_is_async(mcause) {
        match csr::mcause_num(mcause) {
            cause::MSIP => hart::handle_msip(hart_id),
            cause::MTIP => {
                // delegate the timer interrupt to S-mode and disarm mtimecmp
                // so it doesn't keep firing until the kernel reprograms it
                unsafe {
                    let mip = csr::read_mip();
                    csr::write_mip(mip | (1 << cause::STIP));
                }
                clint::set_mtimecmp(hart_id, clint::MTIMECMP_INFINITE);
            }
            cause::MEIP => plic::handle_irq(hart_id),
            other => {
                crate::uart_println!("[SBI]: unhandled asynchronous cause {} on hart {}", other, hart_id);
            }
        }
    } else {
        match csr::mcause_num(mcause) {
            cause::ECALL_S_MODE => {
                svcall::handle(hart_id, trapframe);
                unsafe { csr::write_mepc(mepc + 4) };
            }
            other => {
                crate::uart_println!(
                    "[SBI]: unhandled synchronous cause {} on hart {}, hanging",
                    other,
                    hart_id
                );
                loop {
                    unsafe { csr::wfi() };
                }
            }
        }
    }
}
