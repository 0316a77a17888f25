//! Per-process trap frame. Laid out to match the distilled boot record
//! bit-for-bit: 32 integer registers, 32 double-precision float registers,
//! then `sepc`/`sstatus`/`sie`/`satp`/`sscratch`/`stvec`/`trap_satp`/
//! `trap_stack`. This supersedes the teacher's much smaller `TrapContext`
//! (no float registers, a different field set entirely) rather than
//! extending it, since the two data models genuinely disagree.
//!
//! One field the teacher's struct carried is gone on purpose:
//! `trap_handler`. The teacher stores the kernel-virtual address of
//! `usertrap` in the frame and has `__uservec` load and `jr` to it, so the
//! trampoline doesn't need to know the handler's address at assemble time.
//! Here the trampoline is assembled into the same binary as the rest of the
//! kernel, so `__uservec` can simply `call usertrap` directly once it has
//! switched `satp` to the kernel page table -- the linker resolves the
//! address, and the frame doesn't need to carry it.

use riscv::register::stvec;

use crate::symbols::__kernelvec;

const SP: usize = 2;
const TP: usize = 4;
const A0: usize = 10;
const A7: usize = 17;

/// Resident at a fixed user-space virtual address (`TRAPFRAME_BASE_USER_VA`)
/// in every process, and swapped to/from the live CPU state by
/// `__uservec`/`__userret` via `sscratch`.
#[repr(C)]
#[derive(Default, Clone, Debug)]
pub struct TrapFrame {
    pub xreg: [usize; 32],
    pub freg: [f64; 32],
    pub sepc: usize,
    pub sstatus: usize,
    pub sie: usize,
    pub satp: usize,
    pub sscratch: usize,
    pub stvec: usize,
    /// Kernel page table to switch to on the way in; read by `__uservec`.
    pub trap_satp: usize,
    /// Kernel stack to switch to on the way in; read by `__uservec`.
    pub trap_stack: usize,
}

impl TrapFrame {
    pub fn set_tp(&mut self, tp: usize) {
        self.xreg[TP] = tp;
    }

    pub fn set_user_space_execution_addr(&mut self, addr: usize) {
        self.sepc = addr;
    }

    pub fn set_user_stack(&mut self, addr: usize) {
        self.xreg[SP] = addr;
    }

    pub fn set_kernel_stack(&mut self, addr: usize) {
        self.trap_stack = addr;
    }

    pub fn set_kernel_page_table(&mut self, satp: usize) {
        self.trap_satp = satp;
    }

    pub fn get_kernel_page_table(&self) -> usize {
        self.trap_satp
    }

    /// Advance `sepc` past the `ecall` that trapped us here, so `sret`
    /// resumes at the instruction after it rather than looping forever.
    pub fn incr_user_space_pc(&mut self, delta: usize) {
        self.sepc += delta;
    }

    /// The syscall number in `a7`, per the calling convention.
    pub fn get_syscall(&self) -> Option<crate::trap::syscall::Syscall> {
        crate::trap::syscall::Syscall::from_usize(self.xreg[A7])
    }

    /// Syscall argument `n` (0-5), read from `a0`-`a5`.
    pub fn get_arg(&self, n: usize) -> usize {
        self.xreg[A0 + n]
    }

    /// Write the syscall return value into `a0`.
    pub fn set_return_value(&mut self, val: usize) {
        self.xreg[A0] = val;
    }
}

/// set stvec to kernelvec
/// It will be set to uservec in user_return
pub fn trap_init_hart() {
    unsafe { stvec::write(__kernelvec as usize, stvec::TrapMode::Direct) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_accessors_touch_the_right_slot() {
        let mut tf = TrapFrame::default();
        tf.set_tp(7);
        tf.set_user_stack(0x1000);
        tf.set_return_value(42);
        assert_eq!(tf.xreg[TP], 7);
        assert_eq!(tf.xreg[SP], 0x1000);
        assert_eq!(tf.xreg[A0], 42);
    }

    #[test]
    fn incr_user_space_pc_advances_sepc() {
        let mut tf = TrapFrame::default();
        tf.set_user_space_execution_addr(0x8000_0000);
        tf.incr_user_space_pc(4);
        assert_eq!(tf.sepc, 0x8000_0004);
    }
}
