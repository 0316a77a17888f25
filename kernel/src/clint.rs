//! Per-hart scheduler tick. Grounded in `original_source/src/sbi.c`'s
//! `sbi_set_timer`/`sbi_add_timer`/`sbi_ack_timer`: the CLINT itself (and the
//! M-mode CSRs that used to arm it directly) now belong to the `sbi`
//! firmware, so arming and acknowledging the tick both go through `ecall`
//! rather than touching `mtimecmp`/`mie`/`mtvec` from here.
//!
//! The firmware delegates its `MTIP` handling straight to `STIP`
//! (`sbi::trap::rust_trap_handler`), so what used to arrive here as a
//! `SupervisorSoft` interrupt from the teacher's own `__timervec` relay now
//! arrives as an ordinary `SupervisorTimer` interrupt; see `trap::kerneltrap`
//! and `trap::usertrap`.

use crate::symbols::SCHEDULER_INTERVAL;

/// Arm this hart's next tick, `SCHEDULER_INTERVAL` CLINT ticks from now.
pub fn timer_init() {
    let hart = crate::arch::hart_id();
    crate::sbi::set_timer(hart, SCHEDULER_INTERVAL as u64);
}

/// Acknowledge the tick that just fired and arm the next one.
pub fn timer_tick() {
    crate::sbi::ack_timer();
    let hart = crate::arch::hart_id();
    crate::sbi::add_timer(hart, SCHEDULER_INTERVAL as u64);
}
