//! Platform-level interrupt controller driver.
//!
//! QEMU's `virt` PLIC interleaves one machine-mode and one supervisor-mode
//! context per HART: context `2*hart` is M-mode, context `2*hart+1` is
//! S-mode. The kernel only ever touches its own HART's S-mode context.

use core::cell::SyncUnsafeCell;

use crate::{
    arch::hart_id,
    mm::layout::{
        PLIC_CONTEXT_BASE, PLIC_CONTEXT_STRIDE, PLIC_ENABLE_BASE, PLIC_ENABLE_STRIDE, PLIC_PENDING,
    },
};

/// S-mode PLIC context index for a given HART.
#[inline]
#[allow(non_snake_case)]
const fn S_CONTEXT(hart: usize) -> usize {
    2 * hart + 1
}

#[inline]
#[allow(non_snake_case)]
fn PLIC_SENABLE(hart: usize) -> usize {
    PLIC_ENABLE_BASE + S_CONTEXT(hart) * PLIC_ENABLE_STRIDE
}

#[inline]
#[allow(non_snake_case)]
fn PLIC_STHRESHOLD(hart: usize) -> usize {
    PLIC_CONTEXT_BASE + S_CONTEXT(hart) * PLIC_CONTEXT_STRIDE
}

#[inline]
#[allow(non_snake_case)]
fn PLIC_SCLAIM(hart: usize) -> usize {
    // claim/complete shares the threshold register's word, offset by 4.
    PLIC_STHRESHOLD(hart) + 0x4
}

pub const VIRTIO0_IRQ: u32 = 1;

pub struct Plic {}

impl Plic {
    pub fn new() -> Self {
        Plic {}
    }

    /// Claim the next pending S-mode interrupt, if any. Returns `None` when
    /// the claim register reads back 0 (no interrupt pending).
    pub fn next(&self) -> Option<u32> {
        let claim_reg = PLIC_SCLAIM(hart_id()) as *const u32;
        let int_id = unsafe { claim_reg.read_volatile() };
        if int_id == 0 {
            None
        } else {
            Some(int_id)
        }
    }

    /// Complete handling of the interrupt claimed via `next`.
    pub fn complete(&self, id: u32) {
        let complete_reg = PLIC_SCLAIM(hart_id()) as *mut u32;
        unsafe { complete_reg.write_volatile(id) };
    }

    /// Set the priority of the given interrupt id. Must be in `0..=7`.
    pub fn set_priority(&self, id: u32, prio: u8) {
        let prio_reg = crate::mm::layout::PLIC_PRIORITY as *mut u32;
        let int_prio_slot = unsafe { prio_reg.add(id as usize) };
        let actual_prio = prio as u32 & 7;
        unsafe { int_prio_slot.write_volatile(actual_prio) }
    }

    /// Set this HART's S-mode threshold. PLIC masks interrupts whose
    /// priority is <= threshold; 0 allows everything, 7 masks everything.
    pub fn set_threshold(&self, tsh: u8) {
        let actual_tsh = tsh as u32 & 7;
        let tsh_reg = PLIC_STHRESHOLD(hart_id()) as *mut u32;
        unsafe { tsh_reg.write_volatile(actual_tsh) }
    }

    pub fn enable(&self, id: u32) {
        let enables = PLIC_SENABLE(hart_id()) as *mut u32;
        let word = id / 32;
        let bit = 1u32 << (id % 32);
        let reg = unsafe { enables.add(word as usize) };
        unsafe {
            reg.write_volatile(reg.read_volatile() | bit);
        }
    }

    pub fn is_pending(&self, id: u32) -> bool {
        let pending = PLIC_PENDING as *const u32;
        let word = (id / 32) as usize;
        let bit = 1u32 << (id % 32);
        let pending_bits = unsafe { pending.add(word).read_volatile() };
        pending_bits & bit != 0
    }

    /// Give an interrupt source non-zero priority so the PLIC forwards it at
    /// all (priority 0 means "never interrupt").
    pub unsafe fn init(&self, id: u32) {
        self.set_priority(id, 1);
    }
}

// Driver instance. `SyncUnsafeCell` because every HART touches only its own
// per-context registers and the struct itself carries no per-hart state.
lazy_static::lazy_static! {
    pub static ref PLIC: SyncUnsafeCell<Plic> = SyncUnsafeCell::new(Plic::new());
}

/// Global, once-only init: gives the sources we care about non-zero
/// priority. UART is no longer one of them -- it's handled entirely inside
/// the firmware's own M-mode PLIC context now, see `sbi::uart`.
pub fn init() {
    unsafe {
        let plic = &mut *PLIC.get();
        plic.init(VIRTIO0_IRQ);
    }
}

/// Per-HART init: each HART must enable the IRQs it wants to receive and
/// set its own threshold.
pub fn hart_init() {
    unsafe {
        let plic = &mut *PLIC.get();
        plic.enable(VIRTIO0_IRQ);
        plic.set_threshold(0);
    }
}

/// Dispatched from `usertrap`/`kerneltrap` on a `SupervisorExternal`
/// interrupt. Claims the pending S-mode interrupt and routes it to the
/// owning driver; a source with no handler just gets logged and completed
/// so it doesn't wedge the PLIC.
pub fn handle_irq() {
    let plic = unsafe { &*PLIC.get() };
    let Some(id) = plic.next() else {
        return;
    };
    match id {
        VIRTIO0_IRQ => crate::virtio::dispatch_irq(),
        other => crate::info!("plic::handle_irq: unhandled irq {}", other),
    }
    plic.complete(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s_context_interleaves_with_m_context() {
        assert_eq!(S_CONTEXT(0), 1);
        assert_eq!(S_CONTEXT(1), 3);
        assert_eq!(S_CONTEXT(3), 7);
    }
}
