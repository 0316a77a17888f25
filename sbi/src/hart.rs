//! Hardware-thread (HART) lifecycle. Grounded in
//! `original_source/sbi/src/hart.c`/`hart.h`: a per-hart status/target-address
//! table the `HART_START`/`HART_STOP`/`HART_STATUS` SBI calls operate on, and
//! the MSIP-driven handoff that actually moves a parked hart to its target.

use spin::Mutex;

use crate::clint;
use crate::config::MAX_ALLOWABLE_HARTS;
use crate::csr::{self, Interrupts, Status, MEDELEG_ALL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HartStatus {
    /// A hart beyond `MAX_ALLOWABLE_HARTS`, or an id past what the platform reports.
    Invalid,
    /// Parked, ready to be awoken by `HART_START`.
    Stopped,
    /// MSIP sent, not yet observed by the target hart.
    Starting,
    /// Running S-mode (or whatever `target_address` pointed at) instructions.
    Started,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HartData {
    status: Option<HartStatusRepr>,
    pub target_address: usize,
    pub scratch: usize,
    pub satp: usize,
}

/// `Option<HartStatusRepr>` rather than `HartStatus` directly so `Default`
/// can derive; `None` reads as `Stopped` (the boot-time default before a
/// hart is ever touched).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HartStatusRepr {
    Stopped,
    Starting,
    Started,
}

impl HartData {
    fn status(&self) -> HartStatus {
        match self.status {
            None | Some(HartStatusRepr::Stopped) => HartStatus::Stopped,
            Some(HartStatusRepr::Starting) => HartStatus::Starting,
            Some(HartStatusRepr::Started) => HartStatus::Started,
        }
    }
}

lazy_static::lazy_static! {
    static ref HARTS: [Mutex<HartData>; MAX_ALLOWABLE_HARTS] =
        core::array::from_fn(|_| Mutex::new(HartData::default()));
}

/// Bootstrap-only: set a hart's table entry straight to `Stopped` without
/// going through the normal start/stop transition checks. Used once per
/// hart during firmware init, before any hart could be contending on it.
pub fn init_stopped(hart: usize) {
    if hart >= MAX_ALLOWABLE_HARTS {
        return;
    }
    let mut data = HARTS[hart].lock();
    *data = HartData { status: Some(HartStatusRepr::Stopped), target_address: 0, scratch: 0, satp: 0 };
}

/// Bootstrap-only counterpart for hart 0, which boots straight into
/// `Started` rather than going through `start()`.
pub fn init_started(hart: usize, target_address: usize) {
    if hart >= MAX_ALLOWABLE_HARTS {
        return;
    }
    let mut data = HARTS[hart].lock();
    *data = HartData { status: Some(HartStatusRepr::Started), target_address, scratch: 0, satp: 0 };
}

pub fn get_status(hart: usize) -> HartStatus {
    if hart >= MAX_ALLOWABLE_HARTS {
        return HartStatus::Invalid;
    }
    HARTS[hart].lock().status()
}

/// Record the target and send an MSIP. Fails if `hart` is out of range or
/// not currently stopped.
pub fn start(hart: usize, target: usize, scratch: usize, satp: usize) -> bool {
    if hart >= MAX_ALLOWABLE_HARTS {
        return false;
    }
    let mut data = HARTS[hart].lock();
    if data.status() != HartStatus::Stopped {
        return false;
    }
    data.status = Some(HartStatusRepr::Starting);
    data.target_address = target;
    data.scratch = scratch;
    data.satp = satp;
    drop(data);
    clint::set_msip(hart);
    true
}

/// Only a hart can stop itself (once stopped it no longer hears MSIPs).
/// Never returns on success; resets the privileged state and parks at
/// `park()` in M-mode with only MSIE live.
pub fn stop(hart: usize, park_addr: usize) -> bool {
    if hart >= MAX_ALLOWABLE_HARTS {
        return false;
    }
    let mut data = HARTS[hart].lock();
    if data.status() != HartStatus::Started {
        return false;
    }
    data.status = Some(HartStatusRepr::Stopped);
    drop(data);

    unsafe {
        csr::write_mepc(park_addr);
        csr::write_mstatus((Status::MPP_MACHINE | Status::MPIE).bits());
        let mie = if hart == 0 { Interrupts::MSIE | Interrupts::MEIE } else { Interrupts::MSIE };
        csr::write_mie(mie.bits());
        csr::write_sscratch(0);
        csr::write_mtvec(0);
        csr::write_mepc(park_addr);
        clint::set_mtimecmp(hart, clint::MTIMECMP_INFINITE);
        csr::write_mip(0);
        csr::mret();
    }
}

/// Called from the trap handler on a machine-software-interrupt trap. If
/// the hart was `Starting`, commits the handoff: loads the saved target
/// address/scratch/satp into the relevant CSRs and flips to `Started`.
pub fn handle_msip(hart: usize) {
    if hart >= MAX_ALLOWABLE_HARTS {
        return;
    }
    let mut data = HARTS[hart].lock();
    clint::clear_msip(hart);

    if data.status == Some(HartStatusRepr::Starting) {
        unsafe {
            csr::write_mepc(data.target_address);
            csr::write_mstatus((Status::MPP_SUPERVISOR | Status::MPIE | Status::FS_INITIAL).bits());
            let mie = Interrupts::MEIE | Interrupts::SSIE | Interrupts::STIE | Interrupts::MTIE;
            csr::write_mie(mie.bits());
            // mideleg/medeleg are indexed by interrupt/exception cause number
            let mideleg = (1usize << crate::csr::cause::SEIP)
                | (1usize << crate::csr::cause::SSIP)
                | (1usize << crate::csr::cause::STIP);
            csr::write_mideleg(mideleg);
            csr::write_medeleg(MEDELEG_ALL);
            csr::write_sscratch(data.scratch);
            csr::write_satp(data.satp);
        }
        data.status = Some(HartStatusRepr::Started);
    }
    drop(data);
    unsafe { csr::mret() };
}
