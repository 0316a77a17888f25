//! Supervisor-call dispatch. Grounded in
//! `original_source/sbi/src/svcall.c`/`include/sbicalls.h`: the call number
//! arrives in `a7`, arguments in `a0..a6`, and the return value goes back
//! out through `a0`.

use primitive_enum::primitive_enum;

use crate::csr::{self, XREG_A0, XREG_A7};
use crate::{clint, hart, rtc, uart};

primitive_enum! {
SvCall usize;
    HartStatus = 1,
    HartStart = 2,
    HartStop = 3,
    GetTime = 4,
    SetTimecmp = 5,
    AddTimecmp = 6,
    AckTimer = 7,
    RtcGetTime = 8,
    Putchar = 9,
    Getchar = 10,
    Whoami = 11,
    Poweroff = 12,
}

/// `trapframe` points at the 32-register save area `mscratch` held for this
/// hart (see [`crate::trap`]); indices follow the standard `XREG_*` layout.
pub fn handle(hart_id: usize, trapframe: *mut usize) {
    let call = unsafe { *trapframe.add(XREG_A7) };
    let a0 = unsafe { *trapframe.add(XREG_A0) };
    let a1 = unsafe { *trapframe.add(XREG_A0 + 1) };
    let a2 = unsafe { *trapframe.add(XREG_A0 + 2) };
    let a3 = unsafe { *trapframe.add(XREG_A0 + 3) };

    let ret: usize = match SvCall::from_usize(call) {
        Some(SvCall::HartStatus) => hart::get_status(a0) as usize,
        Some(SvCall::HartStart) => hart::start(a0, a1, a2, a3) as usize,
        Some(SvCall::HartStop) => hart::stop(hart_id, park_address()) as usize,
        Some(SvCall::GetTime) => clint::get_time() as usize,
        Some(SvCall::SetTimecmp) => {
            clint::set_mtimecmp(a0, a1 as u64);
            0
        }
        Some(SvCall::AddTimecmp) => {
            clint::add_mtimecmp(a0, a1 as u64);
            0
        }
        Some(SvCall::AckTimer) => {
            unsafe {
                let mip = csr::read_mip();
                csr::write_mip(mip & !(1 << crate::csr::cause::STIP));
            }
            0
        }
        Some(SvCall::RtcGetTime) => rtc::get_time() as usize,
        Some(SvCall::Putchar) => {
            uart::put(a0 as u8);
            0
        }
        Some(SvCall::Getchar) => uart::ring_pop() as usize,
        Some(SvCall::Whoami) => hart_id,
        Some(SvCall::Poweroff) => {
            // QEMU's `virt` test device: writing the magic shutdown code
            // exits the VM outright, so this never returns.
            unsafe { (0x0010_0000 as *mut u16).write_volatile(0x5555) };
            loop {
                unsafe { csr::wfi() };
            }
        }
        None => {
            // unrecognized call number: return it negated so userspace can
            // at least tell something went wrong, and keep running
            usize::MAX
        }
    };

    unsafe { *trapframe.add(XREG_A0) = ret };
}

/// Resolved by the boot assembly; see `crate::trap` for where `park` lives.
fn park_address() -> usize {
    crate::trap::park as usize
}
