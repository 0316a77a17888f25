//! Control-and-status-register bit layouts. Grounded in
//! `original_source/sbi/src/include/csr.h`; `riscv::register` covers the
//! CSRs it knows about (mstatus, mepc, satp, ...), these bitflags cover the
//! ones the firmware pokes directly by raw `csrw`/`csrr`.

use bitflags::bitflags;

bitflags! {
    /// Bits of `mstatus`/`sstatus` this firmware sets directly, rather than
    /// through `riscv::register::mstatus`'s typed setters, because it needs
    /// to compose several fields into one raw write (mirrors the C source's
    /// single `CSR_WRITE("mstatus", ...)` call sites).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Status: usize {
        const MPP_USER       = 0b00 << 11;
        const MPP_SUPERVISOR = 0b01 << 11;
        const MPP_MACHINE    = 0b11 << 11;
        const MPIE           = 1 << 7;
        const SPIE           = 1 << 5;
        const FS_INITIAL     = 0b01 << 13;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Interrupts: usize {
        const SSIE = 1 << 1;
        const MSIE = 1 << 3;
        const STIE = 1 << 5;
        const MTIE = 1 << 7;
        const SEIE = 1 << 9;
        const MEIE = 1 << 11;
    }
}

/// `CAUSE_SSIP`/`CAUSE_MSIP`/... interrupt cause numbers (low bits of
/// `mcause` when the top bit is set).
pub mod cause {
    pub const SSIP: usize = 1;
    pub const MSIP: usize = 3;
    pub const STIP: usize = 5;
    pub const MTIP: usize = 7;
    pub const SEIP: usize = 9;
    pub const MEIP: usize = 11;

    pub const ECALL_U_MODE: usize = 8;
    pub const ECALL_S_MODE: usize = 9;
    pub const ECALL_M_MODE: usize = 11;
}

/// Delegate every exception below 0x8000 that has a standard meaning in
/// S-mode; matches `MEDELEG_ALL` in the source this is grounded on.
pub const MEDELEG_ALL: usize = 0xB1F7;

pub const XREG_A0: usize = 10;
pub const XREG_A7: usize = 17;
pub const XREG_NUM: usize = 32;

#[inline]
pub fn mcause_is_async(mcause: usize) -> bool {
    (mcause as isize) < 0
}

#[inline]
pub fn mcause_num(mcause: usize) -> usize {
    mcause & 0xff
}

macro_rules! csr_rw {
    ($read:ident, $write:ident, $csr:literal) => {
        #[inline]
        pub unsafe fn $read() -> usize {
            let value: usize;
            core::arch::asm!(concat!("csrr {0}, ", $csr), out(reg) value);
            value
        }

        #[inline]
        pub unsafe fn $write(value: usize) {
            core::arch::asm!(concat!("csrw ", $csr, ", {0}"), in(reg) value);
        }
    };
}

csr_rw!(read_mscratch, write_mscratch, "mscratch");
csr_rw!(read_mcause, write_mcause, "mcause");
csr_rw!(read_mepc, write_mepc, "mepc");
csr_rw!(read_mstatus, write_mstatus, "mstatus");
csr_rw!(read_mie, write_mie, "mie");
csr_rw!(read_mip, write_mip, "mip");
csr_rw!(read_mideleg, write_mideleg, "mideleg");
csr_rw!(read_medeleg, write_medeleg, "medeleg");
csr_rw!(read_mtvec, write_mtvec, "mtvec");
csr_rw!(read_pmpaddr0, write_pmpaddr0, "pmpaddr0");
csr_rw!(read_pmpcfg0, write_pmpcfg0, "pmpcfg0");
csr_rw!(read_sscratch, write_sscratch, "sscratch");
csr_rw!(read_satp, write_satp, "satp");

#[inline]
pub unsafe fn mret() -> ! {
    core::arch::asm!("mret", options(noreturn));
}

#[inline]
pub unsafe fn wfi() {
    core::arch::asm!("wfi");
}
