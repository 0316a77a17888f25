use riscv::register::stval;

use crate::{
    cpu, info,
    mm::{memory::VirtAddr, page_table::PageFlags},
    process::process::ProcStatus,
    sched,
};

/// Mark the current process a zombie and fall through to the scheduler
/// instead of panicking the kernel. Only reachable from `usertrap`, so the
/// faulting privilege level is always U-mode; a fault while the kernel
/// itself is running still reaches `kerneltrap`'s unconditional panic.
fn kill_current_process(reason: &str) -> ! {
    let pcb = cpu::current_process().expect("kill_current_process: no current process");
    info!("killing PID {:?}: {}", pcb.get_pid(), reason);
    pcb.inner.write().status = ProcStatus::ZOMBIE;
    sched::schedule();
    unreachable!("kill_current_process: schedule() switched away and never returned here");
}

pub struct InstructionPageFaultHandler {}

impl InstructionPageFaultHandler {
    pub fn handle() {
        let va = stval::read();
        info!("Instruction Page Fault: accessing {:?}", va as *const usize);
        let pcb = cpu::current_process().unwrap();
        let inner = pcb.inner.read();
        let user_space = inner.get_user_space_ref_or_else_panic();
        match user_space.translate(VirtAddr::new(va)) {
            Some((pa, flags)) => {
                info!(
                    "va: {:?} -> pa: {:?}, flags: {:?}",
                    va as *const usize,
                    pa.as_usize() as *const usize,
                    flags
                );
                if !flags.contains(PageFlags::EXECUTABLE) {
                    drop(inner);
                    kill_current_process("fetch from a non-executable page");
                }
                if !flags.contains(PageFlags::USER) {
                    drop(inner);
                    kill_current_process("fetch from a page missing the U-bit");
                }
            }
            None => {
                drop(inner);
                kill_current_process("fetch from an unmapped address");
            }
        }
    }
}

pub struct LoadPageFaultHandler {}

impl LoadPageFaultHandler {
    pub fn handle() {
        let va = stval::read();
        info!("Load Page Fault: accessing {:?}", va as *const usize);
        kill_current_process("load from an unmapped or inaccessible address");
    }
}

pub struct StorePageFaultHandler {}

impl StorePageFaultHandler {
    pub fn handle() {
        let va = stval::read();
        info!("Store Page Fault: accessing {:?}", va as *const usize);
        kill_current_process("store to an unmapped or inaccessible address");
    }
}

pub struct IllegalInstructionHandler {}

impl IllegalInstructionHandler {
    pub fn handle() {
        let instr = stval::read();
        info!("Illegal Instruction: {:#x}", instr);
        kill_current_process("illegal instruction");
    }
}
