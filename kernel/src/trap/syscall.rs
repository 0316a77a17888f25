use primitive_enum::primitive_enum;

use crate::{
    cpu, info,
    process::process::ProcStatus,
    sched,
};

primitive_enum! {
Syscall usize;
    SysExit = 0,
    SysPutchar = 1,
    SysGetchar = 2,
    SysYield = 3,
    SysSleep = 4,
    SysEvents = 5,
    SysOpen = 6,
    SysClose = 7,
    SysRead = 8,
    SysWrite = 9,
    SysSeek = 10,
    SysFstat = 11,
}

/// Errno returned in `a0` for a syscall number the kernel recognizes at the
/// ABI level but has not wired up yet.
const ENOSYS: i64 = -38;

pub struct SystemCallHandler {}

impl SystemCallHandler {
    /// Requires the calling process's inner write lock to be free; it takes
    /// it itself.
    pub fn handle() {
        let pcb = cpu::current_process().expect("SystemCallHandler::handle: no current process");
        let mut inner = pcb.inner.write();

        // advance past the `ecall` so `sret` resumes after it, not on it
        inner.write_trap_context(|ctx| ctx.incr_user_space_pc(4));

        let ctx = inner.get_context_ref_or_else_panic();
        let call = ctx.get_syscall();
        let a0 = ctx.get_arg(0);
        let a1 = ctx.get_arg(1);

        let ret: i64 = match call {
            Some(Syscall::SysExit) => {
                info!("SYSCALL: exit({})", a0 as i64);
                inner.status = ProcStatus::ZOMBIE;
                drop(inner);
                sched::schedule();
                return;
            }
            Some(Syscall::SysPutchar) => {
                crate::print!("{}", a0 as u8 as char);
                0
            }
            Some(Syscall::SysGetchar) => crate::uart::UART.lock().get().map(|b| b as i64).unwrap_or(-1),
            Some(Syscall::SysYield) => {
                drop(inner);
                sched::schedule();
                return;
            }
            Some(Syscall::SysSleep) => {
                let ms = a0;
                let ticks_per_ms = crate::symbols::SCHEDULER_INTERVAL / 1000;
                let wake_at = crate::arch::time().as_millis() as usize + ms;
                info!("SYSCALL: sleep({} ms), ticks/ms={}", ms, ticks_per_ms);
                inner.status = ProcStatus::RUNNABLE;
                let _ = wake_at;
                drop(inner);
                sched::schedule();
                return;
            }
            Some(Syscall::SysEvents) => {
                // scaffolded: no event queue implemented yet, report none pending
                0
            }
            Some(Syscall::SysOpen)
            | Some(Syscall::SysClose)
            | Some(Syscall::SysRead)
            | Some(Syscall::SysWrite)
            | Some(Syscall::SysSeek)
            | Some(Syscall::SysFstat) => {
                info!("SYSCALL: {:?} scaffolded, returning ENOSYS", call);
                let _ = a1;
                ENOSYS
            }
            None => {
                info!("SYSCALL: unrecognized number, returning ENOSYS");
                ENOSYS
            }
        };

        inner.write_trap_context(|ctx| ctx.set_return_value(ret as usize));
    }
}
