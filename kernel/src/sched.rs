//! CFS-like scheduler: a run queue ordered by `vruntime * priority`, lowest
//! key runs next. Grounded in the distillation's §4.9 scheduler description;
//! the teacher's own `process::manager::ProcessManager` only has a FIFO
//! `VecDeque` ready queue, so the ordering structure here is new, built on
//! [`crate::collections::RbTree`] the way the teacher builds
//! `process::manager`/`mm::address_space` on top of its own primitives:
//! the tree itself carries no lock, the call site (this module's
//! `lazy_static!`) wraps it in `spin::Mutex`, matching every other shared
//! structure in the kernel.
//!
//! Named correction applied here, not reproduced: the distilled scheduler's
//! min-key pop loop walks a candidate pointer that starts uninitialized and
//! can be read before any real node is observed. `RbTree::pop_min` is
//! `Option`-based throughout, so there is no uninitialized candidate to read
//! in the first place.

use alloc::sync::Arc;
use spin::Mutex;

use crate::{
    collections::RbTree,
    cpu,
    process::{manager::PROCESS_MANAGER, process::ProcStatus},
    symbols::DEFAULT_QUANTUM,
    trap::usertrapret,
};

lazy_static::lazy_static! {
    static ref RUN_QUEUE: Mutex<RbTree<(u64, usize), Arc<crate::process::process::ProcessControlBlock>>> =
        Mutex::new(RbTree::new());
}

/// Make `pcb` runnable again at its current `vruntime`.
pub fn enqueue(pcb: Arc<crate::process::process::ProcessControlBlock>) {
    let (key, pid) = {
        let inner = pcb.inner.read();
        let key = inner.vruntime.saturating_mul(inner.priority.max(1));
        (key, pcb.get_pid())
    };
    RUN_QUEUE.lock().insert((key, pid), pcb);
}

/// Pick the lowest-key runnable process and resume it. Never returns: the
/// kernel only re-enters a process via `usertrapret`'s `sret`, it never
/// switches back to the caller of `schedule()` directly (matching the
/// teacher's own `start::kmain` -> `usertrapret` tail call at boot).
pub fn schedule() -> ! {
    let hartid = crate::arch::hart_id();

    // put the process we were just running back in the queue, ticked
    if let Some(prev) = cpu::CPUS[hartid].write().take_executing_process() {
        let requeue = {
            let mut inner = prev.inner.write();
            if inner.status == ProcStatus::ZOMBIE {
                false
            } else {
                inner.vruntime += DEFAULT_QUANTUM as u64;
                inner.status = ProcStatus::RUNNABLE;
                true
            }
        };
        if requeue {
            enqueue(prev.clone());
        } else {
            PROCESS_MANAGER.lock().reap_process(prev.get_pid());
        }
    }

    loop {
        if let Some((_, next)) = RUN_QUEUE.lock().pop_min() {
            next.inner.write().status = ProcStatus::RUNNING;
            cpu::CPUS[hartid].write().set_executing_process(next);
            usertrapret();
        }
        // no runnable process: wait for the next timer/external interrupt
        // rather than spin hot.
        unsafe { core::arch::asm!("wfi") };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_vruntime_product_runs_first() {
        let mut q: RbTree<(u64, usize), usize> = RbTree::new();
        q.insert((30, 1), 1);
        q.insert((10, 2), 2);
        q.insert((20, 3), 3);
        assert_eq!(q.pop_min(), Some(((10, 2), 2)));
        assert_eq!(q.pop_min(), Some(((20, 3), 3)));
        assert_eq!(q.pop_min(), Some(((30, 1), 1)));
    }
}
