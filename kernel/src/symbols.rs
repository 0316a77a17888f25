// asm entry points, defined in `src/trampoline.rs`/`src/kernelvec.rs`
extern "C" {
    pub fn __uservec();
    pub fn __userret();
    pub fn __kernelvec();
}

/// Maximum supported number of HARTs. Fixed compile-time cap per the
/// concurrency model: a small number of parallel HARTs, not large-scale SMP.
/// Bounded by the kernel boot stack allocation in `linker.ld`/`boot.S`.
pub const N_CPUS: usize = 4;

/// Maximum number of live processes. Bounds the pid allocator (pids are a
/// 16-bit space but we never need anywhere near that many live at once).
pub const N_PROCS: usize = 256;

/// Scheduler timer interrupt interval, in CLINT mtime ticks.
pub const SCHEDULER_INTERVAL: usize = 1_000_000;

/// Default process quantum, in scheduler ticks, before the virtual-runtime
/// key is recomputed and the process may be preempted.
pub const DEFAULT_QUANTUM: usize = 1;
