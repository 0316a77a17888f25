// we extract offsets from the linker
macro_rules! linker_symbols(
    ($($name:ident),*) => {
        $(
        #[inline]
        pub fn $name() -> usize {
            extern "C" {
                // TODO: UnsafeCell?
                static $name: u8;
            }
            unsafe { &$name as *const u8 as usize }
        }
        )*
    }
);

// pay close attention to the `heap` in the physical memory and the kernel heap:
// KERNEL_HEAP is a contiguous region in the .bss section of the kernel image that stores the kernel data sturctures
// HEAP refered here is the region (__kernel_end, PHYS_TOP]
linker_symbols!(
    __heap_size,
    __heap_end,
    __heap_start,
    __kernel_heap_end,
    __kernel_heap_start,
    __kernel_stack_end,
    __kernel_stack_start,
    __kernel_binary_end,
    __bss_end,
    __bss_start,
    __data_end,
    __data_start,
    __rodata_end,
    __rodata_start,
    __text_end,
    __trampoline_end,
    __trampoline_start,
    __text_start,
    __kernel_binary_start
);

// one beyond the highest possible virtual address.
// MAXVA is actually one bit less than the max allowed by
// Sv39, to avoid having to sign-extend virtual addresses
// that have the high bit set.
pub const MAX_VA: usize = 1 << (9 + 9 + 9 + 12 - 1);
pub const TRAMPOLINE_BASE_VA: usize = MAX_VA - PAGE_SIZE;
// One page below the trampoline: every process's trap frame lives at this
// fixed user-space virtual address so the trampoline asm can find it via
// `sscratch` without needing to know anything else about the process.
pub const TRAPFRAME_BASE_USER_VA: usize = TRAMPOLINE_BASE_VA - PAGE_SIZE;
pub const TRAPFRAME_SIZE: usize = PAGE_SIZE;
// Where a freshly-loaded process's `.text` begins in its own address space.
pub const TEXT_BASE_USER_VA: usize = 0x1000;

// 4KB per page
pub const PAGE_ORDER: usize = 12;
// pub const PAGE_SIZE: usize = 1 << PAGE_ORDER;   // 4KB
pub const PAGE_SIZE: usize = 4096; // 4KB

// defined in `kernel.ld`
pub const KERNEL_BASE: usize = 0x8000_0000;
pub const PHYS_TOP: usize = KERNEL_BASE + 128 * 1024 * 1024; // 128 MB

// heap for kernel data structures
// It is allocated statically and are placed in
// .bss sections (it is an uninitialised array)
pub const KERNEL_HEAP_SIZE: usize = 1 * 1024 * 1024; // 1MB

// proc's kernel stack
// each process has its own kernel stack
// They are allocated by the `FRAME_ALLOCATOR`
// Their RAII managing instance are allocated in the KERNEL_HEAP by the `KERNEL_HEAP_ALLOCATOR`
pub const KERNEL_STACK_SIZE: usize = PAGE_SIZE * 2;

// proc's user stack
// each process has its own user stack
// They are allocated by the `FRAME_ALLOCATOR`
pub const USER_STACK_SIZE: usize = PAGE_SIZE * 2;

// memory mapped registers
// qemu puts UART registers here in physical memory.
pub const UART_BASE: usize = 0x1000_0000;
pub const UART0: usize = UART_BASE;
pub const UART_SIZE: usize = PAGE_SIZE;

// core local interruptor (CLINT), which contains the timer.
pub const CLINT_BASE: usize = 0x200_0000;
pub const CLINT_MTIMECMP_BASE: usize = CLINT_BASE + 0x4000; // mechine-level time compare
pub const CLINT_MTIME_BASE: usize = CLINT_BASE + 0xbff8;
pub const CLINT_SIZE: usize = 0x1_0000;

// qemu puts platform-level interrupt controller (PLIC) here.
//
// Register layout per-IRQ/per-hart-context (M-mode and S-mode contexts are
// interleaved in the per-hart banks, context `2*hart` is M-mode, `2*hart+1`
// is S-mode):
//   priority array:        PLIC_BASE + 0x000000, one word per IRQ
//   pending bitmap:        PLIC_BASE + 0x001000
//   per-context enable:    PLIC_BASE + 0x002000, stride 0x80 per context
//   per-context threshold: PLIC_BASE + 0x200000, stride 0x1000 per context
//   per-context claim/complete: same word as threshold + 0x4
pub const PLIC_BASE: usize = 0x0c00_0000;
pub const PLIC_PRIORITY: usize = PLIC_BASE;
pub const PLIC_PENDING: usize = PLIC_BASE + 0x1000;
pub const PLIC_ENABLE_BASE: usize = PLIC_BASE + 0x2000;
pub const PLIC_ENABLE_STRIDE: usize = 0x80;
pub const PLIC_CONTEXT_BASE: usize = PLIC_BASE + 0x20_0000;
pub const PLIC_CONTEXT_STRIDE: usize = 0x1000;
pub const PLIC_SIZE: usize = 0x40_0000;

// PCIe ECAM (enhanced configuration access mechanism): each function gets
// a dedicated 4 KiB configuration-space page, indexed by
// `(bus << 20) | (device << 15) | (function << 12)`.
pub const PCIE_ECAM_BASE: usize = 0x3000_0000;
pub const PCIE_ECAM_SIZE: usize = 0x1000_0000; // 256 MiB: 256 busses
pub const PCIE_ECAM_MAPPED_SIZE: usize = 2 * 1024 * 1024; // mandatory mapping is 2 MiB

// PCI device MMIO (BAR) window, assigned bottom-up by the enumerator
// starting at this bump-pointer base.
pub const PCI_MMIO_BASE: usize = 0x4000_0000;
pub const PCI_MMIO_SIZE: usize = 2 * 1024 * 1024; // mandatory mapping is 2 MiB
