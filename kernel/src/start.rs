//! Supervisor-mode entry point. Grounded in `sbi::main`'s handoff contract
//! (see `original_source/sbi/src/main.c`): the firmware lands every hart
//! here already in S-mode, `medeleg`/`mideleg` already set and paging still
//! off, with `sscratch` holding that hart's id rather than `tp` -- `tp`
//! isn't live until we move it over ourselves. The machine-mode
//! `kstart`/`mret` dance this replaces belonged to the single-binary design
//! where the kernel itself owned M-mode; the `sbi` crate does all of that
//! now, before we're ever called.

use alloc::sync::Arc;

use crate::allocator::heap_allocator;
use crate::arch::{hart_id, intr_off, intr_on};
use crate::fs::{minix3::Minix3Fs, vfs::VFS};
use crate::mm::KERNEL_ADDRESS_SPACE;
use crate::trap::usertrapret;
use crate::uart;
use crate::virtio::{self, blk::BlkDevice, pci};
use crate::{clint, info, mm, plic, process, trap};
use core::arch::asm;
use riscv::register::sscratch;

/// Probe the PCI bus for the first virtio-blk function, bind it, register
/// it with the PLIC IRQ dispatcher and mount its Minix3 filesystem at `/`.
/// A board with no block device just boots without a root filesystem --
/// there's nothing in the distillation that requires one at boot.
fn init_storage() {
    let Some(dev) = pci::enumerate().into_iter().next() else {
        info!("init_storage: no virtio-pci function found, booting without storage");
        return;
    };
    match BlkDevice::probe(&dev) {
        Ok(blk) => {
            let blk = Arc::new(blk);
            virtio::register_blk_device(blk.clone());
            match Minix3Fs::mount(blk) {
                Ok(fs) => {
                    VFS.mount(Arc::new(fs), "/");
                    info!("init_storage: mounted minix3 root filesystem");
                }
                Err(e) => info!("init_storage: minix3 mount failed: {:?}", e),
            }
        }
        Err(e) => info!("init_storage: virtio-blk probe failed: {:?}", e),
    }
}

/// Controls whether other harts may proceed past their own init. They wait
/// for hart-0 to finish setting up the kernel page table and process table
/// first.
static mut HART0_STARTED: bool = false;

/// Entry point the firmware jumps to in S-mode for every hart, per
/// `sbi::main`'s `OS_TARGET_JUMP_ADDR`/boot-magic handoff.
#[no_mangle]
unsafe extern "C" fn kmain() -> ! {
    let hart: usize = sscratch::read();
    asm!("mv tp, {}", in(reg) hart);

    if hart_id() == 0 {
        uart::init(); // init uart for printing
        info!("booting derek-core on hart {}...", hart_id());
        info!("UART initialised");

        mm::init(); // init allocators and kernel page table
        mm::hart_init(); // turn on paging

        // install kernel trap vector
        trap::init_hart();

        plic::init(); // set up interrupt controller
        plic::hart_init(); // ask for PLIC for device interrupts
        info!("PLIC initialised");

        clint::timer_init();

        init_storage();

        process::init();
        heap_allocator::print_kernel_heap_status();

        HART0_STARTED = true;
    } else {
        // wait until hart-0 finishes
        loop {
            if HART0_STARTED {
                break;
            }
        }
        info!("hart {} booting...", hart_id());

        mm::hart_init(); // turn on paging

        trap::init_hart();
        plic::hart_init();
        clint::timer_init();
    }

    // debug: we lock the kernel page table in case of corruption
    intr_off();
    KERNEL_ADDRESS_SPACE.write().lock_space();
    intr_on();

    usertrapret();
}
