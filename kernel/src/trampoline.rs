//! User entry/exit trampoline. Grounded in the teacher's own
//! `trap::usertrapret`/`userret_on_trampoline`, which already assume a
//! `__uservec`/`__userret` pair living on a page mapped at the same virtual
//! address (`TRAMPOLINE_BASE_VA`) in every address space -- this module is
//! what was missing to actually back those `extern "C"` declarations with
//! code. Bit-exact field offsets come from `process::context::TrapFrame`.
//!
//! `__uservec` doesn't need a separate mechanism to get back to Rust: since
//! the trampoline is linked into the same binary as the rest of the kernel
//! (not a separately-built shared page, unlike some designs that store a
//! handler address in the frame for that reason), it can just `call
//! usertrap` once `satp` has been switched to the kernel's page table --
//! the call target is resolved by the linker, and both the call site and
//! destination stay valid across the `satp` switch because the trampoline
//! page is identity-mapped into both address spaces.
use crate::mm::layout::TRAPFRAME_BASE_USER_VA;

core::arch::global_asm!(
    r#"
.section .trampoline,"ax",@progbits
.align 4
.global __trampoline_start
__trampoline_start:

.global __uservec
__uservec:
    # sscratch holds the trapframe's user-space VA while user code runs.
    # swap it into a0, stashing the user's real a0 in sscratch.
    csrrw a0, sscratch, a0

    sd ra,   1*8(a0)
    sd sp,   2*8(a0)
    sd gp,   3*8(a0)
    sd tp,   4*8(a0)
    sd t0,   5*8(a0)
    sd t1,   6*8(a0)
    sd t2,   7*8(a0)
    sd s0,   8*8(a0)
    sd s1,   9*8(a0)
    sd a1,  11*8(a0)
    sd a2,  12*8(a0)
    sd a3,  13*8(a0)
    sd a4,  14*8(a0)
    sd a5,  15*8(a0)
    sd a6,  16*8(a0)
    sd a7,  17*8(a0)
    sd s2,  18*8(a0)
    sd s3,  19*8(a0)
    sd s4,  20*8(a0)
    sd s5,  21*8(a0)
    sd s6,  22*8(a0)
    sd s7,  23*8(a0)
    sd s8,  24*8(a0)
    sd s9,  25*8(a0)
    sd s10, 26*8(a0)
    sd s11, 27*8(a0)
    sd t3,  28*8(a0)
    sd t4,  29*8(a0)
    sd t5,  30*8(a0)
    sd t6,  31*8(a0)

    csrr t0, sscratch
    sd t0, 10*8(a0)

    fsd f0,  256+0*8(a0)
    fsd f1,  256+1*8(a0)
    fsd f2,  256+2*8(a0)
    fsd f3,  256+3*8(a0)
    fsd f4,  256+4*8(a0)
    fsd f5,  256+5*8(a0)
    fsd f6,  256+6*8(a0)
    fsd f7,  256+7*8(a0)
    fsd f8,  256+8*8(a0)
    fsd f9,  256+9*8(a0)
    fsd f10, 256+10*8(a0)
    fsd f11, 256+11*8(a0)
    fsd f12, 256+12*8(a0)
    fsd f13, 256+13*8(a0)
    fsd f14, 256+14*8(a0)
    fsd f15, 256+15*8(a0)
    fsd f16, 256+16*8(a0)
    fsd f17, 256+17*8(a0)
    fsd f18, 256+18*8(a0)
    fsd f19, 256+19*8(a0)
    fsd f20, 256+20*8(a0)
    fsd f21, 256+21*8(a0)
    fsd f22, 256+22*8(a0)
    fsd f23, 256+23*8(a0)
    fsd f24, 256+24*8(a0)
    fsd f25, 256+25*8(a0)
    fsd f26, 256+26*8(a0)
    fsd f27, 256+27*8(a0)
    fsd f28, 256+28*8(a0)
    fsd f29, 256+29*8(a0)
    fsd f30, 256+30*8(a0)
    fsd f31, 256+31*8(a0)

    csrr t0, sepc
    sd t0, 512(a0)
    csrr t0, sstatus
    sd t0, 520(a0)
    csrr t0, sie
    sd t0, 528(a0)
    csrr t0, satp
    sd t0, 536(a0)
    csrr t0, stvec
    sd t0, 552(a0)

    ld t1, 560(a0)      # trap_satp
    ld sp, 568(a0)      # trap_stack
    csrw satp, t1
    sfence.vma zero, zero

    call usertrap
    # usertrap always falls through to usertrapret, which never returns.
1:
    wfi
    j 1b

.global __userret
__userret:
    # a0: user page table satp value, passed by userret_on_trampoline
    csrw satp, a0
    sfence.vma zero, zero

    li a0, {trapframe_va}

    ld ra,   1*8(a0)
    ld sp,   2*8(a0)
    ld gp,   3*8(a0)
    ld tp,   4*8(a0)
    ld t0,   5*8(a0)
    ld t1,   6*8(a0)
    ld t2,   7*8(a0)
    ld s0,   8*8(a0)
    ld s1,   9*8(a0)
    ld a1,  11*8(a0)
    ld a2,  12*8(a0)
    ld a3,  13*8(a0)
    ld a4,  14*8(a0)
    ld a5,  15*8(a0)
    ld a6,  16*8(a0)
    ld a7,  17*8(a0)
    ld s2,  18*8(a0)
    ld s3,  19*8(a0)
    ld s4,  20*8(a0)
    ld s5,  21*8(a0)
    ld s6,  22*8(a0)
    ld s7,  23*8(a0)
    ld s8,  24*8(a0)
    ld s9,  25*8(a0)
    ld s10, 26*8(a0)
    ld s11, 27*8(a0)
    ld t3,  28*8(a0)
    ld t4,  29*8(a0)
    ld t5,  30*8(a0)
    ld t6,  31*8(a0)

    fld f0,  256+0*8(a0)
    fld f1,  256+1*8(a0)
    fld f2,  256+2*8(a0)
    fld f3,  256+3*8(a0)
    fld f4,  256+4*8(a0)
    fld f5,  256+5*8(a0)
    fld f6,  256+6*8(a0)
    fld f7,  256+7*8(a0)
    fld f8,  256+8*8(a0)
    fld f9,  256+9*8(a0)
    fld f10, 256+10*8(a0)
    fld f11, 256+11*8(a0)
    fld f12, 256+12*8(a0)
    fld f13, 256+13*8(a0)
    fld f14, 256+14*8(a0)
    fld f15, 256+15*8(a0)
    fld f16, 256+16*8(a0)
    fld f17, 256+17*8(a0)
    fld f18, 256+18*8(a0)
    fld f19, 256+19*8(a0)
    fld f20, 256+20*8(a0)
    fld f21, 256+21*8(a0)
    fld f22, 256+22*8(a0)
    fld f23, 256+23*8(a0)
    fld f24, 256+24*8(a0)
    fld f25, 256+25*8(a0)
    fld f26, 256+26*8(a0)
    fld f27, 256+27*8(a0)
    fld f28, 256+28*8(a0)
    fld f29, 256+29*8(a0)
    fld f30, 256+30*8(a0)
    fld f31, 256+31*8(a0)

    ld t0, 512(a0)
    csrw sepc, t0

    # sscratch must hold the trapframe VA again for the next uservec entry
    csrw sscratch, a0

    ld a0, 10*8(a0)

    sret

.align 12
.global __trampoline_end
__trampoline_end:
"#,
    trapframe_va = const TRAPFRAME_BASE_USER_VA,
);
