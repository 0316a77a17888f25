//! Crate-wide structured error type.
//!
//! The source this kernel is grounded on propagates failures as booleans or
//! sentinel values and reserves panics for genuinely fatal conditions. This
//! type is the Rust-idiomatic realization of that same split: `KernelError`
//! covers everything a caller can reasonably recover from (and is returned
//! via `Result`), while truly fatal conditions keep panicking exactly where
//! the code already does (page table invariant violations, the allocator's
//! `#[alloc_error_handler]`, an unmapped instruction fetch in kernel mode).

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Invalid ELF header, invalid superblock magic, bad SBI boot target,
    /// invalid HART id, an inode number of 0 used where a real inode is
    /// required.
    Configuration(ConfigError),
    /// Out of physical pages, out of inodes, out of zones, out of
    /// descriptor slots, a virtqueue with no free slot.
    ResourceExhausted(ResourceError),
    /// Non-zero virtio-blk status, an unrecognized virtio capability type,
    /// a PCI vendor-id mismatch during enumeration.
    Protocol(ProtocolError),
    /// MMU translation produced the `PageFault` sentinel; a mapping that
    /// must succeed failed at an intermediate level.
    Memory(MemoryError),
    /// Illegal instruction, access fault, or page fault attributed to a
    /// user-mode process (kills the process rather than the kernel).
    Process(ProcessError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    InvalidElf,
    InvalidSuperblockMagic,
    InvalidBootTarget,
    InvalidHart,
    InvalidInode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    OutOfPages,
    OutOfInodes,
    OutOfZones,
    OutOfDescriptors,
    QueueFull,
    TableFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    BlockIoError,
    BlockUnsupported,
    UnknownVirtioCapability,
    PciVendorMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    PageFault,
    MapFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    IllegalInstruction,
    AccessFault,
    PageFault,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Configuration(e) => write!(f, "configuration error: {:?}", e),
            KernelError::ResourceExhausted(e) => write!(f, "resource exhausted: {:?}", e),
            KernelError::Protocol(e) => write!(f, "protocol error: {:?}", e),
            KernelError::Memory(e) => write!(f, "memory error: {:?}", e),
            KernelError::Process(e) => write!(f, "process error: {:?}", e),
        }
    }
}

/// Syscall-boundary convention: negate the errno-style code so the kernel
/// returns `-errno` in `a0`, per the distilled spec's syscall error policy.
/// Internal code never touches this; only the trap handler's syscall
/// dispatch calls it when converting a `Result` into a raw register value.
impl KernelError {
    pub fn errno(&self) -> i64 {
        let code: i64 = match self {
            KernelError::Configuration(_) => 1,
            KernelError::ResourceExhausted(_) => 2,
            KernelError::Protocol(_) => 3,
            KernelError::Memory(_) => 4,
            KernelError::Process(_) => 5,
        };
        -code
    }
}

pub type KResult<T> = Result<T, KernelError>;
