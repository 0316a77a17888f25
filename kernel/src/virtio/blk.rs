//! Virtio-block driver. Grounded in `original_source/src/block.c`: a
//! three-descriptor request chain (16-byte read-only header, read/write-only
//! data buffer, 1-byte write-only status), one in-flight request per device
//! serialized by a per-device mutex.

use alloc::sync::Arc;
use spin::Mutex;

use crate::errors::{KResult, KernelError, ProtocolError};
use crate::mm::memory::PhysAddr;

use super::pci::{PciDevice, VirtioCapKind};
use super::queue::{Completion, Descriptor, Virtqueue, VirtqueueSet, DESC_F_WRITE};

pub const SECTOR_SIZE: usize = 512;

/// Requested queue size; `PciDevice::bind_queue` reads back the device's
/// actual `queue_size` during the handshake; one request in flight per
/// device, serialized by `request_lock`, never needs more than a handful
/// of descriptor slots either way.
const REQUEST_QUEUE_SIZE: u16 = 8;

#[repr(u32)]
#[derive(Clone, Copy, Debug)]
pub enum BlkRequestType {
    In = 0,
    Out = 1,
    Flush = 4,
    Discard = 11,
    WriteZeroes = 13,
}

#[repr(C)]
struct BlkHeader {
    req_type: u32,
    reserved: u32,
    sector: u64,
}

/// A bound virtio-blk device: its queue set (request queue is index 0) plus
/// the geometry read from its device-config capability at init.
pub struct BlkDevice {
    queues: VirtqueueSet,
    sector_count: u64,
    request_lock: Mutex<()>,
}

impl BlkDevice {
    pub fn new(queues: VirtqueueSet, sector_count: u64) -> Self {
        Self { queues, sector_count, request_lock: Mutex::new(()) }
    }

    /// Bind against a PCI function's `DeviceCfg` capability (sector count,
    /// at device-config offset 0), then program queue 0 into the device's
    /// common-config capability (`PciDevice::bind_queue`: descriptor/avail/
    /// used addresses, `queue_enable`) and record its notify address so
    /// `Virtqueue::send_descriptor_chain` can reach the device. Grounded in
    /// `original_source/src/virtio.c`'s device-config read and queue setup.
    pub fn probe(dev: &PciDevice) -> KResult<Self> {
        let device_cfg = dev
            .find_cap(VirtioCapKind::DeviceCfg)
            .ok_or(KernelError::Protocol(ProtocolError::UnknownVirtioCapability))?;
        let sector_count =
            unsafe { ((dev.bar_base + device_cfg.offset as usize) as *const u64).read_volatile() };

        let mut queue = Virtqueue::new(REQUEST_QUEUE_SIZE);
        let (_queue_size, notify_addr) = dev.bind_queue(
            0,
            queue.descriptor_table_addr(),
            queue.avail_ring_addr(),
            queue.used_ring_addr(),
        )?;
        queue.bind_to_device(0, notify_addr);

        let queues = VirtqueueSet::new();
        queues.add(queue);

        Ok(Self::new(queues, sector_count))
    }

    pub fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn submit(&self, req_type: BlkRequestType, sector: u64, buf_pa: PhysAddr, buf_len: u32) -> KResult<u8> {
        if sector >= self.sector_count {
            return Err(KernelError::Protocol(ProtocolError::BlockIoError));
        }
        let _guard = self.request_lock.lock();

        let header = BlkHeader { req_type: req_type as u32, reserved: 0, sector };
        let header_pa = &header as *const BlkHeader as usize;
        let status: u8 = 0xff;
        let status_pa = &status as *const u8 as usize;

        let data_write_flag = match req_type {
            BlkRequestType::In => DESC_F_WRITE,
            _ => 0,
        };

        let chain = [
            Descriptor { addr: header_pa as u64, len: core::mem::size_of::<BlkHeader>() as u32, flags: 0, next: 0 },
            Descriptor { addr: buf_pa.as_usize() as u64, len: buf_len, flags: data_write_flag, next: 0 },
            Descriptor { addr: status_pa as u64, len: 1, flags: DESC_F_WRITE, next: 0 },
        ];

        let completion = Arc::new(Completion::new());
        self.queues.with_queue(0, |q| q.send_descriptor_chain(&chain, completion.clone()))?;

        let result = completion.wait();
        if result != 0 {
            return Err(KernelError::Protocol(ProtocolError::BlockIoError));
        }
        Ok(status)
    }

    /// Read one 512-byte sector into the physical buffer at `buf_pa`.
    pub fn read_sector(&self, sector: u64, buf_pa: PhysAddr) -> KResult<()> {
        let status = self.submit(BlkRequestType::In, sector, buf_pa, SECTOR_SIZE as u32)?;
        if status != 0 {
            return Err(KernelError::Protocol(ProtocolError::BlockIoError));
        }
        Ok(())
    }

    /// Write one 512-byte sector from the physical buffer at `buf_pa`.
    pub fn write_sector(&self, sector: u64, buf_pa: PhysAddr) -> KResult<()> {
        let status = self.submit(BlkRequestType::Out, sector, buf_pa, SECTOR_SIZE as u32)?;
        if status != 0 {
            return Err(KernelError::Protocol(ProtocolError::BlockIoError));
        }
        Ok(())
    }

    /// Read `count` contiguous sectors starting at `sector` into `buf_pa`,
    /// issuing one request per sector (the distillation's "multi-sector
    /// wrappers compose by issuing aligned-sector I/O").
    pub fn read_sectors(&self, sector: u64, count: u64, buf_pa: PhysAddr) -> KResult<()> {
        for i in 0..count {
            let offset_pa = PhysAddr::new(buf_pa.as_usize() + (i as usize) * SECTOR_SIZE);
            self.read_sector(sector + i, offset_pa)?;
        }
        Ok(())
    }

    pub fn write_sectors(&self, sector: u64, count: u64, buf_pa: PhysAddr) -> KResult<()> {
        for i in 0..count {
            let offset_pa = PhysAddr::new(buf_pa.as_usize() + (i as usize) * SECTOR_SIZE);
            self.write_sector(sector + i, offset_pa)?;
        }
        Ok(())
    }

    /// Called from `virtio::dispatch_irq` when the PLIC reports
    /// `VIRTIO0_IRQ`. Reads the device's published used-ring index back out
    /// of the queue's own memory and fulfills whichever completions it
    /// covers.
    pub fn handle_irq(&self) {
        self.queues.with_queue(0, |q| q.drain_used_ring());
    }
}
