//! PCIe ECAM enumeration and virtio capability binding. Grounded in
//! `original_source/src/pci.c`: walk bus 0..255 x device 0..31 (function 0
//! only — the distillation does not require multi-function probing), read
//! the vendor id at config offset 0 (`0xFFFF` means absent), assign BARs
//! from a bump pointer starting at [`crate::mm::layout::PCI_MMIO_BASE`], and
//! follow the capability linked list for `cap_vndr == 9` (virtio) entries.

use spin::Mutex;

use crate::errors::{KResult, KernelError, ProtocolError};
use crate::mm::layout::{PCIE_ECAM_BASE, PCI_MMIO_BASE};

const PCIE_BUSES: usize = 256;
const PCIE_DEVICES_PER_BUS: usize = 32;
const ECAM_FN_STRIDE: usize = 1 << 12; // 4 KiB per function

const VENDOR_ID: usize = 0x00;
const COMMAND: usize = 0x04;
const HEADER_TYPE: usize = 0x0e;
const BAR0: usize = 0x10;
const CAPABILITIES_PTR: usize = 0x34;

const CMD_IO_SPACE: u16 = 1 << 0;
const CMD_MEM_SPACE: u16 = 1 << 1;
const CMD_BUS_MASTER: u16 = 1 << 2;

const VIRTIO_VENDOR_ID: u16 = 0x1af4;
const PCI_CAP_ID_VNDR: u8 = 0x09;

// `struct virtio_pci_common_cfg` byte offsets (virtio 1.0 spec, 4.1.4.3),
// relative to the `CommonCfg` capability's BAR window.
const COMMON_DEVICE_FEATURE_SELECT: usize = 0x00;
const COMMON_DEVICE_FEATURE: usize = 0x04;
const COMMON_DRIVER_FEATURE_SELECT: usize = 0x08;
const COMMON_DRIVER_FEATURE: usize = 0x0c;
const COMMON_DEVICE_STATUS: usize = 0x14;
const COMMON_QUEUE_SELECT: usize = 0x16;
const COMMON_QUEUE_SIZE: usize = 0x18;
const COMMON_QUEUE_ENABLE: usize = 0x1c;
const COMMON_QUEUE_NOTIFY_OFF: usize = 0x1e;
const COMMON_QUEUE_DESC: usize = 0x20;
const COMMON_QUEUE_DRIVER: usize = 0x28;
const COMMON_QUEUE_DEVICE: usize = 0x30;

const STATUS_ACKNOWLEDGE: u8 = 1;
const STATUS_DRIVER: u8 = 2;
const STATUS_DRIVER_OK: u8 = 4;
const STATUS_FEATURES_OK: u8 = 8;

unsafe fn mmio_read8(addr: usize) -> u8 {
    (addr as *const u8).read_volatile()
}

unsafe fn mmio_write8(addr: usize, value: u8) {
    (addr as *mut u8).write_volatile(value)
}

unsafe fn mmio_read16(addr: usize) -> u16 {
    (addr as *const u16).read_volatile()
}

unsafe fn mmio_write16(addr: usize, value: u16) {
    (addr as *mut u16).write_volatile(value)
}

unsafe fn mmio_read32(addr: usize) -> u32 {
    (addr as *const u32).read_volatile()
}

unsafe fn mmio_write32(addr: usize, value: u32) {
    (addr as *mut u32).write_volatile(value)
}

unsafe fn mmio_write64(addr: usize, value: u64) {
    mmio_write32(addr, value as u32);
    mmio_write32(addr + 4, (value >> 32) as u32);
}

/// A virtio capability type, selected by the capability's `cfg_type` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtioCapKind {
    CommonCfg,
    NotifyCfg,
    Isr,
    DeviceCfg,
    PciCfg,
}

impl VirtioCapKind {
    fn from_raw(cfg_type: u8) -> Option<Self> {
        match cfg_type {
            1 => Some(Self::CommonCfg),
            2 => Some(Self::NotifyCfg),
            3 => Some(Self::Isr),
            4 => Some(Self::DeviceCfg),
            5 => Some(Self::PciCfg),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VirtioCap {
    pub kind: VirtioCapKind,
    pub bar: u8,
    pub offset: u32,
    pub length: u32,
    /// Only meaningful for `NotifyCfg`: multiply the queue's notify_off by
    /// this to get the byte offset into the notify BAR.
    pub notify_off_multiplier: u32,
}

/// A discovered PCI function bound to a BAR window and its virtio
/// capabilities.
pub struct PciDevice {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
    pub ecam_base: usize,
    pub bar_base: usize,
    pub caps: alloc::vec::Vec<VirtioCap>,
}

impl PciDevice {
    fn config_addr(&self, offset: usize) -> *mut u8 {
        (self.ecam_base + offset) as *mut u8
    }

    unsafe fn read32(&self, offset: usize) -> u32 {
        (self.config_addr(offset) as *mut u32).read_volatile()
    }

    unsafe fn write32(&self, offset: usize, value: u32) {
        (self.config_addr(offset) as *mut u32).write_volatile(value)
    }

    unsafe fn read16(&self, offset: usize) -> u16 {
        (self.config_addr(offset) as *mut u16).read_volatile()
    }

    unsafe fn write16(&self, offset: usize, value: u16) {
        (self.config_addr(offset) as *mut u16).write_volatile(value)
    }
}

static NEXT_BAR: Mutex<usize> = Mutex::new(PCI_MMIO_BASE);

fn ecam_page(bus: u8, device: u8, function: u8) -> usize {
    PCIE_ECAM_BASE
        + (bus as usize) * (PCIE_DEVICES_PER_BUS * 8 * ECAM_FN_STRIDE)
        + (device as usize) * (8 * ECAM_FN_STRIDE)
        + (function as usize) * ECAM_FN_STRIDE
}

/// Walk every bus/device/function-0 slot, binding each virtio function we
/// find. Non-virtio devices and absent slots (`vendor_id == 0xFFFF`) are
/// skipped.
pub fn enumerate() -> alloc::vec::Vec<PciDevice> {
    let mut found = alloc::vec::Vec::new();
    for bus in 0..PCIE_BUSES as u8 {
        for device in 0..PCIE_DEVICES_PER_BUS as u8 {
            let ecam_base = ecam_page(bus, device, 0);
            let vendor_id = unsafe { (ecam_base as *mut u16).read_volatile() };
            if vendor_id == 0xFFFF {
                continue;
            }
            let header_type = unsafe { ((ecam_base + HEADER_TYPE) as *mut u8).read_volatile() };
            if header_type & 0x7f != 0 {
                // type-1 (bridge) or other non-endpoint header: the
                // distillation only requires type-0 BAR assignment.
                continue;
            }
            if vendor_id != VIRTIO_VENDOR_ID {
                continue;
            }

            let mut pci_dev = PciDevice {
                bus,
                device,
                function: 0,
                ecam_base,
                bar_base: 0,
                caps: alloc::vec::Vec::new(),
            };
            match bind(&mut pci_dev) {
                Ok(()) => found.push(pci_dev),
                Err(e) => crate::warn!("pci::enumerate: failed to bind {:02x}:{:02x}: {:?}", bus, device, e),
            }
        }
    }
    found
}

fn assign_bar(dev: &PciDevice) -> usize {
    unsafe {
        dev.write32(BAR0, 0xffff_ffff);
        let probe = dev.read32(BAR0);
        let size = (!(probe & !0xf) as u64 + 1) as usize;
        let mut next = NEXT_BAR.lock();
        let base = *next;
        *next += size.max(4096);
        dev.write32(BAR0, base as u32);
        base
    }
}

fn bind(dev: &mut PciDevice) -> KResult<()> {
    dev.bar_base = assign_bar(dev);

    unsafe {
        let cmd = dev.read16(COMMAND);
        dev.write16(COMMAND, cmd | CMD_MEM_SPACE | CMD_IO_SPACE | CMD_BUS_MASTER);
    }

    let mut cap_ptr = unsafe { dev.read32(CAPABILITIES_PTR) as usize & 0xfc };
    let mut iterations = 0;
    while cap_ptr != 0 && iterations < 64 {
        iterations += 1;
        let cap_vndr = unsafe { ((dev.ecam_base + cap_ptr) as *mut u8).read_volatile() };
        let cap_next = unsafe { ((dev.ecam_base + cap_ptr + 1) as *mut u8).read_volatile() };
        if cap_vndr == PCI_CAP_ID_VNDR {
            let cfg_type = unsafe { ((dev.ecam_base + cap_ptr + 3) as *mut u8).read_volatile() };
            let bar = unsafe { ((dev.ecam_base + cap_ptr + 4) as *mut u8).read_volatile() };
            let offset = unsafe { dev.read32(cap_ptr + 8) };
            let length = unsafe { dev.read32(cap_ptr + 12) };
            let notify_mult = if cfg_type == 2 {
                unsafe { dev.read32(cap_ptr + 16) }
            } else {
                0
            };
            if let Some(kind) = VirtioCapKind::from_raw(cfg_type) {
                dev.caps.push(VirtioCap { kind, bar, offset, length, notify_off_multiplier: notify_mult });
            }
        }
        cap_ptr = cap_next as usize & 0xfc;
    }

    if dev.caps.is_empty() {
        return Err(KernelError::Protocol(ProtocolError::UnknownVirtioCapability));
    }
    dev.negotiate_common_cfg()?;
    Ok(())
}

impl PciDevice {
    pub fn find_cap(&self, kind: VirtioCapKind) -> Option<&VirtioCap> {
        self.caps.iter().find(|c| c.kind == kind)
    }

    fn common_cfg_base(&self) -> KResult<usize> {
        let common = self
            .find_cap(VirtioCapKind::CommonCfg)
            .ok_or(KernelError::Protocol(ProtocolError::UnknownVirtioCapability))?;
        Ok(self.bar_base + common.offset as usize)
    }

    /// Device-status handshake (virtio 1.0 spec 3.1.1): reset, ACKNOWLEDGE,
    /// DRIVER, accept whatever feature bits the device offers (the
    /// distillation negotiates none of the optional ones), FEATURES_OK,
    /// then DRIVER_OK once the device confirms FEATURES_OK stuck. Grounded
    /// in `original_source/src/virtio.c`'s init sequence. Run once per
    /// device at bind time, before any queue is programmed.
    fn negotiate_common_cfg(&self) -> KResult<()> {
        let base = self.common_cfg_base()?;
        unsafe {
            mmio_write8(base + COMMON_DEVICE_STATUS, 0);
            mmio_write8(base + COMMON_DEVICE_STATUS, STATUS_ACKNOWLEDGE);
            mmio_write8(base + COMMON_DEVICE_STATUS, STATUS_ACKNOWLEDGE | STATUS_DRIVER);

            mmio_write32(base + COMMON_DEVICE_FEATURE_SELECT, 0);
            let _offered = mmio_read32(base + COMMON_DEVICE_FEATURE);
            mmio_write32(base + COMMON_DRIVER_FEATURE_SELECT, 0);
            mmio_write32(base + COMMON_DRIVER_FEATURE, 0);

            mmio_write8(
                base + COMMON_DEVICE_STATUS,
                STATUS_ACKNOWLEDGE | STATUS_DRIVER | STATUS_FEATURES_OK,
            );
            let status = mmio_read8(base + COMMON_DEVICE_STATUS);
            if status & STATUS_FEATURES_OK == 0 {
                return Err(KernelError::Protocol(ProtocolError::UnknownVirtioCapability));
            }

            mmio_write8(base + COMMON_DEVICE_STATUS, status | STATUS_DRIVER_OK);
        }
        Ok(())
    }

    /// Program one virtqueue into the common-config capability: select it,
    /// read back the device's reported queue size, write the three ring
    /// addresses and set `queue_enable`. Returns the queue's notify address
    /// (`NotifyCfg` BAR window base plus `queue_notify_off * notify_off_multiplier`,
    /// per spec 4.1.4.4) for the caller to write the queue index to on every
    /// notify. Grounded in `original_source/src/virtio.c`'s queue setup.
    pub fn bind_queue(
        &self,
        queue_index: u16,
        desc_addr: usize,
        driver_addr: usize,
        device_addr: usize,
    ) -> KResult<(u16, usize)> {
        let common_base = self.common_cfg_base()?;
        let notify = self
            .find_cap(VirtioCapKind::NotifyCfg)
            .ok_or(KernelError::Protocol(ProtocolError::UnknownVirtioCapability))?;

        unsafe {
            mmio_write16(common_base + COMMON_QUEUE_SELECT, queue_index);
            let queue_size = mmio_read16(common_base + COMMON_QUEUE_SIZE);
            mmio_write64(common_base + COMMON_QUEUE_DESC, desc_addr as u64);
            mmio_write64(common_base + COMMON_QUEUE_DRIVER, driver_addr as u64);
            mmio_write64(common_base + COMMON_QUEUE_DEVICE, device_addr as u64);
            mmio_write16(common_base + COMMON_QUEUE_ENABLE, 1);

            let notify_off = mmio_read16(common_base + COMMON_QUEUE_NOTIFY_OFF);
            let notify_addr =
                self.bar_base + notify.offset as usize + notify_off as usize * notify.notify_off_multiplier as usize;
            Ok((queue_size, notify_addr))
        }
    }
}
