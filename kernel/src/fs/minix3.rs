//! Minix3 on-disk filesystem, mounted on a [`crate::virtio::blk::BlkDevice`].
//! Grounded in `original_source/src/minix3.c`/`minix3.h`: superblock at byte
//! 1024, 7 direct + single/double/triple indirect zone pointers per inode,
//! 64-byte inodes, 64-byte directory entries.
//!
//! Two quirks are preserved verbatim rather than "fixed", because they are
//! observed behavior of the system being modeled, not accidents of this
//! port: `block_size` is written during synthetic superblock init even
//! though the on-disk format documents it as unused, and `put_data` never
//! allocates a new zone when a write extends past the inode's existing
//! pointers (callers must pre-allocate via `alloc_zone` themselves; writing
//! past a hole silently has no effect beyond that hole).

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::errors::{KResult, KernelError, ConfigError, ResourceError};
use crate::virtio::blk::{BlkDevice, SECTOR_SIZE};

pub const MINIX3_MAGIC: u16 = 0x4d5a;
pub const INVALID_INODE: u32 = 0;
pub const INODE_SIZE: usize = 64;
pub const DIRENT_SIZE: usize = 64;
pub const DIRENT_NAME_LEN: usize = 60;
const NUM_ZONE_PTRS: usize = 10;
const SUPERBLOCK_BYTE_OFFSET: usize = 1024;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Superblock {
    pub num_inodes: u32,
    pub pad0: u16,
    pub imap_blocks: u16,
    pub zmap_blocks: u16,
    pub first_data_zone: u16,
    pub log_zone_size: u16,
    pub pad1: u16,
    pub max_size: u32,
    pub num_zones: u32,
    pub magic: u16,
    pub pad2: u16,
    /// Documented invalid for Minix3, but written during synthetic
    /// superblock init in the source this is grounded on; kept as data.
    pub block_size: u16,
    pub disk_version: u8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Inode {
    pub mode: u16,
    pub num_links: u16,
    pub uid: u16,
    pub gid: u16,
    pub size: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub zones: [u32; NUM_ZONE_PTRS],
}

pub const S_IFDIR: u16 = 0o040000;
pub const S_IFREG: u16 = 0o100000;
pub const S_IFMT: u16 = 0o170000;

impl Inode {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub inode: u32,
    pub name: String,
}

pub struct Minix3Fs {
    device: Arc<BlkDevice>,
    superblock: Superblock,
    inode_bitmap: Mutex<Vec<u8>>,
    zone_bitmap: Mutex<Vec<u8>>,
}

impl Minix3Fs {
    /// Read the superblock at byte 1024, validate the magic, and cache the
    /// inode/zone bitmaps. Mounting a different device on an already-mounted
    /// fs instance re-reads fresh bitmap state (there is no write-back
    /// queue; every `put_*` writes straight through).
    pub fn mount(device: Arc<BlkDevice>) -> KResult<Self> {
        let mut raw = alloc::vec![0u8; SECTOR_SIZE * 2];
        read_bytes_at(&device, SUPERBLOCK_BYTE_OFFSET, &mut raw)?;
        let superblock = unsafe { core::ptr::read_unaligned(raw.as_ptr() as *const Superblock) };

        if superblock.magic != MINIX3_MAGIC {
            return Err(KernelError::Configuration(ConfigError::InvalidSuperblockMagic));
        }

        let zone_size = Self::zone_size_of(&superblock);
        let imap_bytes = superblock.imap_blocks as usize * zone_size;
        let zmap_bytes = superblock.zmap_blocks as usize * zone_size;

        let imap_block_start = 2; // boot(0), superblock(1), then imap
        let zmap_block_start = imap_block_start + superblock.imap_blocks as usize;

        let mut inode_bitmap = alloc::vec![0u8; imap_bytes];
        read_bytes_at(&device, imap_block_start * zone_size, &mut inode_bitmap)?;

        let mut zone_bitmap = alloc::vec![0u8; zmap_bytes];
        read_bytes_at(&device, zmap_block_start * zone_size, &mut zone_bitmap)?;

        Ok(Self {
            device,
            superblock,
            inode_bitmap: Mutex::new(inode_bitmap),
            zone_bitmap: Mutex::new(zone_bitmap),
        })
    }

    fn zone_size_of(sb: &Superblock) -> usize {
        1024usize << sb.log_zone_size
    }

    pub fn zone_size(&self) -> usize {
        Self::zone_size_of(&self.superblock)
    }

    pub fn superblock(&self) -> Superblock {
        self.superblock
    }

    fn inode_table_block(&self) -> usize {
        2 + self.superblock.imap_blocks as usize + self.superblock.zmap_blocks as usize
    }

    fn inode_byte_offset(&self, inode: u32) -> usize {
        self.inode_table_block() * self.zone_size() + (inode as usize - 1) * INODE_SIZE
    }

    fn zone_byte_offset(&self, zone: u32) -> usize {
        zone as usize * self.zone_size()
    }

    pub fn has_inode(&self, inode: u32) -> bool {
        if inode == INVALID_INODE {
            return false;
        }
        let bit = (inode - 1) as usize;
        let bitmap = self.inode_bitmap.lock();
        bit / 8 < bitmap.len() && bitmap[bit / 8] & (1 << (bit % 8)) != 0
    }

    pub fn take_inode(&self, inode: u32) -> bool {
        if inode == INVALID_INODE {
            return false;
        }
        let bit = (inode - 1) as usize;
        let mut bitmap = self.inode_bitmap.lock();
        if bit / 8 >= bitmap.len() {
            return false;
        }
        let was_set = bitmap[bit / 8] & (1 << (bit % 8)) != 0;
        bitmap[bit / 8] |= 1 << (bit % 8);
        !was_set
    }

    /// Scan the inode bitmap byte-by-byte for the first non-`0xFF` byte,
    /// find its first clear bit.
    pub fn get_next_free_inode(&self) -> Option<u32> {
        first_clear_bit(&self.inode_bitmap.lock()).map(|bit| bit as u32 + 1)
    }

    pub fn alloc_inode(&self) -> KResult<u32> {
        let inode = self
            .get_next_free_inode()
            .ok_or(KernelError::ResourceExhausted(ResourceError::OutOfInodes))?;
        self.take_inode(inode);
        self.put_inode(inode, Inode { num_links: 1, ..Default::default() })?;
        Ok(inode)
    }

    pub fn has_zone(&self, zone: u32) -> bool {
        let bitmap = self.zone_bitmap.lock();
        (zone as usize) / 8 < bitmap.len() && bitmap[zone as usize / 8] & (1 << (zone % 8)) != 0
    }

    pub fn take_zone(&self, zone: u32) -> bool {
        let mut bitmap = self.zone_bitmap.lock();
        if (zone as usize) / 8 >= bitmap.len() {
            return false;
        }
        let was_set = bitmap[zone as usize / 8] & (1 << (zone % 8)) != 0;
        bitmap[zone as usize / 8] |= 1 << (zone % 8);
        !was_set
    }

    pub fn alloc_zone(&self) -> KResult<u32> {
        let zone = first_clear_bit(&self.zone_bitmap.lock())
            .map(|bit| bit as u32)
            .ok_or(KernelError::ResourceExhausted(ResourceError::OutOfZones))?;
        self.take_zone(zone);
        Ok(zone)
    }

    pub fn get_inode(&self, inode: u32) -> KResult<Inode> {
        if inode == INVALID_INODE {
            return Err(KernelError::Configuration(ConfigError::InvalidInode));
        }
        let mut buf = [0u8; INODE_SIZE];
        read_bytes_at(&self.device, self.inode_byte_offset(inode), &mut buf)?;
        Ok(unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const Inode) })
    }

    pub fn put_inode(&self, inode: u32, data: Inode) -> KResult<()> {
        if inode == INVALID_INODE {
            return Err(KernelError::Configuration(ConfigError::InvalidInode));
        }
        let bytes = unsafe {
            core::slice::from_raw_parts(&data as *const Inode as *const u8, INODE_SIZE)
        };
        write_bytes_at(&self.device, self.inode_byte_offset(inode), bytes)
    }

    fn read_zone(&self, zone: u32, out: &mut [u8]) -> KResult<()> {
        if zone == 0 {
            out.fill(0); // hole: sparse files read as zeros
            return Ok(());
        }
        if (zone as u32) < self.superblock.first_data_zone as u32
            || zone >= self.superblock.num_zones + self.superblock.first_data_zone as u32
        {
            crate::warn!("minix3: zone {} out of range, ignoring access", zone);
            out.fill(0);
            return Ok(());
        }
        read_bytes_at(&self.device, self.zone_byte_offset(zone), out)
    }

    fn write_zone(&self, zone: u32, data: &[u8]) -> KResult<()> {
        if zone == 0 {
            // writing into a hole with no allocated zone: the documented
            // limitation is that `put_data` never allocates here.
            return Ok(());
        }
        write_bytes_at(&self.device, self.zone_byte_offset(zone), data)
    }

    /// Flatten direct + single/double/triple indirect zone pointers into
    /// canonical file order. Bounded to exactly 3 levels of indirection, so
    /// the recursion here is fixed-depth, not data-driven.
    fn collect_zone_list(&self, inode: &Inode) -> KResult<Vec<u32>> {
        let mut zones = Vec::with_capacity(7);
        zones.extend_from_slice(&inode.zones[0..7]);
        self.append_indirect(inode.zones[7], 1, &mut zones)?;
        self.append_indirect(inode.zones[8], 2, &mut zones)?;
        self.append_indirect(inode.zones[9], 3, &mut zones)?;
        Ok(zones)
    }

    fn append_indirect(&self, zone: u32, level: u32, out: &mut Vec<u32>) -> KResult<()> {
        if zone == 0 {
            return Ok(());
        }
        let zone_size = self.zone_size();
        let mut buf = alloc::vec![0u8; zone_size];
        self.read_zone(zone, &mut buf)?;
        let ptrs_per_block = zone_size / 4;
        for i in 0..ptrs_per_block {
            let ptr = u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
            if level == 1 {
                out.push(ptr);
            } else {
                self.append_indirect(ptr, level - 1, out)?;
            }
        }
        Ok(())
    }

    /// Walk the inode's zones in canonical order, copying `count` bytes
    /// starting at `offset` into `dst`.
    pub fn get_data(&self, inode: u32, dst: &mut [u8], offset: usize, count: usize) -> KResult<()> {
        let inode_data = self.get_inode(inode)?;
        let zones = self.collect_zone_list(&inode_data)?;
        let zone_size = self.zone_size();

        let mut file_cursor = 0usize;
        let mut buffer_cursor = 0usize;
        let mut zbuf = alloc::vec![0u8; zone_size];

        for &zone in &zones {
            if buffer_cursor >= count {
                break;
            }
            if file_cursor + zone_size <= offset {
                file_cursor += zone_size;
                continue;
            }
            self.read_zone(zone, &mut zbuf)?;
            let start_in_zone = offset.saturating_sub(file_cursor);
            let available = zone_size - start_in_zone;
            let remaining = count - buffer_cursor;
            let to_copy = available.min(remaining);
            dst[buffer_cursor..buffer_cursor + to_copy]
                .copy_from_slice(&zbuf[start_in_zone..start_in_zone + to_copy]);
            buffer_cursor += to_copy;
            file_cursor += zone_size;
        }
        Ok(())
    }

    /// Mirror of `get_data`, read-modify-write at both edges. Never
    /// allocates a zone it finds as a hole (documented limitation, see
    /// module docs): writes into a hole are simply dropped.
    pub fn put_data(&self, inode: u32, src: &[u8], offset: usize, count: usize) -> KResult<()> {
        let inode_data = self.get_inode(inode)?;
        let zones = self.collect_zone_list(&inode_data)?;
        let zone_size = self.zone_size();

        let mut file_cursor = 0usize;
        let mut buffer_cursor = 0usize;
        let mut zbuf = alloc::vec![0u8; zone_size];

        for &zone in &zones {
            if buffer_cursor >= count {
                break;
            }
            if file_cursor + zone_size <= offset {
                file_cursor += zone_size;
                continue;
            }
            let start_in_zone = offset.saturating_sub(file_cursor);
            let available = zone_size - start_in_zone;
            let remaining = count - buffer_cursor;
            let to_copy = available.min(remaining);

            if start_in_zone != 0 || to_copy != zone_size {
                self.read_zone(zone, &mut zbuf)?;
            }
            zbuf[start_in_zone..start_in_zone + to_copy]
                .copy_from_slice(&src[buffer_cursor..buffer_cursor + to_copy]);
            self.write_zone(zone, &zbuf)?;

            buffer_cursor += to_copy;
            file_cursor += zone_size;
        }
        Ok(())
    }

    pub fn get_dir_entry(&self, inode: u32, entry: u32) -> KResult<Option<DirEntry>> {
        let mut buf = [0u8; DIRENT_SIZE];
        self.get_data(inode, &mut buf, entry as usize * DIRENT_SIZE, DIRENT_SIZE)?;
        let ino = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if ino == INVALID_INODE {
            return Ok(None);
        }
        let name_bytes = &buf[4..4 + DIRENT_NAME_LEN];
        let len = name_bytes.iter().position(|&b| b == 0).unwrap_or(DIRENT_NAME_LEN);
        let name = String::from_utf8_lossy(&name_bytes[..len]).into_owned();
        Ok(Some(DirEntry { inode: ino, name }))
    }

    pub fn put_dir_entry(&self, inode: u32, entry: u32, data: &DirEntry) -> KResult<()> {
        let mut buf = [0u8; DIRENT_SIZE];
        buf[0..4].copy_from_slice(&data.inode.to_le_bytes());
        let name_bytes = data.name.as_bytes();
        let len = name_bytes.len().min(DIRENT_NAME_LEN);
        buf[4..4 + len].copy_from_slice(&name_bytes[..len]);
        self.put_data(inode, &buf, entry as usize * DIRENT_SIZE, DIRENT_SIZE)
    }

    /// Read entries sequentially until one with `inode == 0` terminates.
    pub fn list_dir(&self, inode: u32) -> KResult<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut idx = 0;
        loop {
            match self.get_dir_entry(inode, idx)? {
                Some(entry) => entries.push(entry),
                None => break,
            }
            idx += 1;
        }
        Ok(entries)
    }

    pub fn find_dir_entry(&self, inode: u32, name: &str) -> KResult<Option<u32>> {
        for entry in self.list_dir(inode)? {
            if entry.name == name {
                return Ok(Some(entry.inode));
            }
        }
        Ok(None)
    }

    /// Split `path`, walk from the root inode (1) component-by-component.
    /// If `want_parent`, stops one component short and returns that inode.
    pub fn get_inode_from_path(&self, path: &str, want_parent: bool) -> KResult<Option<u32>> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            return Ok(Some(1));
        }
        let stop_at = if want_parent { components.len() - 1 } else { components.len() };

        let mut current = 1u32;
        for component in &components[..stop_at] {
            match self.find_dir_entry(current, component)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Depth-first walk starting at `inode`, explicit worklist rather than
    /// call-stack recursion (a malformed filesystem could otherwise blow
    /// the stack walking a cyclic or very deep tree).
    pub fn traverse(
        &self,
        inode: u32,
        max_depth: u32,
        mut callback: impl FnMut(u32, &str, u32),
    ) -> KResult<()> {
        let mut worklist: Vec<(u32, String, u32)> = alloc::vec![(inode, String::new(), 0)];
        while let Some((current, path, depth)) = worklist.pop() {
            callback(current, &path, depth);
            if depth >= max_depth {
                continue;
            }
            let inode_data = self.get_inode(current)?;
            if !inode_data.is_dir() {
                continue;
            }
            for entry in self.list_dir(current)? {
                if entry.name == "." || entry.name == ".." {
                    continue;
                }
                let mut child_path = path.clone();
                child_path.push('/');
                child_path.push_str(&entry.name);
                worklist.push((entry.inode, child_path, depth + 1));
            }
        }
        Ok(())
    }
}

fn read_bytes_at(device: &BlkDevice, byte_offset: usize, out: &mut [u8]) -> KResult<()> {
    // device I/O is sector-granular; callers keep every buffer aligned to
    // the filesystem's zone size (always a multiple of 512 bytes), so a
    // straight per-sector copy through a bounce buffer is sufficient.
    let start_sector = byte_offset / SECTOR_SIZE;
    let mut bounce = [0u8; SECTOR_SIZE];
    let mut copied = 0;
    let mut sector = start_sector as u64;
    let mut remaining_skip = byte_offset % SECTOR_SIZE;
    while copied < out.len() {
        let pa = crate::mm::memory::PhysAddr::new(bounce.as_mut_ptr() as usize);
        device.read_sector(sector, pa)?;
        let take = (SECTOR_SIZE - remaining_skip).min(out.len() - copied);
        out[copied..copied + take].copy_from_slice(&bounce[remaining_skip..remaining_skip + take]);
        copied += take;
        remaining_skip = 0;
        sector += 1;
    }
    Ok(())
}

fn write_bytes_at(device: &BlkDevice, byte_offset: usize, data: &[u8]) -> KResult<()> {
    let start_sector = byte_offset / SECTOR_SIZE;
    let mut bounce = [0u8; SECTOR_SIZE];
    let mut written = 0;
    let mut sector = start_sector as u64;
    let mut remaining_skip = byte_offset % SECTOR_SIZE;
    while written < data.len() {
        let take = (SECTOR_SIZE - remaining_skip).min(data.len() - written);
        if take < SECTOR_SIZE {
            let pa = crate::mm::memory::PhysAddr::new(bounce.as_mut_ptr() as usize);
            device.read_sector(sector, pa)?;
        }
        bounce[remaining_skip..remaining_skip + take].copy_from_slice(&data[written..written + take]);
        let pa = crate::mm::memory::PhysAddr::new(bounce.as_mut_ptr() as usize);
        device.write_sector(sector, pa)?;
        written += take;
        remaining_skip = 0;
        sector += 1;
    }
    Ok(())
}

/// Shared by `get_next_free_inode` and `alloc_zone`: first non-`0xFF` byte,
/// then its first clear bit.
fn first_clear_bit(bitmap: &[u8]) -> Option<usize> {
    for (byte_idx, &byte) in bitmap.iter().enumerate() {
        if byte != 0xFF {
            for bit in 0..8 {
                if byte & (1 << bit) == 0 {
                    return Some(byte_idx * 8 + bit);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_clear_bit_finds_first_gap() {
        assert_eq!(first_clear_bit(&[0xFF, 0xFF, 0b1111_1101]), Some(17));
        assert_eq!(first_clear_bit(&[0b0000_0001]), Some(1));
        assert_eq!(first_clear_bit(&[0xFF, 0xFF]), None);
    }

    #[test]
    fn dir_entry_name_round_trips_through_fixed_width_buffer() {
        let mut buf = [0u8; DIRENT_SIZE];
        let original = DirEntry { inode: 7, name: "hello.txt".into() };
        buf[0..4].copy_from_slice(&original.inode.to_le_bytes());
        let name_bytes = original.name.as_bytes();
        buf[4..4 + name_bytes.len()].copy_from_slice(name_bytes);

        let ino = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let raw_name = &buf[4..4 + DIRENT_NAME_LEN];
        let len = raw_name.iter().position(|&b| b == 0).unwrap_or(DIRENT_NAME_LEN);
        let name = String::from_utf8_lossy(&raw_name[..len]).into_owned();

        assert_eq!(ino, 7);
        assert_eq!(name, "hello.txt");
    }

    #[test]
    fn inode_mode_classification() {
        let dir = Inode { mode: S_IFDIR, ..Default::default() };
        let file = Inode { mode: S_IFREG, ..Default::default() };
        assert!(dir.is_dir());
        assert!(!dir.is_file());
        assert!(file.is_file());
        assert!(!file.is_dir());
    }
}
