//! Process-facing file handles on top of [`super::minix3`]. Grounded in
//! `original_source/src/vfs.c`/`vfs.h`: a mount table keyed by path prefix, a
//! `File` handle carrying a cached copy of its inode plus a read/write
//! cursor, and the open-file table kept as a [`crate::common::resource_table::ResourceTable`]
//! the way the teacher keeps every other id-indexed live-object table
//! (see `process::manager::PROCESS_MANAGER`'s pcb map for the same idiom).

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::{Mutex, RwLock};

use crate::common::resource_table::ResourceTable;
use crate::errors::{ConfigError, KResult, KernelError};

use super::minix3::{Inode, Minix3Fs};

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

pub const O_RDONLY: u32 = 0;
pub const O_WRONLY: u32 = 1;
pub const O_RDWR: u32 = 2;
pub const O_CREAT: u32 = 8;
pub const O_TRUNC: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsType {
    Infer,
    File,
    Dir,
}

#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub inode: u32,
    pub size: u32,
    pub mode: u16,
    pub num_links: u16,
}

struct Mount {
    prefix: String,
    fs: Arc<Minix3Fs>,
}

/// One open file: the inode it names, a cached copy of the inode's on-disk
/// fields (refreshed on open, not kept coherent with concurrent writers —
/// same staleness window the source this is grounded on accepts), and a
/// read/write cursor private to this handle.
pub struct File {
    fs: Arc<Minix3Fs>,
    pub inode: u32,
    inode_data: Inode,
    pub path: String,
    pub offset: Mutex<u64>,
    pub flags: u32,
}

impl File {
    pub fn size(&self) -> u32 {
        self.inode_data.size
    }

    pub fn is_dir(&self) -> bool {
        self.inode_data.is_dir()
    }
}

pub struct Vfs {
    mounts: RwLock<Vec<Mount>>,
    open_files: ResourceTable<File>,
}

impl Vfs {
    pub fn new() -> Self {
        let mut table = ResourceTable::new(64);
        table.set_name("OpenFile");
        Self { mounts: RwLock::new(Vec::new()), open_files: table }
    }

    pub fn mount(&self, fs: Arc<Minix3Fs>, path: &str) {
        self.mounts.write().push(Mount { prefix: path.to_string(), fs });
    }

    /// Longest-matching-prefix lookup; mirrors the linear mount-table scan
    /// the source this is grounded on does, since this kernel only ever
    /// mounts a handful of devices.
    fn resolve(&self, path: &str) -> KResult<(Arc<Minix3Fs>, String)> {
        let mounts = self.mounts.read();
        let mut best: Option<&Mount> = None;
        for mount in mounts.iter() {
            if path.starts_with(mount.prefix.as_str()) {
                if best.map(|b| b.prefix.len()).unwrap_or(0) < mount.prefix.len() {
                    best = Some(mount);
                }
            }
        }
        let mount = best.ok_or(KernelError::Configuration(ConfigError::InvalidInode))?;
        let relative = path[mount.prefix.len()..].to_string();
        Ok((mount.fs.clone(), relative))
    }

    pub fn open(&self, path: &str, flags: u32, _mode: u16, ty: VfsType) -> KResult<usize> {
        let (fs, relative) = self.resolve(path)?;

        let inode = match fs.get_inode_from_path(&relative, false)? {
            Some(inode) => inode,
            None => {
                if flags & O_CREAT == 0 {
                    return Err(KernelError::Configuration(ConfigError::InvalidInode));
                }
                self.create(&fs, &relative, ty)?
            }
        };

        let mut inode_data = fs.get_inode(inode)?;
        if flags & O_TRUNC != 0 && inode_data.is_file() {
            inode_data.size = 0;
            fs.put_inode(inode, inode_data)?;
        }

        let file = Arc::new(File {
            fs,
            inode,
            inode_data,
            path: path.to_string(),
            offset: Mutex::new(0),
            flags,
        });

        let id = self.open_files.reserve_entry();
        self.open_files.initialise_entry(id, file);
        Ok(id)
    }

    fn create(&self, fs: &Arc<Minix3Fs>, relative: &str, ty: VfsType) -> KResult<u32> {
        let parent = fs
            .get_inode_from_path(relative, true)?
            .ok_or(KernelError::Configuration(ConfigError::InvalidInode))?;
        let name = relative.rsplit('/').next().unwrap_or(relative);

        let inode = fs.alloc_inode()?;
        let mut data = fs.get_inode(inode)?;
        data.mode = match ty {
            VfsType::Dir => super::minix3::S_IFDIR,
            _ => super::minix3::S_IFREG,
        };
        fs.put_inode(inode, data)?;

        let mut idx = 0;
        while fs.get_dir_entry(parent, idx)?.is_some() {
            idx += 1;
        }
        fs.put_dir_entry(parent, idx, &super::minix3::DirEntry { inode, name: name.to_string() })?;
        Ok(inode)
    }

    pub fn close(&self, fd: usize) {
        self.open_files.remove_entry(fd);
    }

    pub fn read(&self, fd: usize, buf: &mut [u8]) -> KResult<usize> {
        let file = self.open_files.get(fd);
        let mut offset = file.offset.lock();
        let remaining = (file.size() as u64).saturating_sub(*offset) as usize;
        let count = buf.len().min(remaining);
        if count == 0 {
            return Ok(0);
        }
        file.fs.get_data(file.inode, &mut buf[..count], *offset as usize, count)?;
        *offset += count as u64;
        Ok(count)
    }

    pub fn write(&self, fd: usize, buf: &[u8]) -> KResult<usize> {
        let file = self.open_files.get(fd);
        let mut offset = file.offset.lock();
        file.fs.put_data(file.inode, buf, *offset as usize, buf.len())?;
        *offset += buf.len() as u64;
        Ok(buf.len())
    }

    pub fn seek(&self, fd: usize, offset: i64, whence: i32) -> KResult<u64> {
        let file = self.open_files.get(fd);
        let mut cursor = file.offset.lock();
        let base: i64 = match whence {
            SEEK_SET => 0,
            SEEK_CUR => *cursor as i64,
            SEEK_END => file.size() as i64,
            _ => return Err(KernelError::Configuration(ConfigError::InvalidInode)),
        };
        let new_offset = (base + offset).max(0) as u64;
        *cursor = new_offset;
        Ok(new_offset)
    }

    pub fn tell(&self, fd: usize) -> u64 {
        *self.open_files.get(fd).offset.lock()
    }

    pub fn stat(&self, fd: usize) -> Stat {
        let file = self.open_files.get(fd);
        Stat {
            inode: file.inode,
            size: file.inode_data.size,
            mode: file.inode_data.mode,
            num_links: file.inode_data.num_links,
        }
    }

    pub fn link(&self, existing_fd: usize, new_path: &str) -> KResult<()> {
        let file = self.open_files.get(existing_fd);
        let (fs, relative) = self.resolve(new_path)?;
        let parent = fs
            .get_inode_from_path(&relative, true)?
            .ok_or(KernelError::Configuration(ConfigError::InvalidInode))?;
        let name = relative.rsplit('/').next().unwrap_or(&relative);

        let mut idx = 0;
        while fs.get_dir_entry(parent, idx)?.is_some() {
            idx += 1;
        }
        fs.put_dir_entry(parent, idx, &super::minix3::DirEntry { inode: file.inode, name: name.to_string() })?;

        let mut data = fs.get_inode(file.inode)?;
        data.num_links += 1;
        fs.put_inode(file.inode, data)
    }

    pub fn reserve_fd(&self) -> KResult<usize> {
        Ok(self.open_files.reserve_entry())
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    pub static ref VFS: Vfs = Vfs::new();
}
