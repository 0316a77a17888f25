//! Filesystem stack: the on-disk Minix3 format ([`minix3`]) and the
//! process-facing handle table built on top of it ([`vfs`]). Dangling in
//! the teacher (`pub mod fs;` with no backing files); grounded entirely in
//! `original_source/src/minix3.c`/`minix3.h` and `original_source/src/fs.c`.

pub mod minix3;
pub mod vfs;
