//! Physical page allocator.
//!
//! A fixed region of physical memory is split into a bookkeeping bitmap (two
//! bits per page: `TAKEN` and `LAST`) at its base, followed by page-aligned
//! allocatable slots. `alloc_n` does a linear scan for `n` consecutive
//! cleared pages, marks all of them taken and the final one `LAST`; `free`
//! starts at the given page and clears `TAKEN`/`LAST` until it clears a page
//! that was marked `LAST` — so the caller only needs the pointer it was
//! handed, not the run length, to free a whole allocation. This matches the
//! two-bit taken/last scheme used to bootstrap the kernel's own physical
//! heap before any Rust container is available, rather than a `Vec` of
//! per-page allocation-size counters.

use lazy_static::lazy_static;
use spin::mutex::Mutex;

use crate::{
    info,
    mm::{
        arithmetics::PG_ROUND_UP,
        layout::{__heap_size, __heap_start, PAGE_SIZE},
        memory::PhysAddr,
    },
};

const TAKEN: u8 = 0b01;
const LAST: u8 = 0b10;

#[derive(Clone, Copy, PartialEq, Eq)]
enum PageFlag {
    Free,
    Taken,
    TakenLast,
}

impl From<u8> for PageFlag {
    fn from(bits: u8) -> Self {
        if bits & TAKEN == 0 {
            PageFlag::Free
        } else if bits & LAST != 0 {
            PageFlag::TakenLast
        } else {
            PageFlag::Taken
        }
    }
}

pub struct FrameAllocator {
    /// one descriptor byte per allocatable page, living in the first
    /// `n_pages` bytes rounded up to a page boundary.
    bitmap: &'static mut [u8],
    /// first byte past the bookkeeping bitmap: where allocatable pages begin.
    alloc_base: usize,
    n_pages: usize,
}

impl FrameAllocator {
    /// `region_base`/`region_size` describe the whole physical range this
    /// allocator owns, bookkeeping bitmap included.
    pub fn new(region_base: usize, region_size: usize) -> Self {
        // reserve ceil(region_size / PAGE_SIZE) bytes for the bitmap itself,
        // then round up to a whole number of pages so allocatable pages
        // stay page-aligned.
        let max_pages = region_size / PAGE_SIZE;
        let bitmap_bytes = PG_ROUND_UP(max_pages) ;
        let alloc_base = region_base + bitmap_bytes;
        let n_pages = (region_base + region_size - alloc_base) / PAGE_SIZE;

        let bitmap = unsafe {
            core::slice::from_raw_parts_mut(region_base as *mut u8, n_pages)
        };
        for b in bitmap.iter_mut() {
            *b = 0;
        }

        Self {
            bitmap,
            alloc_base,
            n_pages,
        }
    }

    fn flag(&self, idx: usize) -> PageFlag {
        PageFlag::from(self.bitmap[idx])
    }

    /// Linear scan for `n` consecutive free pages; marks them taken on
    /// success. Returns the base physical address, or `None` if no run of
    /// that length exists (callers must handle exhaustion).
    pub fn alloc_n(&mut self, n: usize) -> Option<usize> {
        if n == 0 || n > self.n_pages {
            return None;
        }
        let mut run_start = None;
        let mut run_len = 0;
        for i in 0..self.n_pages {
            if self.flag(i) == PageFlag::Free {
                if run_start.is_none() {
                    run_start = Some(i);
                }
                run_len += 1;
                if run_len == n {
                    let start = run_start.unwrap();
                    for j in start..start + n - 1 {
                        self.bitmap[j] = TAKEN;
                    }
                    self.bitmap[start + n - 1] = TAKEN | LAST;
                    return Some(self.alloc_base + start * PAGE_SIZE);
                }
            } else {
                run_start = None;
                run_len = 0;
            }
        }
        None
    }

    /// Free the allocation starting at `addr`. Walks forward clearing
    /// `TAKEN`/`LAST` bits until it clears a page previously marked `LAST` —
    /// the caller does not need to remember how many pages it asked for.
    pub fn free(&mut self, addr: usize) {
        let mut idx = (addr - self.alloc_base) / PAGE_SIZE;
        assert!(idx < self.n_pages, "FrameAllocator::free: out of range");
        loop {
            let was_last = self.flag(idx) == PageFlag::TakenLast;
            assert_ne!(
                self.flag(idx),
                PageFlag::Free,
                "FrameAllocator::free: double free at page {}",
                idx
            );
            self.bitmap[idx] = 0;
            if was_last {
                break;
            }
            idx += 1;
            assert!(idx < self.n_pages, "FrameAllocator::free: ran off the end without a LAST page");
        }
    }

    pub fn count_free(&self) -> usize {
        (0..self.n_pages)
            .filter(|&i| self.flag(i) == PageFlag::Free)
            .count()
    }

    pub fn count_taken(&self) -> usize {
        self.n_pages - self.count_free()
    }
}

lazy_static! {
    pub static ref FRAME_ALLOCATOR: Mutex<FrameAllocator> =
        Mutex::new(FrameAllocator::new(__heap_start(), __heap_size()));
}

pub fn init() {
    FRAME_ALLOCATOR.lock();
    info!("Frame allocator initialised");
}

pub fn allocate_one_frame() -> PhysAddr {
    let pa = FRAME_ALLOCATOR
        .lock()
        .alloc_n(1)
        .expect("allocate_one_frame: out of physical pages");
    info!(
        "frame_allocator::allocate_one_frame: allocated frame at pa {:?}",
        pa as *const usize
    );
    PhysAddr::new(pa)
}

pub fn allocate_frames(n: usize) -> Option<PhysAddr> {
    FRAME_ALLOCATOR.lock().alloc_n(n).map(PhysAddr::new)
}

pub fn deallocate_one_frame(pa: PhysAddr) {
    let pa = pa.as_usize();
    info!(
        "frame_allocator::deallocate_one_frame: deallocated frame at pa {:?}",
        pa as *const usize
    );
    FRAME_ALLOCATOR.lock().free(pa);
}

#[cfg(test)]
mod tests {
    // These exercise the pure bitmap logic against a host-allocated buffer
    // rather than the real physical heap, matching `SPEC_FULL.md`'s
    // host-testable-pure-logic convention.
    use super::*;

    fn make_test_allocator(n_pages: usize) -> (Vec<u8>, FrameAllocator) {
        let region_size = PG_ROUND_UP(n_pages) + n_pages * PAGE_SIZE;
        let mut region = vec![0u8; region_size];
        let base = region.as_mut_ptr() as usize;
        let allocator = FrameAllocator::new(base, region_size);
        (region, allocator)
    }

    #[test]
    fn alloc_free_cycle_conserves_pages() {
        let (_region, mut a) = make_test_allocator(32);
        let total = a.count_free();
        let p10 = a.alloc_n(10).unwrap();
        let p5 = a.alloc_n(5).unwrap();
        assert_eq!(a.count_free(), total - 15);
        a.free(p10);
        // an alloc-8 should now be served by splitting the freed 10-run
        let p8 = a.alloc_n(8).unwrap();
        assert_eq!(p8, p10);
        assert_eq!(a.count_free() + a.count_taken(), total);
        a.free(p8);
        a.free(p5);
        assert_eq!(a.count_free(), total);
    }

    #[test]
    fn exhaustion_returns_none() {
        let (_region, mut a) = make_test_allocator(4);
        assert!(a.alloc_n(5).is_none());
    }
}
