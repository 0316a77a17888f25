//! Generic containers shared across the kernel. Grounded in
//! `original_source/util/`'s Map/List/RingBuffer/RBTree requirement, but
//! parameterized on the element type rather than C's duck-typed `uint64_t`
//! slots, and left undecorated by synchronization: callers wrap these in
//! the same `spin::Mutex`/`RwLock` pattern used everywhere else in the
//! kernel (see `kernel::mm::KERNEL_ADDRESS_SPACE`, `kernel::cpu::CPUS`).

pub mod list;
pub mod map;
pub mod rbtree;
pub mod ring;

pub use list::List;
pub use map::Map;
pub use rbtree::RbTree;
pub use ring::{OverflowPolicy, RingBuffer};
