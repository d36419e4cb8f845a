//! A concurrent, thread-caching memory allocator.
//!
//! Each worker thread owns a local heap it allocates from without taking
//! any cross-thread lock. A local heap that cannot satisfy a request
//! migrates a batch of free extents from a shared global heap, growing
//! the batch size on repeated misses; if the global heap is itself
//! exhausted, the request escapes to the OS allocator untracked. A
//! background reclaimer periodically moves idle extents from local heaps
//! back to the global heap, and from the global heap back to the OS, so
//! that memory drifts back to where it is cheaply reused.
//!
//! # Usage
//!
//! ```ignore
//! let alloc = rtmalloc::Allocator::init(4)?;
//! let ptr = alloc.allocate(1024);
//! alloc.free(ptr);
//! alloc.shutdown();
//! ```

pub mod alloc_path;
pub mod config;
pub mod descriptor;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod free_path;
pub mod global;
pub mod heap;
pub mod lifecycle;
pub mod local;
pub mod macros;
pub mod platform;
pub mod reclaim;
pub mod stats;
pub mod sync;

pub use lifecycle::{Allocator, InitError};
