//! Per-thread object slab allocator with epoch-based safe memory
//! reclamation.
//!
//! Lock-free and fine-grained concurrent structures unlink nodes that
//! other threads may still be reading. This crate defers the physical
//! reuse of such nodes until no concurrent thread can possibly observe
//! them, without hazard pointers on every load: each thread owns a
//! [`SlabAllocator`] for its object class, every participating thread
//! joins a shared [`EpochDomain`] and advances a per-thread epoch around
//! its operations, and freed objects become reusable only once two
//! successive snapshots of all epochs prove that every thread has made
//! progress in between.
//!
//! ```
//! use epoch_slab::{EpochDomain, SlabAllocator};
//!
//! let domain = EpochDomain::new();
//! let mut alloc = SlabAllocator::new(&domain, 64);
//!
//! let node = alloc.alloc(64);
//! // ... link the node into a shared structure, later unlink it ...
//! unsafe { alloc.free(node) };
//! ```
//!
//! Chunks are carved from a [`RegionProvider`]: the ordinary heap
//! ([`HeapRegion`]) or a file-backed pool (`MappedPool`) for
//! persistent-memory-style deployments.

mod alloc;
mod chunk;
mod free_set;
mod region;
mod registry;
mod released;
mod state;
mod sync;

pub use alloc::{AdvanceOn, AllocStats, SlabAllocator, SlabAllocatorBuilder};
pub use region::{HeapRegion, RegionProvider};
#[cfg(unix)]
pub use region::MappedPool;
pub use registry::{EpochDomain, EpochSnapshot};
pub use state::{
    CACHE_LINE_SIZE, DEFAULT_MEM_SIZE, GC_FREE_SET_SIZE, GC_RLSE_SET_SIZE, MAX_CHUNK_SIZE,
};

#[cfg(all(test, not(feature = "loom")))]
mod tests;
