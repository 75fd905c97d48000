//! # rallocator - A Custom Memory Allocator Library
//!
//! This crate provides a **segregated-fit heap allocator** with boundary-tag
//! coalescing. It manages one contiguous, growable [`Arena`] and hands out
//! 8-byte-aligned payloads from it.
//!
//! ## Overview
//!
//! The heap is a sequence of blocks tiling the arena, bracketed by two
//! permanently allocated sentinels:
//!
//! ```text
//!   Arena Layout:
//!
//!   ┌─────┬──────────┬────────┬────────┬──────────┬────────┬──────────┐
//!   │ pad │ prologue │ A1     │ F1     │ A2       │ F2     │ epilogue │
//!   │     │ (alloc)  │ (used) │ (free) │ (used)   │ (free) │ size 0   │
//!   └─────┴──────────┴────────┴────────┴──────────┴────────┴──────────┘
//!   ▲                                                                 ▲
//!   offset 0                                                     arena end
//!                                                             (grows here)
//! ```
//!
//! Free blocks are never adjacent: freeing a block merges it with any free
//! neighbour on the spot. Free blocks are threaded into one of ten
//! size-class lists, searched first-fit from the smallest class that can
//! satisfy a request.
//!
//! ## Crate Structure
//!
//! ```text
//!   rallocator
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── arena      - Arena trait, VecArena, MmapArena
//!   ├── block      - Boundary tag codec and block navigation
//!   ├── free_list  - Segregated free lists
//!   ├── heap       - Heap: allocate, free, reallocate
//!   ├── check      - Heap consistency walk
//!   ├── stats      - Occupancy report
//!   ├── config     - HeapConfig
//!   └── error      - Error types
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rallocator::{Heap, HeapConfig};
//!
//! let mut heap = Heap::with_config(HeapConfig::default()).unwrap();
//!
//! let ptr = heap.allocate(64).unwrap();
//! heap.payload_mut(ptr)[..5].copy_from_slice(b"hello");
//!
//! let ptr = heap.reallocate(Some(ptr), 256).unwrap();
//! assert_eq!(&heap.payload(ptr)[..5], b"hello");
//!
//! heap.free(ptr);
//! heap.validate().unwrap();
//! ```
//!
//! ## How It Works
//!
//! Every block stores its size and allocated bit in a one-word header and
//! again in a one-word footer. The footer lets a block find its lower
//! neighbour in O(1), which is what makes immediate coalescing cheap:
//!
//! ```text
//!   Single Block:
//!   ┌──────────┬────────────────────────────────────┬──────────┐
//!   │  header  │              payload               │  footer  │
//!   │ size | A │  (free: next/prev free-list links) │ size | A │
//!   └──────────┴────────────────────────────────────┴──────────┘
//!              ▲
//!              └── HeapPtr returned to the caller
//! ```
//!
//! A request is rounded up to a block size, a fitting free block is split
//! if the leftover can stand on its own, and when nothing fits the arena is
//! extended by at least [`HeapConfig::chunk_size`] bytes.
//!
//! All references between blocks are arena offsets, never raw addresses, so
//! the arena may move its storage when it grows.
//!
//! ## Features
//!
//! - **Segregated free lists**: ten power-of-two size classes, LIFO insertion
//! - **Immediate coalescing**: boundary tags on every block
//! - **In-place reallocate**: shrink, absorb a free successor, or extend the arena
//! - **Consistency checker**: [`Heap::validate`] and [`Heap::check_heap`]
//!
//! ## Limitations
//!
//! - **Single-threaded**: wrap the heap in a `Mutex` to share it
//! - **No compaction**: blocks never move once allocated
//! - **No hardening**: freeing a foreign or already freed pointer corrupts the heap

pub mod align;
pub mod arena;
pub mod block;
mod check;
pub mod config;
pub mod error;
pub mod free_list;
mod heap;
mod stats;

pub use align::ALIGNMENT;
#[cfg(unix)]
pub use arena::MmapArena;
pub use arena::{Arena, VecArena};
pub use config::HeapConfig;
pub use error::{ArenaError, ConfigError, HeapError, InvariantViolation};
pub use heap::{Blocks, Heap, HeapPtr};
pub use stats::HeapStats;
