//! Heap consistency walk.
//!
//! [`Heap::validate`] walks the arena from the prologue to the epilogue and
//! then every free list, checking:
//!
//! - sentinels: the prologue and epilogue are in place and allocated;
//! - every block: aligned payload, legal size, inside the arena, header
//!   equal to footer;
//! - coalescing: no two neighbouring free blocks;
//! - free lists: each entry is a free block of the walk, filed in the
//!   bucket its size maps to, with intact back links, listed exactly once,
//!   and every free block of the walk is listed.
//!
//! [`Heap::check_heap`] is the debug-build form: it logs and aborts on the
//! first violation.

use std::collections::HashSet;

use tracing::{error, info};

use crate::{
  align::ALIGNMENT,
  arena::Arena,
  block::{self, FIRST_BLOCK, Link, MIN_BLOCK_SIZE, PROLOGUE, PROLOGUE_SIZE, Tag, WORD},
  error::InvariantViolation,
  free_list::{NUM_BUCKETS, classify},
  heap::Heap,
  stats::HeapStats,
};

/// Flag bits other than "allocated" are never set on a valid tag.
const RESERVED_BITS: usize = (ALIGNMENT - 1) & !0x1;

impl<A: Arena> Heap<A> {
  /// Checks every heap invariant, returning occupancy figures on success.
  pub fn validate(&self) -> Result<HeapStats, InvariantViolation> {
    let mem = self.arena().bytes();
    let mut stats = HeapStats::new(mem.len());

    let free_blocks = walk_blocks(mem, &mut stats)?;
    walk_free_lists(self, mem, &free_blocks, &mut stats)?;

    Ok(stats)
  }

  /// Validates the heap and aborts the process on the first violation.
  ///
  /// With `verbose` set, every block and every free list is logged at
  /// `info` level first.
  pub fn check_heap(
    &self,
    verbose: bool,
  ) {
    if verbose {
      self.dump();
    }

    match self.validate() {
      Ok(stats) => {
        if verbose {
          info!(%stats, "heap consistent");
        }
      }
      Err(violation) => {
        error!(%violation, "heap invariant violated");
        eprintln!("heap invariant violated: {violation}");
        std::process::abort();
      }
    }
  }

  /// Logs the block map and the content of every free list.
  pub fn dump(&self) {
    for (block, tag) in self.blocks() {
      info!(
        block,
        payload = block::payload_of(block),
        size = tag.size(),
        allocated = tag.is_allocated(),
        "block"
      );
    }

    let mem = self.arena().bytes();
    for bucket in 0..NUM_BUCKETS {
      let entries: Vec<_> = self.free_lists().iter(mem, bucket).collect();
      if !entries.is_empty() {
        info!(bucket, ?entries, "free list");
      }
    }
  }
}

/// Address-order walk. Returns the header offsets of all free blocks.
fn walk_blocks(
  mem: &[u8],
  stats: &mut HeapStats,
) -> Result<HashSet<usize>, InvariantViolation> {
  let len = mem.len();
  if len < FIRST_BLOCK + WORD {
    return Err(InvariantViolation::BadPrologue { block: PROLOGUE });
  }

  let prologue = Tag::new(PROLOGUE_SIZE, true);
  if block::read_tag(mem, PROLOGUE) != prologue || block::read_tag(mem, PROLOGUE + WORD) != prologue {
    return Err(InvariantViolation::BadPrologue { block: PROLOGUE });
  }

  let epilogue = len - WORD;
  let mut free_blocks = HashSet::new();
  let mut prev_free = None;
  let mut block = FIRST_BLOCK;

  loop {
    if block > epilogue {
      return Err(InvariantViolation::BadEpilogue { block });
    }

    let tag = block::read_tag(mem, block);
    let size = tag.size();

    if size == 0 {
      if block != epilogue || !tag.is_allocated() {
        return Err(InvariantViolation::BadEpilogue { block });
      }
      break;
    }

    let payload = block::payload_of(block);
    if payload % ALIGNMENT != 0 || mem.as_ptr().wrapping_add(payload) as usize % ALIGNMENT != 0 {
      return Err(InvariantViolation::Misaligned { block });
    }

    if size < MIN_BLOCK_SIZE || tag.to_word() & RESERVED_BITS != 0 {
      return Err(InvariantViolation::BadSize { block, size });
    }

    if size > epilogue - block {
      return Err(InvariantViolation::OutOfBounds { block, size });
    }

    let footer = block::read_tag(mem, block::footer_of(block, size));
    if footer != tag {
      return Err(InvariantViolation::TagMismatch {
        block,
        header: tag.to_word(),
        footer: footer.to_word(),
      });
    }

    if tag.is_allocated() {
      stats.record_allocated(size);
      prev_free = None;
    } else {
      if let Some(prev) = prev_free {
        return Err(InvariantViolation::AdjacentFree { block: prev, next: block });
      }
      stats.record_free(size);
      free_blocks.insert(block);
      prev_free = Some(block);
    }

    block = block::next_block(block, size);
  }

  Ok(free_blocks)
}

fn walk_free_lists<A: Arena>(
  heap: &Heap<A>,
  mem: &[u8],
  free_blocks: &HashSet<usize>,
  stats: &mut HeapStats,
) -> Result<(), InvariantViolation> {
  let mut seen = HashSet::with_capacity(free_blocks.len());

  for bucket in 0..NUM_BUCKETS {
    let mut prev = None;
    let mut cursor = heap.free_lists().head(bucket);

    while let Some(block) = cursor {
      if !free_blocks.contains(&block) {
        return Err(InvariantViolation::NotFree { bucket, block });
      }
      if !seen.insert(block) {
        return Err(InvariantViolation::Duplicate { bucket, block });
      }

      let size = block::read_tag(mem, block).size();
      let expected = classify(size);
      if expected != bucket {
        return Err(InvariantViolation::WrongBucket {
          block,
          size,
          bucket,
          expected,
        });
      }

      if block::read_link(mem, block, Link::Prev) != prev {
        return Err(InvariantViolation::BrokenLink {
          bucket,
          block: prev.unwrap_or(block),
        });
      }

      stats.bucket_counts[bucket] += 1;
      prev = Some(block);
      cursor = block::read_link(mem, block, Link::Next);
    }
  }

  if seen.len() != free_blocks.len() {
    return Err(InvariantViolation::FreeCountMismatch {
      in_heap: free_blocks.len(),
      in_lists: seen.len(),
    });
  }

  Ok(())
}
