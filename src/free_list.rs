//! Segregated free lists.
//!
//! Free blocks are kept in [`NUM_BUCKETS`] doubly linked lists, one per size
//! band. Bands double from [`MIN_BLOCK_SIZE`]; the last one catches
//! everything larger:
//!
//! ```text
//!   bucket:   0        1          2               8            9
//!   sizes:  ≤ MIN   ≤ 2·MIN    ≤ 4·MIN   ...   ≤ 256·MIN    > 256·MIN
//! ```
//!
//! Only the list heads live here. The links themselves are stored inside the
//! free blocks (see [`block`](crate::block)), so every method takes the
//! arena's bytes.

use tracing::trace;

use crate::block::{self, Link, MIN_BLOCK_SIZE};

/// Number of size classes.
pub const NUM_BUCKETS: usize = 10;

/// Maps a block size to the bucket whose band contains it.
///
/// Total over `[MIN_BLOCK_SIZE, ∞)`, and every size lands in exactly one
/// bucket. Sizes below the minimum never name a real block and fall into
/// bucket 0.
pub fn classify(size: usize) -> usize {
  (0..NUM_BUCKETS - 1)
    .find(|&bucket| size <= upper_bound(bucket))
    .unwrap_or(NUM_BUCKETS - 1)
}

/// Largest size held by `bucket`, or `usize::MAX` for the catch-all.
pub fn upper_bound(bucket: usize) -> usize {
  if bucket + 1 >= NUM_BUCKETS {
    usize::MAX
  } else {
    MIN_BLOCK_SIZE << bucket
  }
}

/// Heads of the per-class free lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FreeLists {
  heads: [Option<usize>; NUM_BUCKETS],
}

impl FreeLists {
  pub fn new() -> Self {
    Self::default()
  }

  /// First block of `bucket`'s list.
  pub fn head(
    &self,
    bucket: usize,
  ) -> Option<usize> {
    self.heads[bucket]
  }

  /// Pushes `block` onto the front of the list for its size.
  ///
  /// The block's size must already be final; its link words are overwritten.
  pub fn insert(
    &mut self,
    mem: &mut [u8],
    block: usize,
  ) {
    let size = block::read_tag(mem, block).size();
    let bucket = classify(size);
    let head = self.heads[bucket];

    block::write_link(mem, block, Link::Next, head);
    block::write_link(mem, block, Link::Prev, None);
    if let Some(head) = head {
      block::write_link(mem, head, Link::Prev, Some(block));
    }
    self.heads[bucket] = Some(block);

    trace!(block, size, bucket, "free list insert");
  }

  /// Unlinks `block` from the list it was inserted into.
  ///
  /// The block's header must still hold the size it was inserted with, and
  /// the block must currently be in a list.
  pub fn remove(
    &mut self,
    mem: &mut [u8],
    block: usize,
  ) {
    let size = block::read_tag(mem, block).size();
    let bucket = classify(size);
    let next = block::read_link(mem, block, Link::Next);
    let prev = block::read_link(mem, block, Link::Prev);

    match prev {
      Some(prev) => block::write_link(mem, prev, Link::Next, next),
      None => self.heads[bucket] = next,
    }
    if let Some(next) = next {
      block::write_link(mem, next, Link::Prev, prev);
    }

    trace!(block, size, bucket, "free list remove");
  }

  /// Finds a free block of at least `min_size` bytes.
  ///
  /// Buckets are scanned from the one `min_size` classifies into upward and
  /// each list is searched first-fit. This is not best-fit: a larger block
  /// early in a list wins over a tighter one further along.
  pub fn find_fit(
    &self,
    mem: &[u8],
    min_size: usize,
  ) -> Option<usize> {
    (classify(min_size)..NUM_BUCKETS).find_map(|bucket| {
      self
        .iter(mem, bucket)
        .find(|&block| block::read_tag(mem, block).size() >= min_size)
    })
  }

  /// Walks `bucket`'s list from its head.
  pub fn iter<'a>(
    &self,
    mem: &'a [u8],
    bucket: usize,
  ) -> Iter<'a> {
    Iter {
      mem,
      cursor: self.heads[bucket],
    }
  }
}

/// Iterator over the blocks of one free list, see [`FreeLists::iter`].
pub struct Iter<'a> {
  mem: &'a [u8],
  cursor: Option<usize>,
}

impl Iterator for Iter<'_> {
  type Item = usize;

  fn next(&mut self) -> Option<usize> {
    let block = self.cursor?;
    self.cursor = block::read_link(self.mem, block, Link::Next);
    Some(block)
  }
}
