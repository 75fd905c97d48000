use std::fmt;

use crate::free_list::NUM_BUCKETS;

/// Occupancy figures gathered by a full heap walk.
///
/// Produced by [`Heap::validate`](crate::Heap::validate); sentinels are not
/// counted as blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Arena size in bytes, sentinels and padding included.
  pub arena_bytes: usize,
  pub allocated_blocks: usize,
  /// Bytes in allocated blocks, tags included.
  pub allocated_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  /// Size of the largest free block, 0 if there is none.
  pub largest_free: usize,
  /// Number of free blocks filed in each bucket.
  pub bucket_counts: [usize; NUM_BUCKETS],
}

impl HeapStats {
  pub(crate) fn new(arena_bytes: usize) -> Self {
    Self {
      arena_bytes,
      ..Self::default()
    }
  }

  pub(crate) fn record_allocated(
    &mut self,
    size: usize,
  ) {
    self.allocated_blocks += 1;
    self.allocated_bytes += size;
  }

  pub(crate) fn record_free(
    &mut self,
    size: usize,
  ) {
    self.free_blocks += 1;
    self.free_bytes += size;
    self.largest_free = self.largest_free.max(size);
  }

  /// Share of the arena held by allocated blocks, in `[0, 1]`.
  pub fn utilization(&self) -> f64 {
    if self.arena_bytes == 0 {
      return 0.0;
    }
    self.allocated_bytes as f64 / self.arena_bytes as f64
  }

  /// How much of the free space is unusable for a single request of
  /// `largest_free` bytes: `1 - largest_free / free_bytes`.
  pub fn fragmentation(&self) -> f64 {
    if self.free_bytes == 0 {
      return 0.0;
    }
    1.0 - self.largest_free as f64 / self.free_bytes as f64
  }
}

impl fmt::Display for HeapStats {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "arena {} B, {} allocated ({} B), {} free ({} B, largest {} B), utilization {:.1}%",
      self.arena_bytes,
      self.allocated_blocks,
      self.allocated_bytes,
      self.free_blocks,
      self.free_bytes,
      self.largest_free,
      self.utilization() * 100.0,
    )
  }
}
