//! Error types for the heap and its arena providers.

use thiserror::Error;

/// Failure to extend an [`Arena`](crate::Arena).
#[derive(Error, Debug)]
pub enum ArenaError {
  /// The arena would grow past its configured byte limit.
  #[error("arena limit exceeded: requested {requested} more bytes, limit {limit} bytes")]
  LimitExceeded {
    /// Number of extra bytes requested.
    requested: usize,
    /// Maximum size of the arena in bytes.
    limit: usize,
  },

  /// The virtual address range backing the arena could not be reserved.
  #[error("failed to reserve arena address space: {0}")]
  Reserve(#[source] std::io::Error),

  /// Pages inside the reservation could not be made accessible.
  #[error("failed to commit arena pages: {0}")]
  Commit(#[source] std::io::Error),

  /// The global allocator refused to back the arena's storage.
  #[error("out of memory growing arena to {requested} bytes: {source}")]
  OutOfMemory {
    /// Arena length that could not be backed.
    requested: usize,
    #[source]
    source: std::collections::TryReserveError,
  },
}

/// Errors surfaced by [`Heap`](crate::Heap) construction and growth.
#[derive(Error, Debug)]
pub enum HeapError {
  /// The arena could not provide more memory.
  #[error("resource exhausted: {0}")]
  ResourceExhausted(#[from] ArenaError),

  /// A request was too large to express as a block size.
  #[error("requested size {requested} overflows the block size range")]
  SizeOverflow {
    /// The caller's requested payload size.
    requested: usize,
  },

  /// The heap configuration was rejected.
  #[error("invalid heap configuration: {0}")]
  Config(#[from] ConfigError),

  /// A heap must be laid out in an arena nobody has grown yet.
  #[error("arena already holds {len} bytes")]
  ArenaNotEmpty {
    /// Length of the arena that was handed in.
    len: usize,
  },
}

/// Errors produced while loading or validating a [`HeapConfig`](crate::HeapConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
  /// The TOML document could not be parsed.
  #[error("failed to parse heap config: {0}")]
  Parse(#[from] toml::de::Error),

  /// A field holds a value the heap cannot work with.
  #[error("{0}")]
  Invalid(String),
}

/// A broken heap invariant found by the consistency walk.
///
/// Every variant names the header offset of the block at fault. These are
/// never recoverable: they point at caller misuse (double free, overrun into
/// metadata) or an allocator bug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
  /// The prologue sentinel is missing or has the wrong size or flag.
  #[error("malformed prologue at {block}")]
  BadPrologue {
    /// Header offset of the prologue.
    block: usize,
  },

  /// The walk did not end on a zero-size allocated epilogue at the arena end.
  #[error("malformed epilogue at {block}")]
  BadEpilogue {
    /// Header offset where the epilogue was expected.
    block: usize,
  },

  /// A block's payload offset is not aligned.
  #[error("block {block} has a misaligned payload")]
  Misaligned {
    /// Header offset of the block.
    block: usize,
  },

  /// A block's size is not a multiple of the alignment or is below the minimum.
  #[error("block {block} has invalid size {size}")]
  BadSize {
    /// Header offset of the block.
    block: usize,
    /// Size decoded from the header.
    size: usize,
  },

  /// A block extends past the end of the arena.
  #[error("block {block} of size {size} runs past the arena end")]
  OutOfBounds {
    /// Header offset of the block.
    block: usize,
    /// Size decoded from the header.
    size: usize,
  },

  /// Header and footer tags disagree.
  #[error("block {block} header {header:#x} does not match footer {footer:#x}")]
  TagMismatch {
    /// Header offset of the block.
    block: usize,
    /// Raw header word.
    header: usize,
    /// Raw footer word.
    footer: usize,
  },

  /// Two address-adjacent blocks are both free.
  #[error("free blocks {block} and {next} are adjacent")]
  AdjacentFree {
    /// Header offset of the first free block.
    block: usize,
    /// Header offset of its free successor.
    next: usize,
  },

  /// A free-list entry is not the header of a free block.
  #[error("bucket {bucket} links to {block}, which is not a free block")]
  NotFree {
    /// Bucket whose list holds the entry.
    bucket: usize,
    /// Header offset of the entry.
    block: usize,
  },

  /// A free block sits in a bucket whose range does not cover its size.
  #[error("block {block} of size {size} is in bucket {bucket}, expected {expected}")]
  WrongBucket {
    /// Header offset of the block.
    block: usize,
    /// Size of the block.
    size: usize,
    /// Bucket holding the block.
    bucket: usize,
    /// Bucket its size classifies into.
    expected: usize,
  },

  /// A list node's successor does not point back at it.
  #[error("bucket {bucket}: back link of {block} is broken")]
  BrokenLink {
    /// Bucket whose list is damaged.
    bucket: usize,
    /// Header offset of the node whose successor is inconsistent.
    block: usize,
  },

  /// A free block is reachable more than once from the list heads.
  #[error("bucket {bucket} reaches block {block} a second time")]
  Duplicate {
    /// Bucket in which the repeat was seen.
    bucket: usize,
    /// Header offset of the repeated block.
    block: usize,
  },

  /// The address walk and the free lists disagree on the free block count.
  #[error("{in_heap} free blocks in the heap but {in_lists} in the free lists")]
  FreeCountMismatch {
    /// Free blocks seen walking the arena.
    in_heap: usize,
    /// Entries seen walking every bucket.
    in_lists: usize,
  },
}
