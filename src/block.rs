//! In-band block encoding.
//!
//! Blocks are addressed by the offset of their header inside the arena. Every
//! regular block carries the same [`Tag`] in its first and last word, and a
//! free block additionally stores its two free-list links right after the
//! header:
//!
//! ```text
//!   header ─► ┌──────────────────────────────┬───┐
//!             │ size                         │ A │
//!   payload ─►├──────────────────────────────┴───┤
//!             │ next free (free blocks only)     │
//!             ├──────────────────────────────────┤
//!             │ prev free (free blocks only)     │
//!             ├──────────────────────────────────┤
//!             │ ...                              │
//!   footer ─► ├──────────────────────────────┬───┤
//!             │ size                         │ A │
//!             └──────────────────────────────┴───┘
//! ```
//!
//! Nothing here checks bounds beyond slice indexing; the heap only hands in
//! offsets it produced itself.

use std::mem;

use crate::{align, align::ALIGNMENT};

/// Width of a boundary tag and of a free-list link.
pub const WORD: usize = mem::size_of::<usize>();

/// Header plus footer bytes carried by every block.
pub const OVERHEAD: usize = 2 * WORD;

/// Smallest block that can hold both tags and both links.
pub const MIN_BLOCK_SIZE: usize = align!(4 * WORD);

/// Leading padding that puts every payload on an [`ALIGNMENT`] boundary.
pub const PAD: usize = (ALIGNMENT - WORD % ALIGNMENT) % ALIGNMENT;

/// Header offset of the prologue sentinel.
pub const PROLOGUE: usize = PAD;

/// Size of the prologue sentinel: a header and a footer, no payload.
pub const PROLOGUE_SIZE: usize = 2 * WORD;

/// Header offset of the first regular block (or of the epilogue in an empty heap).
pub const FIRST_BLOCK: usize = PROLOGUE + PROLOGUE_SIZE;

/// Bytes needed for the padding and both sentinels.
pub const BOOTSTRAP_SIZE: usize = FIRST_BLOCK + WORD;

/// Encoded "no block" link value. Offset 0 is never a regular block header.
const NIL: usize = 0;

const ALLOCATED_BIT: usize = 0x1;
const SIZE_MASK: usize = !(ALIGNMENT - 1);

/// A packed boundary tag: block size in the high bits, allocated flag in bit 0.
///
/// Sizes are multiples of [`ALIGNMENT`], so the low three bits are free for
/// flags.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Tag(usize);

impl Tag {
  /// Packs `size` and `allocated` into one word.
  pub const fn new(
    size: usize,
    allocated: bool,
  ) -> Self {
    debug_assert!(size & !SIZE_MASK == 0);
    Self(size | allocated as usize)
  }

  /// Reinterprets a raw word read from the arena.
  pub const fn from_word(word: usize) -> Self {
    Self(word)
  }

  /// The raw word as stored in the arena.
  pub const fn to_word(self) -> usize {
    self.0
  }

  /// Total block size, tags included.
  pub const fn size(self) -> usize {
    self.0 & SIZE_MASK
  }

  pub const fn is_allocated(self) -> bool {
    self.0 & ALLOCATED_BIT != 0
  }

  /// The same tag with the allocated flag replaced.
  pub const fn with_allocated(
    self,
    allocated: bool,
  ) -> Self {
    Self::new(self.size(), allocated)
  }
}

/// Which of the two free-list link slots to access.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Link {
  Next,
  Prev,
}

impl Link {
  fn offset(
    self,
    block: usize,
  ) -> usize {
    match self {
      Link::Next => block + WORD,
      Link::Prev => block + 2 * WORD,
    }
  }
}

pub const fn payload_of(block: usize) -> usize {
  block + WORD
}

pub const fn header_of(payload: usize) -> usize {
  payload - WORD
}

pub const fn footer_of(
  block: usize,
  size: usize,
) -> usize {
  block + size - WORD
}

pub const fn next_block(
  block: usize,
  size: usize,
) -> usize {
  block + size
}

/// Offset of the footer of the block that precedes `block` in address order.
pub const fn prev_footer(block: usize) -> usize {
  block - WORD
}

pub const fn prev_block(
  block: usize,
  prev_size: usize,
) -> usize {
  block - prev_size
}

/// Payload bytes available in a block of `size` bytes.
pub const fn usable_size(size: usize) -> usize {
  size - OVERHEAD
}

/// Block size needed to serve a payload of `requested` bytes.
///
/// Returns `None` if the computation overflows.
pub fn adjusted_size(requested: usize) -> Option<usize> {
  let padded = requested.checked_add(OVERHEAD)?;
  let aligned = align::checked_align(padded)?;
  Some(aligned.max(MIN_BLOCK_SIZE))
}

fn read_word(
  mem: &[u8],
  offset: usize,
) -> usize {
  bytemuck::pod_read_unaligned(&mem[offset..offset + WORD])
}

fn write_word(
  mem: &mut [u8],
  offset: usize,
  word: usize,
) {
  mem[offset..offset + WORD].copy_from_slice(bytemuck::bytes_of(&word));
}

pub fn read_tag(
  mem: &[u8],
  offset: usize,
) -> Tag {
  Tag::from_word(read_word(mem, offset))
}

pub fn write_tag(
  mem: &mut [u8],
  offset: usize,
  tag: Tag,
) {
  write_word(mem, offset, tag.to_word());
}

/// Writes `tag` to both the header at `block` and the matching footer.
pub fn write_tags(
  mem: &mut [u8],
  block: usize,
  tag: Tag,
) {
  write_tag(mem, block, tag);
  write_tag(mem, footer_of(block, tag.size()), tag);
}

pub fn read_link(
  mem: &[u8],
  block: usize,
  link: Link,
) -> Option<usize> {
  match read_word(mem, link.offset(block)) {
    NIL => None,
    target => Some(target),
  }
}

pub fn write_link(
  mem: &mut [u8],
  block: usize,
  link: Link,
  target: Option<usize>,
) {
  write_word(mem, link.offset(block), target.unwrap_or(NIL));
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_min_block_scales_with_word() {
    match WORD {
      8 => assert_eq!(MIN_BLOCK_SIZE, 32),
      4 => assert_eq!(MIN_BLOCK_SIZE, 16),
      _ => {}
    }
    assert_eq!(MIN_BLOCK_SIZE % ALIGNMENT, 0);
  }

  #[test]
  fn test_first_payload_is_aligned() {
    assert_eq!(payload_of(FIRST_BLOCK) % ALIGNMENT, 0);
    assert_eq!(BOOTSTRAP_SIZE % ALIGNMENT, 0);
  }

  #[test]
  fn test_tag_packing() {
    let tag = Tag::new(4096, true);
    assert_eq!(tag.size(), 4096);
    assert!(tag.is_allocated());

    let free = tag.with_allocated(false);
    assert_eq!(free.size(), 4096);
    assert!(!free.is_allocated());
    assert_eq!(free.to_word(), 4096);
    assert_eq!(Tag::from_word(tag.to_word()), tag);
  }

  #[test]
  fn test_navigation_is_symmetric() {
    let block = FIRST_BLOCK;
    let size = 64;

    let next = next_block(block, size);
    assert_eq!(next, block + 64);
    assert_eq!(prev_footer(next), footer_of(block, size));
    assert_eq!(prev_block(next, size), block);
    assert_eq!(header_of(payload_of(block)), block);
  }

  #[test]
  fn test_adjusted_size() {
    assert_eq!(adjusted_size(1), Some(MIN_BLOCK_SIZE));
    assert_eq!(adjusted_size(100), Some(align!(100 + OVERHEAD)));
    assert_eq!(adjusted_size(usize::MAX - 1), None);

    for requested in 1..512 {
      let size = adjusted_size(requested).unwrap();
      assert!(usable_size(size) >= requested);
      assert_eq!(size % ALIGNMENT, 0);
    }
  }

  #[test]
  fn test_tags_and_links_roundtrip_through_memory() {
    let mut mem = vec![0u8; 256];
    let block = FIRST_BLOCK;
    let tag = Tag::new(96, false);

    write_tags(&mut mem, block, tag);
    assert_eq!(read_tag(&mem, block), tag);
    assert_eq!(read_tag(&mem, footer_of(block, 96)), tag);

    write_link(&mut mem, block, Link::Next, Some(160));
    write_link(&mut mem, block, Link::Prev, None);
    assert_eq!(read_link(&mem, block, Link::Next), Some(160));
    assert_eq!(read_link(&mem, block, Link::Prev), None);
  }
}
