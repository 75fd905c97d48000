use tracing::{debug, warn};

use crate::{
  align,
  arena::{Arena, VecArena},
  block::{self, BOOTSTRAP_SIZE, FIRST_BLOCK, MIN_BLOCK_SIZE, PAD, PROLOGUE, PROLOGUE_SIZE, Tag, WORD},
  config::HeapConfig,
  error::HeapError,
  free_list::FreeLists,
};

/// A payload handed out by a [`Heap`].
///
/// This is the payload's offset inside the heap's arena, so it stays valid
/// when the arena relocates its storage. It is only meaningful for the heap
/// that returned it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct HeapPtr(usize);

impl HeapPtr {
  fn from_block(block: usize) -> Self {
    Self(block::payload_of(block))
  }

  fn block(self) -> usize {
    block::header_of(self.0)
  }

  /// Offset of the first payload byte from the start of the arena.
  pub fn offset(self) -> usize {
    self.0
  }
}

/// A segregated-fit heap with boundary-tag coalescing.
///
/// All metadata lives inside the arena. The heap itself only holds the arena,
/// the heads of its free lists, and its configuration.
pub struct Heap<A: Arena = VecArena> {
  arena: A,
  free_lists: FreeLists,
  config: HeapConfig,
}

impl Heap<VecArena> {
  /// Builds a heap over a [`VecArena`] limited to `config.max_heap_bytes`.
  pub fn with_config(config: HeapConfig) -> Result<Self, HeapError> {
    let arena = VecArena::new(config.max_heap_bytes);
    Self::new(arena, config)
  }
}

impl<A: Arena> Heap<A> {
  /// Lays out the sentinels in an empty `arena` and extends it by one chunk.
  ///
  /// Fails only if the configuration is invalid or the arena cannot grow.
  pub fn new(
    arena: A,
    config: HeapConfig,
  ) -> Result<Self, HeapError> {
    config.validate()?;
    if !arena.is_empty() {
      return Err(HeapError::ArenaNotEmpty { len: arena.len() });
    }

    let mut heap = Self {
      arena,
      free_lists: FreeLists::new(),
      config,
    };
    heap.initialize()?;
    Ok(heap)
  }

  /// Reassembles a heap from raw parts without any checks, so tests can
  /// hand the checker a damaged heap.
  #[cfg(test)]
  pub(crate) fn from_parts(
    arena: A,
    free_lists: FreeLists,
    config: HeapConfig,
  ) -> Self {
    Self {
      arena,
      free_lists,
      config,
    }
  }

  fn initialize(&mut self) -> Result<(), HeapError> {
    self.arena.grow(BOOTSTRAP_SIZE)?;

    let mem = self.arena.bytes_mut();
    mem[..PAD].fill(0);
    block::write_tags(mem, PROLOGUE, Tag::new(PROLOGUE_SIZE, true));
    block::write_tag(mem, FIRST_BLOCK, Tag::new(0, true));

    self.extend(self.config.chunk_size)?;

    debug!(arena_len = self.arena.len(), "heap initialized");
    self.debug_check();
    Ok(())
  }

  /// Allocates a payload of at least `size` bytes, aligned to
  /// [`ALIGNMENT`](crate::ALIGNMENT).
  ///
  /// Returns `None` for `size == 0` (without touching the heap) and when the
  /// arena cannot grow; in the latter case existing allocations are left
  /// intact.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<HeapPtr> {
    let ptr = match self.try_allocate(size) {
      Ok(ptr) => ptr,
      Err(err) => {
        warn!(size, %err, "allocation failed");
        None
      }
    };
    self.debug_check();
    ptr
  }

  /// Like [`allocate`](Self::allocate), but reports why an allocation failed.
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<HeapPtr>, HeapError> {
    if size == 0 {
      return Ok(None);
    }

    let adjusted = block::adjusted_size(size).ok_or(HeapError::SizeOverflow { requested: size })?;

    let block = match self.free_lists.find_fit(self.arena.bytes(), adjusted) {
      Some(block) => block,
      None => self.extend(adjusted.max(self.config.chunk_size))?,
    };

    self.place(block, adjusted);
    Ok(Some(HeapPtr::from_block(block)))
  }

  /// Returns a payload to the heap.
  ///
  /// `ptr` must have come from this heap and must not have been freed since.
  /// Breaking that rule corrupts the heap; [`validate`](Self::validate) may
  /// or may not notice.
  pub fn free(
    &mut self,
    ptr: HeapPtr,
  ) {
    let block = ptr.block();
    let mem = self.arena.bytes_mut();
    let tag = block::read_tag(mem, block);

    block::write_tags(mem, block, tag.with_allocated(false));
    self.coalesce(block);
    self.debug_check();
  }

  /// Resizes a payload, moving it if needed.
  ///
  /// - `ptr == None` behaves like [`allocate`](Self::allocate).
  /// - `size == 0` frees `ptr` and returns `None`.
  /// - Otherwise the first `min(old usable size, size)` bytes are preserved.
  ///   On failure `None` is returned and `ptr` is still valid.
  ///
  /// With [`HeapConfig::realloc_in_place`] set, shrinking always happens in
  /// place and growing first tries to absorb the following block or to
  /// extend the arena when the block is the last one.
  pub fn reallocate(
    &mut self,
    ptr: Option<HeapPtr>,
    size: usize,
  ) -> Option<HeapPtr> {
    let Some(ptr) = ptr else {
      return self.allocate(size);
    };

    if size == 0 {
      self.free(ptr);
      return None;
    }

    if self.config.realloc_in_place && self.resize_in_place(ptr, size) {
      debug!(offset = ptr.offset(), size, "reallocated in place");
      self.debug_check();
      return Some(ptr);
    }

    let moved = self.allocate(size)?;
    let copy = self.usable_size(ptr).min(size);
    let src = ptr.offset();
    self
      .arena
      .bytes_mut()
      .copy_within(src..src + copy, moved.offset());
    self.free(ptr);

    debug!(from = src, to = moved.offset(), copy, "reallocated by copy");
    Some(moved)
  }

  /// Number of payload bytes usable through `ptr`; at least the size it was
  /// allocated with.
  pub fn usable_size(
    &self,
    ptr: HeapPtr,
  ) -> usize {
    block::usable_size(block::read_tag(self.arena.bytes(), ptr.block()).size())
  }

  /// The payload behind `ptr`, [`usable_size`](Self::usable_size) bytes long.
  pub fn payload(
    &self,
    ptr: HeapPtr,
  ) -> &[u8] {
    let len = self.usable_size(ptr);
    &self.arena.bytes()[ptr.offset()..ptr.offset() + len]
  }

  pub fn payload_mut(
    &mut self,
    ptr: HeapPtr,
  ) -> &mut [u8] {
    let len = self.usable_size(ptr);
    &mut self.arena.bytes_mut()[ptr.offset()..ptr.offset() + len]
  }

  /// Current address of the payload. Only stable while the arena does not
  /// relocate.
  pub fn as_ptr(
    &self,
    ptr: HeapPtr,
  ) -> *const u8 {
    self.arena.bytes().as_ptr().wrapping_add(ptr.offset())
  }

  pub fn arena(&self) -> &A {
    &self.arena
  }

  pub fn arena_len(&self) -> usize {
    self.arena.len()
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn free_lists(&self) -> &FreeLists {
    &self.free_lists
  }

  /// Tears the heap down and hands back its arena.
  pub fn into_arena(self) -> A {
    self.arena
  }

  /// Every regular block in address order, as `(header offset, tag)`.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      mem: self.arena.bytes(),
      cursor: FIRST_BLOCK,
    }
  }

  /// Grows the arena by at least `bytes` and turns the new space into a free
  /// block, merged with a free predecessor if there is one.
  ///
  /// The old epilogue header becomes the new block's header.
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<usize, HeapError> {
    let size = align::checked_align(bytes.max(MIN_BLOCK_SIZE))
      .ok_or(HeapError::SizeOverflow { requested: bytes })?;

    let old_end = self.arena.grow(size)?;
    let block = old_end - WORD;

    let mem = self.arena.bytes_mut();
    block::write_tags(mem, block, Tag::new(size, false));
    block::write_tag(mem, block::next_block(block, size), Tag::new(0, true));

    debug!(block, size, arena_len = self.arena.len(), "arena extended");
    Ok(self.coalesce(block))
  }

  /// Allocates `adjusted` bytes out of the free `block`.
  fn place(
    &mut self,
    block: usize,
    adjusted: usize,
  ) {
    let mem = self.arena.bytes_mut();
    self.free_lists.remove(mem, block);
    let size = block::read_tag(mem, block).size();

    self.carve(block, size, adjusted);
  }

  /// Marks the first `adjusted` bytes of the `size`-byte span at `block` as
  /// allocated. The rest becomes a free block when it is big enough to be
  /// one, otherwise it stays inside the allocation.
  ///
  /// The span must not be in any free list.
  fn carve(
    &mut self,
    block: usize,
    size: usize,
    adjusted: usize,
  ) {
    let remainder = size - adjusted;
    let mem = self.arena.bytes_mut();

    if remainder >= MIN_BLOCK_SIZE {
      block::write_tags(mem, block, Tag::new(adjusted, true));
      let rest = block::next_block(block, adjusted);
      block::write_tags(mem, rest, Tag::new(remainder, false));

      debug!(block, adjusted, rest, remainder, "split");
      // the remainder may border a free block, e.g. right after an extension
      self.coalesce(rest);
    } else {
      block::write_tags(mem, block, Tag::new(size, true));
    }
  }

  /// Merges the free `block` with its free neighbours and files the result
  /// in the free lists.
  ///
  /// `block` must already be tagged free and must not be in a list. Returns
  /// the header of the merged block.
  fn coalesce(
    &mut self,
    block: usize,
  ) -> usize {
    let mem = self.arena.bytes_mut();
    let size = block::read_tag(mem, block).size();
    let prev_tag = block::read_tag(mem, block::prev_footer(block));
    let next = block::next_block(block, size);
    let next_tag = block::read_tag(mem, next);

    let (start, merged) = match (prev_tag.is_allocated(), next_tag.is_allocated()) {
      (true, true) => (block, size),
      (false, true) => {
        let prev = block::prev_block(block, prev_tag.size());
        self.free_lists.remove(mem, prev);
        (prev, prev_tag.size() + size)
      }
      (true, false) => {
        self.free_lists.remove(mem, next);
        (block, size + next_tag.size())
      }
      (false, false) => {
        let prev = block::prev_block(block, prev_tag.size());
        self.free_lists.remove(mem, prev);
        self.free_lists.remove(mem, next);
        (prev, prev_tag.size() + size + next_tag.size())
      }
    };

    block::write_tags(mem, start, Tag::new(merged, false));
    self.free_lists.insert(mem, start);

    if merged != size {
      debug!(block, start, merged, "coalesced");
    }
    start
  }

  /// Resizes the allocation at `ptr` without moving it, if possible.
  fn resize_in_place(
    &mut self,
    ptr: HeapPtr,
    size: usize,
  ) -> bool {
    let Some(adjusted) = block::adjusted_size(size) else {
      return false;
    };
    let block = ptr.block();
    let current = block::read_tag(self.arena.bytes(), block).size();

    if adjusted <= current {
      self.carve(block, current, adjusted);
      return true;
    }

    let next = block::next_block(block, current);
    let mut next_tag = block::read_tag(self.arena.bytes(), next);
    let available = if next_tag.is_allocated() { 0 } else { next_tag.size() };

    if current + available < adjusted {
      let after = block::next_block(next, available);
      if after != self.epilogue() {
        return false;
      }

      let deficit = adjusted - current - available;
      if let Err(err) = self.extend(deficit.max(self.config.chunk_size)) {
        debug!(%err, "cannot extend arena for in-place growth");
        return false;
      }
      // the extension merged into a free block starting at `next`
      next_tag = block::read_tag(self.arena.bytes(), next);
    }

    let mem = self.arena.bytes_mut();
    self.free_lists.remove(mem, next);
    let total = current + next_tag.size();
    block::write_tags(mem, block, Tag::new(total, true));

    self.carve(block, total, adjusted);
    true
  }

  fn epilogue(&self) -> usize {
    self.arena.len() - WORD
  }

  fn debug_check(&self) {
    if self.config.check_every_op {
      self.check_heap(false);
    }
  }
}

/// Iterator over a heap's blocks, see [`Heap::blocks`].
pub struct Blocks<'a> {
  mem: &'a [u8],
  cursor: usize,
}

impl Iterator for Blocks<'_> {
  type Item = (usize, Tag);

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.cursor;
    let tag = block::read_tag(self.mem, block);
    if tag.size() == 0 {
      return None;
    }
    self.cursor = block::next_block(block, tag.size());
    Some((block, tag))
  }
}
