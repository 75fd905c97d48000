//! Growable byte regions the heap lives in.
//!
//! An [`Arena`] only ever grows at its high end. The heap addresses
//! everything inside it by offset, so a provider is free to relocate its
//! storage when it grows (as [`VecArena`] does) or to keep it pinned (as
//! [`MmapArena`] does).

use crate::{align_to, error::ArenaError};

/// The memory provider consumed by [`Heap`](crate::Heap).
pub trait Arena {
  /// Current size in bytes.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// The whole arena, `[0, len)`.
  fn bytes(&self) -> &[u8];

  fn bytes_mut(&mut self) -> &mut [u8];

  /// Appends `extra` bytes at the end of the arena.
  ///
  /// Returns the offset at which the new region starts (the previous
  /// length). On failure the arena is left exactly as it was.
  fn grow(
    &mut self,
    extra: usize,
  ) -> Result<usize, ArenaError>;
}

/// An arena backed by a `Vec<u64>`, so its base address is always 8-byte
/// aligned.
///
/// New bytes are zeroed. Growth past `limit` fails with
/// [`ArenaError::LimitExceeded`].
#[derive(Debug)]
pub struct VecArena {
  words: Vec<u64>,
  len: usize,
  limit: usize,
}

impl VecArena {
  pub fn new(limit: usize) -> Self {
    Self {
      words: Vec::new(),
      len: 0,
      limit,
    }
  }

  pub fn limit(&self) -> usize {
    self.limit
  }
}

impl Arena for VecArena {
  fn len(&self) -> usize {
    self.len
  }

  fn bytes(&self) -> &[u8] {
    &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len]
  }

  fn grow(
    &mut self,
    extra: usize,
  ) -> Result<usize, ArenaError> {
    let new_len = match self.len.checked_add(extra) {
      Some(new_len) if new_len <= self.limit => new_len,
      _ => {
        return Err(ArenaError::LimitExceeded {
          requested: extra,
          limit: self.limit,
        });
      }
    };

    let word_count = align_to!(new_len, 8) / 8;
    self
      .words
      .try_reserve(word_count - self.words.len())
      .map_err(|source| ArenaError::OutOfMemory {
        requested: new_len,
        source,
      })?;
    self.words.resize(word_count, 0);

    let old_len = self.len;
    self.len = new_len;
    Ok(old_len)
  }
}

#[cfg(unix)]
pub use self::mmap::MmapArena;

#[cfg(unix)]
mod mmap {
  use std::{io, ptr, ptr::NonNull, slice};

  use libc::{
    _SC_PAGESIZE, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_NONE, PROT_READ, PROT_WRITE, c_void,
    mmap, mprotect, munmap, sysconf,
  };

  use super::Arena;
  use crate::{align_to, error::ArenaError};

  /// An arena inside one reserved range of virtual address space.
  ///
  /// The range is mapped inaccessible up front and pages are committed as
  /// the arena grows, much like moving a program break with `sbrk(2)`, but
  /// private to this arena. The storage never moves.
  pub struct MmapArena {
    base: NonNull<u8>,
    len: usize,
    committed: usize,
    reserved: usize,
    page_size: usize,
  }

  impl MmapArena {
    /// Reserves `reserve` bytes (rounded up to whole pages) of address space.
    pub fn new(reserve: usize) -> Result<Self, ArenaError> {
      let page_size = page_size();
      let reserved = align_to!(reserve.max(1), page_size);

      // SAFETY: anonymous private mapping at a kernel-chosen address; no
      // existing memory is touched.
      let addr = unsafe {
        mmap(
          ptr::null_mut(),
          reserved,
          PROT_NONE,
          MAP_PRIVATE | MAP_ANONYMOUS,
          -1,
          0,
        )
      };

      if addr == MAP_FAILED {
        return Err(ArenaError::Reserve(io::Error::last_os_error()));
      }

      let base = NonNull::new(addr as *mut u8)
        .ok_or_else(|| ArenaError::Reserve(io::Error::other("mmap returned null")))?;

      Ok(Self {
        base,
        len: 0,
        committed: 0,
        reserved,
        page_size,
      })
    }

    /// Size of the reserved address range in bytes.
    pub fn reserved(&self) -> usize {
      self.reserved
    }

    /// Bytes currently backed by accessible pages.
    pub fn committed(&self) -> usize {
      self.committed
    }

    /// Address of the first byte; stable for the arena's whole life.
    pub fn base(&self) -> *const u8 {
      self.base.as_ptr()
    }
  }

  impl Arena for MmapArena {
    fn len(&self) -> usize {
      self.len
    }

    fn bytes(&self) -> &[u8] {
      // SAFETY: `[base, base + len)` lies inside the committed, readable
      // prefix of our own mapping.
      unsafe { slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
      // SAFETY: as in `bytes`, and `&mut self` guarantees exclusivity.
      unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    fn grow(
      &mut self,
      extra: usize,
    ) -> Result<usize, ArenaError> {
      let new_len = match self.len.checked_add(extra) {
        Some(new_len) if new_len <= self.reserved => new_len,
        _ => {
          return Err(ArenaError::LimitExceeded {
            requested: extra,
            limit: self.reserved,
          });
        }
      };

      if new_len > self.committed {
        let new_committed = align_to!(new_len, self.page_size).min(self.reserved);

        // SAFETY: the range `[committed, new_committed)` is inside our
        // reservation and page aligned.
        let rc = unsafe {
          mprotect(
            self.base.as_ptr().add(self.committed) as *mut c_void,
            new_committed - self.committed,
            PROT_READ | PROT_WRITE,
          )
        };

        if rc != 0 {
          return Err(ArenaError::Commit(io::Error::last_os_error()));
        }
        self.committed = new_committed;
      }

      let old_len = self.len;
      self.len = new_len;
      Ok(old_len)
    }
  }

  // SAFETY: the mapping is owned exclusively by this value and unmapped only
  // in `drop`; moving it to another thread moves that ownership with it.
  unsafe impl Send for MmapArena {}

  impl Drop for MmapArena {
    fn drop(&mut self) {
      // SAFETY: unmapping exactly the range mapped in `new`.
      unsafe {
        munmap(self.base.as_ptr() as *mut c_void, self.reserved);
      }
    }
  }

  fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    match unsafe { sysconf(_SC_PAGESIZE) } {
      size if size > 0 => size as usize,
      _ => 4096,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_vec_arena_grows_contiguously() {
    let mut arena = VecArena::new(1024);

    assert_eq!(arena.grow(24).unwrap(), 0);
    assert_eq!(arena.grow(100).unwrap(), 24);
    assert_eq!(arena.len(), 124);
    assert_eq!(arena.bytes().len(), 124);
    assert!(arena.bytes().iter().all(|&b| b == 0));
  }

  #[test]
  fn test_vec_arena_keeps_contents_across_growth() {
    let mut arena = VecArena::new(1 << 20);
    arena.grow(16).unwrap();
    arena.bytes_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);

    arena.grow(1 << 19).unwrap();

    assert_eq!(&arena.bytes()[..4], &[1, 2, 3, 4]);
  }

  #[test]
  fn test_vec_arena_base_is_word_aligned() {
    let mut arena = VecArena::new(4096);
    arena.grow(8).unwrap();
    assert_eq!(arena.bytes().as_ptr() as usize % 8, 0);
  }

  #[test]
  fn test_vec_arena_limit() {
    let mut arena = VecArena::new(64);
    arena.grow(60).unwrap();

    let result = arena.grow(8);

    assert!(matches!(result, Err(ArenaError::LimitExceeded { requested: 8, limit: 64 })));
    assert_eq!(arena.len(), 60);
    assert!(arena.grow(usize::MAX).is_err());
  }

  #[test]
  fn test_vec_arena_reports_out_of_memory() {
    let mut arena = VecArena::new(usize::MAX);
    arena.grow(16).unwrap();

    let result = arena.grow(usize::MAX / 2);

    assert!(matches!(result, Err(ArenaError::OutOfMemory { .. })));
    assert_eq!(arena.len(), 16);
    assert_eq!(arena.limit(), usize::MAX);
  }

  #[cfg(unix)]
  #[test]
  fn test_mmap_arena_commits_on_growth() {
    let mut arena = MmapArena::new(1 << 20).unwrap();
    let base = arena.base();

    assert_eq!(arena.grow(10).unwrap(), 0);
    assert!(arena.committed() >= 10);
    arena.bytes_mut()[9] = 0xAB;

    assert_eq!(arena.grow(200_000).unwrap(), 10);
    assert_eq!(arena.bytes()[9], 0xAB);
    assert_eq!(arena.base(), base);
  }

  #[cfg(unix)]
  #[test]
  fn test_mmap_arena_reservation_is_a_hard_limit() {
    let mut arena = MmapArena::new(8192).unwrap();
    let reserved = arena.reserved();

    arena.grow(reserved).unwrap();

    assert!(matches!(arena.grow(1), Err(ArenaError::LimitExceeded { .. })));
    assert_eq!(arena.len(), reserved);
  }
}
