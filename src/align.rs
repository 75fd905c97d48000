/// Payload alignment guaranteed by the heap, in bytes.
pub const ALIGNMENT: usize = 8;

/// Rounds `$value` up to the next multiple of `$unit`, which must be a power
/// of two.
///
/// # Examples
///
/// ```rust
/// use rallocator::align_to;
///
/// assert_eq!(align_to!(13, 16), 16);
/// assert_eq!(align_to!(32, 16), 32);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $unit:expr) => {
    ($value + ($unit - 1)) & !($unit - 1)
  };
}

/// Rounds `$value` up to the heap's payload alignment.
///
/// # Examples
///
/// ```rust
/// use rallocator::align;
///
/// assert_eq!(align!(1), 8);
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(24), 24);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::align::ALIGNMENT)
  };
}

/// Checked variant of [`align!`] for sizes that come from callers.
///
/// Returns `None` when rounding would overflow `usize`.
pub fn checked_align(value: usize) -> Option<usize> {
  value
    .checked_add(ALIGNMENT - 1)
    .map(|v| v & !(ALIGNMENT - 1))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
      }
    }
  }

  #[test]
  fn test_align_to_page() {
    assert_eq!(align_to!(1usize, 4096), 4096);
    assert_eq!(align_to!(4096usize, 4096), 4096);
    assert_eq!(align_to!(4097usize, 4096), 8192);
  }

  #[test]
  fn test_checked_align_overflow() {
    assert_eq!(checked_align(0), Some(0));
    assert_eq!(checked_align(9), Some(16));
    assert_eq!(checked_align(usize::MAX), None);
    assert_eq!(checked_align(usize::MAX - 7), Some(usize::MAX - 7));
  }
}
