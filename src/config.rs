//! Heap tuning parameters.

use serde::Deserialize;

use crate::{
  align::ALIGNMENT,
  block::{BOOTSTRAP_SIZE, MIN_BLOCK_SIZE},
  error::ConfigError,
};

/// Configuration for a [`Heap`](crate::Heap).
///
/// Every field has a default, so a TOML document only needs to name the
/// values it changes:
///
/// ```rust
/// use rallocator::HeapConfig;
///
/// let config = HeapConfig::from_toml_str("chunk_size = 8192").unwrap();
/// assert_eq!(config.chunk_size, 8192);
/// assert!(config.realloc_in_place);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeapConfig {
  /// Minimum number of bytes the arena is extended by when no free block fits.
  pub chunk_size: usize,

  /// Upper bound on the arena size in bytes.
  ///
  /// Used as the growth limit of a `VecArena` and as the size of the address
  /// range an `MmapArena` reserves.
  pub max_heap_bytes: usize,

  /// Try to resize blocks without moving them before falling back to copy.
  pub realloc_in_place: bool,

  /// Run the consistency walk after every allocate, free and reallocate.
  pub check_every_op: bool,
}

impl HeapConfig {
  /// Default arena extension size.
  pub const DEFAULT_CHUNK_SIZE: usize = 1 << 12;

  /// Default arena limit (1 GiB).
  pub const DEFAULT_MAX_HEAP_BYTES: usize = 1 << 30;

  /// Parses a configuration from TOML and validates it.
  pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(source)?;
    config.validate()?;
    Ok(config)
  }

  /// Rejects values the heap cannot honour.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.chunk_size < MIN_BLOCK_SIZE || self.chunk_size % ALIGNMENT != 0 {
      return Err(ConfigError::Invalid(format!(
        "chunk_size must be a multiple of {ALIGNMENT} of at least {MIN_BLOCK_SIZE}, got {}",
        self.chunk_size
      )));
    }

    if self.max_heap_bytes < BOOTSTRAP_SIZE.saturating_add(self.chunk_size) {
      return Err(ConfigError::Invalid(format!(
        "max_heap_bytes {} cannot hold the sentinels plus one chunk of {}",
        self.max_heap_bytes, self.chunk_size
      )));
    }

    Ok(())
  }
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      chunk_size: Self::DEFAULT_CHUNK_SIZE,
      max_heap_bytes: Self::DEFAULT_MAX_HEAP_BYTES,
      realloc_in_place: true,
      check_every_op: false,
    }
  }
}
