//! Random allocate/free/reallocate scripts checked against a shadow model.

use std::collections::HashMap;

use proptest::prelude::*;
use rallocator::{ALIGNMENT, Heap, HeapConfig, HeapPtr};

#[derive(Clone, Debug)]
enum Op {
  Allocate(usize),
  Free(usize),
  Reallocate(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    4 => (1usize..2048).prop_map(Op::Allocate),
    3 => any::<usize>().prop_map(Op::Free),
    2 => (any::<usize>(), 0usize..4096).prop_map(|(i, size)| Op::Reallocate(i, size)),
  ]
}

/// Live allocation: requested size and the byte it was filled with.
#[derive(Clone, Copy)]
struct Shadow {
  size: usize,
  fill: u8,
}

fn assert_consistent(
  heap: &Heap,
  live: &HashMap<HeapPtr, Shadow>,
) -> Result<(), TestCaseError> {
  prop_assert!(heap.validate().is_ok(), "{:?}", heap.validate());

  let mut ranges: Vec<_> = live
    .iter()
    .map(|(ptr, shadow)| (ptr.offset(), ptr.offset() + shadow.size))
    .collect();
  ranges.sort_unstable();
  for pair in ranges.windows(2) {
    prop_assert!(pair[0].1 <= pair[1].0, "payloads overlap: {:?}", pair);
  }

  for (&ptr, shadow) in live {
    prop_assert_eq!(heap.as_ptr(ptr) as usize % ALIGNMENT, 0);
    prop_assert!(heap.usable_size(ptr) >= shadow.size);
    prop_assert!(heap.payload(ptr)[..shadow.size].iter().all(|&b| b == shadow.fill));
  }
  Ok(())
}

fn run(
  config: HeapConfig,
  ops: Vec<Op>,
) -> Result<(), TestCaseError> {
  let mut heap = Heap::with_config(config).unwrap();
  let mut live: HashMap<HeapPtr, Shadow> = HashMap::new();
  let mut order: Vec<HeapPtr> = Vec::new();
  let mut next_fill = 1u8;

  for op in ops {
    match op {
      Op::Allocate(size) => {
        let ptr = heap.allocate(size).unwrap();
        let fill = next_fill;
        next_fill = next_fill.wrapping_add(1).max(1);
        heap.payload_mut(ptr)[..size].fill(fill);
        let fresh = live.insert(ptr, Shadow { size, fill }).is_none();
        prop_assert!(fresh, "offset handed out twice");
        order.push(ptr);
      }
      Op::Free(i) if !order.is_empty() => {
        let ptr = order.swap_remove(i % order.len());
        live.remove(&ptr);
        heap.free(ptr);
      }
      Op::Reallocate(i, size) if !order.is_empty() => {
        let slot = i % order.len();
        let ptr = order[slot];
        let old = live.remove(&ptr).unwrap();

        match heap.reallocate(Some(ptr), size) {
          Some(moved) => {
            let keep = old.size.min(size);
            prop_assert!(heap.payload(moved)[..keep].iter().all(|&b| b == old.fill));
            heap.payload_mut(moved)[..size].fill(old.fill);
            live.insert(moved, Shadow { size, fill: old.fill });
            order[slot] = moved;
          }
          None => {
            prop_assert_eq!(size, 0);
            order.swap_remove(slot);
          }
        }
      }
      _ => {}
    }

    assert_consistent(&heap, &live)?;
  }

  for ptr in order {
    heap.free(ptr);
  }
  let stats = heap.validate().unwrap();
  prop_assert_eq!(stats.allocated_blocks, 0);
  prop_assert_eq!(stats.free_blocks, 1);
  Ok(())
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  #[test]
  fn random_scripts_keep_invariants(ops in proptest::collection::vec(op(), 1..120)) {
    run(HeapConfig::default(), ops)?;
  }

  #[test]
  fn random_scripts_keep_invariants_without_in_place_resize(
    ops in proptest::collection::vec(op(), 1..120),
  ) {
    let config = HeapConfig {
      realloc_in_place: false,
      ..HeapConfig::default()
    };
    run(config, ops)?;
  }

  #[test]
  fn small_chunks_force_frequent_growth(ops in proptest::collection::vec(op(), 1..80)) {
    let config = HeapConfig {
      chunk_size: 64,
      ..HeapConfig::default()
    };
    run(config, ops)?;
  }
}
