use std::{env, fs, io::Read};

use rallocator::{Heap, HeapConfig, HeapPtr};
use tracing_subscriber::EnvFilter;

/// Waits until the user presses ENTER when stepping is enabled.
/// Useful to read the block map between operations.
fn pause(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

/// Prints every block in address order, followed by the heap totals.
fn print_heap(
  label: &str,
  heap: &Heap,
) {
  println!(
    "\n[{label}] arena = {} of {} bytes",
    heap.arena_len(),
    heap.arena().limit()
  );
  for (block, tag) in heap.blocks() {
    println!(
      "  {:>8}  {:>7} B  {}",
      block,
      tag.size(),
      if tag.is_allocated() { "allocated" } else { "free" }
    );
  }
  match heap.validate() {
    Ok(stats) => println!("  {stats}"),
    Err(violation) => println!("  INCONSISTENT: {violation}"),
  }
}

fn print_alloc(
  heap: &Heap,
  size: usize,
  ptr: HeapPtr,
) {
  println!(
    "Allocated {} bytes, offset = {}, usable = {}, address = {:?}",
    size,
    ptr.offset(),
    heap.usable_size(ptr),
    heap.as_ptr(ptr)
  );
}

fn load_config() -> HeapConfig {
  let mut args = env::args().skip_while(|arg| arg != "--config").skip(1);
  match args.next() {
    Some(path) => {
      let source = fs::read_to_string(&path).unwrap_or_else(|err| panic!("cannot read {path}: {err}"));
      HeapConfig::from_toml_str(&source).unwrap_or_else(|err| panic!("bad config {path}: {err}"))
    }
    None => HeapConfig::default(),
  }
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let step = env::args().any(|arg| arg == "--step");
  let config = load_config();
  let chunk = config.chunk_size;
  let mut heap = Heap::with_config(config).expect("heap initialization failed");

  print_heap("start", &heap);
  pause(step);

  // 1) Two neighbouring allocations carved out of the first chunk.
  let first = heap.allocate(100).unwrap();
  print_alloc(&heap, 100, first);
  heap.payload_mut(first)[..4].copy_from_slice(&0xDEADBEEFu32.to_ne_bytes());

  let second = heap.allocate(200).unwrap();
  print_alloc(&heap, 200, second);
  print_heap("two allocations", &heap);
  pause(step);

  // 2) Free the first block and ask for slightly less: first fit hands the
  //    same block back.
  heap.free(first);
  print_heap("first freed", &heap);
  let third = heap.allocate(90).unwrap();
  print_alloc(&heap, 90, third);
  println!(
    "third == first? {}",
    if third == first { "Yes, it reused the freed block" } else { "No, it allocated somewhere else" }
  );
  pause(step);

  // 3) Free both neighbours: they merge with each other and with the tail.
  heap.free(third);
  heap.free(second);
  print_heap("everything freed", &heap);
  pause(step);

  // 4) A request larger than the chunk grows the arena.
  let big = heap.allocate(4 * chunk).unwrap();
  print_alloc(&heap, 4 * chunk, big);
  print_heap("after large alloc", &heap);
  pause(step);

  // 5) Grow it further; the block is last, so it is extended in place.
  let bigger = heap.reallocate(Some(big), 8 * chunk).unwrap();
  println!("reallocate moved the block? {}", bigger != big);
  print_heap("after reallocate", &heap);

  heap.free(bigger);
  heap.check_heap(true);
  println!("\nEnd of example.");
}
