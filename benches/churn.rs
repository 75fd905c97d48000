use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rallocator::{Heap, HeapConfig};

const SIZES: [usize; 8] = [8, 24, 40, 100, 256, 700, 1500, 5000];

fn allocate_free_churn(c: &mut Criterion) {
  let mut group = c.benchmark_group("churn");

  for live in [16usize, 256, 4096] {
    group.bench_with_input(BenchmarkId::from_parameter(live), &live, |b, &live| {
      let mut heap = Heap::with_config(HeapConfig::default()).unwrap();
      let mut slots: Vec<_> = (0..live)
        .map(|i| heap.allocate(SIZES[i % SIZES.len()]).unwrap())
        .collect();
      let mut i = 0usize;

      b.iter(|| {
        let slot = i % live;
        heap.free(slots[slot]);
        slots[slot] = heap.allocate(black_box(SIZES[(i * 7) % SIZES.len()])).unwrap();
        i = i.wrapping_add(1);
      });
    });
  }

  group.finish();
}

fn reallocate_growth(c: &mut Criterion) {
  c.bench_function("reallocate_doubling", |b| {
    b.iter(|| {
      let mut heap = Heap::with_config(HeapConfig::default()).unwrap();
      let mut ptr = heap.allocate(16);
      let mut size = 16;
      while size < 64 * 1024 {
        size *= 2;
        ptr = heap.reallocate(ptr, black_box(size));
      }
      ptr
    });
  });
}

criterion_group!(benches, allocate_free_churn, reallocate_growth);
criterion_main!(benches);
