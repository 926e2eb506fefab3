use criterion::*;
use rand::prelude::*;
use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  thread,
};

use arenaskl::SkipMap;

fn skiplist_round(l: &SkipMap, case: &(Vec<u8>, bool), value: u64) {
  if case.1 {
    let _ = l.get(&case.0);
  } else {
    l.insert(&case.0, value);
  }
}

fn random_key(rng: &mut ThreadRng) -> Vec<u8> {
  let mut key = vec![0; 16];
  rng.fill_bytes(&mut key);
  key
}

fn bench_read_write_skiplist_frac(b: &mut Bencher<'_>, frac: &usize) {
  let frac = *frac;
  let list = SkipMap::new(512 << 20);
  let l = list.clone();
  let stop = Arc::new(AtomicBool::new(false));
  let s = stop.clone();
  let j = thread::spawn(move || {
    let mut rng = rand::thread_rng();
    while !s.load(Ordering::SeqCst) {
      let case = (random_key(&mut rng), frac > rng.gen_range(0..11));
      skiplist_round(&l, &case, 123);
    }
  });
  let mut rng = rand::thread_rng();
  b.iter_batched_ref(
    || (random_key(&mut rng), frac > rng.gen_range(0..11)),
    |case| skiplist_round(&list, case, 123),
    BatchSize::SmallInput,
  );
  stop.store(true, Ordering::SeqCst);
  j.join().unwrap();
}

fn bench_read_write_skiplist(c: &mut Criterion) {
  let mut group = c.benchmark_group("skiplist_read_write");
  for i in 0..=10 {
    group.bench_with_input(
      BenchmarkId::from_parameter(i),
      &i,
      bench_read_write_skiplist_frac,
    );
  }
  group.finish();
}

fn bench_write_skiplist(c: &mut Criterion) {
  let list = SkipMap::new(512 << 20);
  let mut rng = rand::thread_rng();
  c.bench_function("skiplist_write", |b| {
    b.iter_batched_ref(
      || random_key(&mut rng),
      |key| list.insert(key, 123),
      BatchSize::SmallInput,
    )
  });
}

criterion_group!(benches, bench_read_write_skiplist, bench_write_skiplist);
criterion_main!(benches);
