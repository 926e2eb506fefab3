#![cfg(loom)]

use arenaskl::SkipMap;

const ARENA_SIZE: usize = 1 << 20;

fn key(i: usize) -> Vec<u8> {
  format!("{:05}", i).into_bytes()
}

#[test]
fn concurrent_write() {
  loom::model(|| {
    const N: usize = 2;
    let l = SkipMap::new(ARENA_SIZE);
    let handles: Vec<_> = (0..N)
      .map(|i| {
        let l = l.clone();
        loom::thread::spawn(move || {
          l.insert(&key(i), i as u64 + 1);
        })
      })
      .collect();
    for h in handles {
      h.join().unwrap();
    }
    for i in 0..N {
      assert_eq!(l.get(&key(i)), Some(i as u64 + 1), "broken: {i}");
    }
  });
}

#[test]
fn concurrent_write_one_key() {
  loom::model(|| {
    const N: usize = 2;
    let l = SkipMap::new(ARENA_SIZE);
    let handles: Vec<_> = (0..N)
      .map(|i| {
        let l = l.clone();
        loom::thread::spawn(move || {
          l.insert(b"thekey", i as u64 + 1);
        })
      })
      .collect();
    for h in handles {
      h.join().unwrap();
    }
    let v = l.get(b"thekey").unwrap();
    assert!((1..=N as u64).contains(&v));
    assert_eq!(l.len(), 1);
  });
}

#[test]
fn concurrent_read() {
  loom::model(|| {
    const N: usize = 2;
    let l = SkipMap::new(ARENA_SIZE);
    for i in 0..N {
      l.insert(&key(i), i as u64 + 1);
    }
    let handles: Vec<_> = (0..N)
      .map(|i| {
        let l = l.clone();
        loom::thread::spawn(move || {
          assert_eq!(l.get(&key(i)), Some(i as u64 + 1), "broken: {i}");
        })
      })
      .collect();
    for h in handles {
      h.join().unwrap();
    }
  });
}
