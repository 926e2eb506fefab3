use core::{cmp, ptr::NonNull};

use alloc::boxed::Box;
use crossbeam_utils::CachePadded;

use crate::{
  arena::Arena,
  node::{Node, NodePtr},
  sync::{AtomicU32, AtomicUsize, Ordering},
  MAX_HEIGHT, PROBABILITIES,
};

mod iterator;
pub use iterator::{SkipMapIterator, UniSkipMapIterator};


/// The shared state behind every handle: the arena, the head sentinel,
/// the current list height and the handle count. Freed in one shot when
/// the last handle (map or iterator) goes away.
struct Inner {
  arena: Arena,
  head: NodePtr,

  /// Current height. 1 <= height <= MAX_HEIGHT. CAS.
  height: CachePadded<AtomicU32>,
  len: CachePadded<AtomicU32>,

  refs: AtomicUsize,
}

/// A fast, concurrent map from byte keys to `u64` values, implemented as
/// a lock-free skiplist over a single arena allocation. Keys are
/// immutable once added and deletion is not supported; overwriting a key
/// replaces its value in place with one atomic store.
///
/// A `SkipMap` is a cheaply cloneable handle. Clones and iterators share
/// the same list, and the arena is released when the last of them is
/// dropped.
pub struct SkipMap {
  inner: NonNull<Inner>,
}

unsafe impl Send for SkipMap {}
unsafe impl Sync for SkipMap {}

impl core::fmt::Debug for SkipMap {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("SkipMap")
      .field("len", &self.len())
      .field("height", &self.height())
      .field("size", &self.size())
      .field("capacity", &self.capacity())
      .finish()
  }
}

impl Clone for SkipMap {
  fn clone(&self) -> Self {
    let old = self.inner().refs.fetch_add(1, Ordering::Relaxed);
    if old > usize::MAX >> 1 {
      abort();
    }
    Self { inner: self.inner }
  }
}

impl Drop for SkipMap {
  fn drop(&mut self) {
    let inner = self.inner();
    if inner.refs.fetch_sub(1, Ordering::Release) != 1 {
      return;
    }

    // Synchronize with every other handle drop before freeing, the same
    // way `Arc` does. Thread sanitizer does not support fences, so an
    // acquire load stands in for one.
    inner.refs.load(Ordering::Acquire);

    #[cfg(feature = "tracing")]
    tracing::trace!(
      used = inner.arena.size(),
      capacity = inner.arena.capacity(),
      "releasing skiplist arena"
    );

    // Last handle: the arena and the list header go together.
    unsafe { drop(Box::from_raw(self.inner.as_ptr())) };
  }
}

// --------------------------------Public Methods--------------------------------
impl SkipMap {
  /// Creates an empty map backed by an arena of `cap` bytes.
  ///
  /// The capacity is fixed for the lifetime of the map and bounds how many
  /// entries fit; running out of arena space panics. `cap` is raised to a
  /// small minimum so the head sentinel always fits.
  pub fn new(cap: usize) -> Self {
    let arena = Arena::new(cap.max(Node::MAX_NODE_SIZE * 2));
    let head = Node::new_empty_node_ptr(&arena);
    let inner = Box::new(Inner {
      arena,
      head,
      height: CachePadded::new(AtomicU32::new(1)),
      len: CachePadded::new(AtomicU32::new(0)),
      refs: AtomicUsize::new(1),
    });

    Self {
      // Safety: Box::into_raw never returns null.
      inner: unsafe { NonNull::new_unchecked(Box::into_raw(inner)) },
    }
  }

  /// Returns the height of the highest tower within any node that has
  /// ever been allocated as part of this list.
  #[inline]
  pub fn height(&self) -> u32 {
    self.inner().height.load(Ordering::Acquire)
  }

  /// Returns the number of entries in the map.
  #[inline]
  pub fn len(&self) -> usize {
    self.inner().len.load(Ordering::Acquire) as usize
  }

  /// Returns true if the map holds no entries.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns the number of bytes allocated from the arena so far.
  #[inline]
  pub fn size(&self) -> usize {
    self.inner().arena.size()
  }

  /// Returns the capacity of the arena.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.inner().arena.capacity()
  }

  /// Inserts the key-value pair, overwriting the value in place if the
  /// key already exists.
  ///
  /// Panics if the arena runs out of space or if `key` is longer than
  /// `u16::MAX` bytes.
  pub fn insert(&self, key: &[u8], value: u64) {
    let inner = self.inner();

    // An overwrite may not need a new node, and may not even need to
    // raise the height, so both are deferred until the search misses.
    let mut list_height = self.height();
    let mut prev = [NodePtr::NULL; MAX_HEIGHT + 1];
    let mut next = [NodePtr::NULL; MAX_HEIGHT + 1];
    prev[list_height as usize] = inner.head;

    unsafe {
      for i in (0..list_height as usize).rev() {
        // Use the splice one level up to narrow the search at this level.
        let (p, n) = self.find_splice_for_level(key, prev[i + 1], i);
        prev[i] = p;
        next[i] = n;
        if p.offset == n.offset {
          p.as_ptr().set_value(value);
          return;
        }
      }
    }

    let height = Self::random_height();
    let nd = Node::new_node_ptr(&inner.arena, key, value, height);

    // Try to increase the list height via CAS.
    list_height = self.height();
    while height > list_height {
      match inner.height.compare_exchange_weak(
        list_height,
        height,
        Ordering::SeqCst,
        Ordering::Acquire,
      ) {
        // Successfully increased the list height.
        Ok(_) => break,
        Err(h) => list_height = h,
      }
    }

    // We always insert from the base level and up. After the node is
    // added at the base level, no thread can create the same key above
    // it, because it would have discovered the base-level node first.
    unsafe {
      for i in 0..height as usize {
        loop {
          if prev[i].is_null() {
            // This level was above the snapshot height, so its splice was
            // never computed. The upper levels are sparse; searching from
            // the head is cheap. Base levels are always precomputed.
            assert!(i > 1, "base level splices are always precomputed");
            let (p, n) = self.find_splice_for_level(key, inner.head, i);
            prev[i] = p;
            next[i] = n;
            // A concurrent insert of the same key can only be discovered
            // at the base level, and this is not the base level.
            assert!(p.offset != n.offset, "duplicate key above the base level");
          }

          let next_offset = next[i].offset;
          nd.tower(&inner.arena, i).store(next_offset, Ordering::Relaxed);
          match prev[i].cas_next_offset_weak(&inner.arena, i, next_offset, nd.offset) {
            Ok(_) => {
              // Managed to insert nd between prev[i] and next[i].
              // Go to the next level.
              break;
            }
            Err(_) => {
              // CAS failed. We need to recompute prev and next. It is
              // unlikely to be helpful to restart from a higher level,
              // because it is unlikely that many nodes landed between
              // prev[i] and next[i].
              let (p, n) = self.find_splice_for_level(key, prev[i], i);
              prev[i] = p;
              next[i] = n;
              if p.offset == n.offset {
                // The racing insert of this key won at the base level;
                // fall back to the overwrite path.
                assert_eq!(i, 0, "duplicate key discovered above the base level");
                p.as_ptr().set_value(value);
                return;
              }
            }
          }
        }
      }
    }

    inner.len.fetch_add(1, Ordering::AcqRel);
  }

  /// Returns the value associated with `key`, if the key exists.
  pub fn get(&self, key: &[u8]) -> Option<u64> {
    let (n, eq) = unsafe { self.find_near(key, false, true) }; // find greater or equal.
    if !eq {
      return None;
    }
    // Safety: eq means find_near landed on a real node with this key.
    Some(unsafe { n.as_ptr() }.get_value())
  }

  /// Returns true if `key` exists in the map.
  #[inline]
  pub fn contains_key(&self, key: &[u8]) -> bool {
    self.get(key).is_some()
  }
}

// --------------------------------Private Methods--------------------------------
impl SkipMap {
  #[inline]
  fn inner(&self) -> &Inner {
    // Safety: inner lives until the last handle is dropped.
    unsafe { self.inner.as_ref() }
  }

  #[inline]
  fn arena(&self) -> &Arena {
    &self.inner().arena
  }

  #[cfg(feature = "std")]
  #[inline]
  fn random_height() -> u32 {
    use rand::{thread_rng, Rng};
    let rnd: u32 = thread_rng().gen();
    let mut h = 1;

    while h < MAX_HEIGHT && rnd <= PROBABILITIES[h] {
      h += 1;
    }
    h as u32
  }

  #[cfg(not(feature = "std"))]
  #[inline]
  fn random_height() -> u32 {
    use rand::{rngs::OsRng, Rng};
    let rnd: u32 = OsRng.gen();
    let mut h = 1;

    while h < MAX_HEIGHT && rnd <= PROBABILITIES[h] {
      h += 1;
    }
    h as u32
  }

  /// ## Safety
  /// - `nd` must be null or allocated by this map's arena.
  #[inline]
  unsafe fn get_next(&self, nd: NodePtr, height: usize) -> NodePtr {
    if nd.is_null() {
      return NodePtr::NULL;
    }
    let arena = self.arena();
    let offset = nd.next_offset(arena, height);
    NodePtr::new(arena.get_pointer(offset as usize), offset)
  }

  /// Finds the node near `key`.
  ///
  /// If `less` is true, it finds the rightmost node such that
  /// node.key < key (or node.key <= key when `allow_equal`). If `less` is
  /// false, it finds the leftmost node such that node.key > key (or
  /// node.key >= key when `allow_equal`). The bool is true when the
  /// returned node holds exactly `key`. The head sentinel is never
  /// returned; callers observe the null node instead.
  ///
  /// ## Safety
  /// - The arena must outlive the traversal, which holding `&self` guarantees.
  unsafe fn find_near(&self, key: &[u8], less: bool, allow_equal: bool) -> (NodePtr, bool) {
    let inner = self.inner();
    let mut x = inner.head;
    let mut level = self.height() as usize - 1;

    loop {
      // Assume x.key < key.
      let next = self.get_next(x, level);
      if next.is_null() {
        // x.key < key < END OF LIST
        if level > 0 {
          // Can descend further to iterate closer to the end.
          level -= 1;
          continue;
        }

        // level == 0. Cannot descend further; return something sensible.
        if !less {
          return (NodePtr::NULL, false);
        }

        // Try to return x, unless it is the head.
        if x.offset == inner.head.offset {
          return (NodePtr::NULL, false);
        }
        return (x, false);
      }

      let next_key = next.as_ptr().get_key(&inner.arena);
      match key.cmp(next_key) {
        cmp::Ordering::Greater => {
          // x.key < next.key < key. Keep moving right on this level.
          x = next;
        }
        cmp::Ordering::Equal => {
          // x.key < key == next.key.
          if allow_equal {
            return (next, true);
          }

          if !less {
            // We want >, so go to the base level to grab the next bigger node.
            return (self.get_next(next, 0), false);
          }

          // We want <. If not at the base level, descend to get closer.
          if level > 0 {
            level -= 1;
            continue;
          }

          // On the base level. Return x, unless it is the head.
          if x.offset == inner.head.offset {
            return (NodePtr::NULL, false);
          }
          return (x, false);
        }
        cmp::Ordering::Less => {
          // x.key < key < next.key.
          if level > 0 {
            level -= 1;
            continue;
          }

          // At the base level. Need to return something.
          if !less {
            return (next, false);
          }

          // Try to return x, unless it is the head.
          if x.offset == inner.head.offset {
            return (NodePtr::NULL, false);
          }
          return (x, false);
        }
      }
    }
  }

  /// Walks right from `before` at `level` and returns the pair of nodes
  /// the key splices between: either before.key < key < next.key, or
  /// `(next, next)` when a node already holds exactly `key`.
  ///
  /// ## Safety
  /// - `before` must be allocated by this map's arena and `level` below `MAX_HEIGHT`.
  unsafe fn find_splice_for_level(
    &self,
    key: &[u8],
    mut before: NodePtr,
    level: usize,
  ) -> (NodePtr, NodePtr) {
    loop {
      // Assume before.key < key.
      let next = self.get_next(before, level);
      if next.is_null() {
        return (before, next);
      }

      let next_key = next.as_ptr().get_key(self.arena());
      match key.cmp(next_key) {
        cmp::Ordering::Equal => return (next, next),
        cmp::Ordering::Less => return (before, next),
        cmp::Ordering::Greater => before = next, // Keep moving right on this level.
      }
    }
  }

  /// Returns the last node in the list, or null if the list is empty.
  /// Like every search, never returns the head.
  ///
  /// ## Safety
  /// - The arena must outlive the traversal, which holding `&self` guarantees.
  unsafe fn find_last(&self) -> NodePtr {
    let inner = self.inner();
    let mut n = inner.head;
    let mut level = self.height() as usize - 1;

    loop {
      let next = self.get_next(n, level);
      if !next.is_null() {
        n = next;
        continue;
      }
      if level == 0 {
        if n.offset == inner.head.offset {
          return NodePtr::NULL;
        }
        return n;
      }
      level -= 1;
    }
  }
}

#[inline(never)]
#[cold]
fn abort() -> ! {
  #[cfg(feature = "std")]
  {
    std::process::abort();
  }

  #[cfg(not(feature = "std"))]
  {
    // Panicking while already panicking aborts without unwinding.
    struct Abort;
    impl Drop for Abort {
      fn drop(&mut self) {
        panic!();
      }
    }
    let _a = Abort;
    panic!("refcount overflow");
  }
}
