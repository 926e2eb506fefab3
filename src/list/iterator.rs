use super::*;

/// A bidirectional iterator over a [`SkipMap`].
///
/// The iterator holds its own handle on the map, so the arena stays alive
/// for as long as the iterator does, even after every `SkipMap` handle is
/// gone. Dropping the iterator releases that handle.
///
/// A fresh iterator is not positioned anywhere; seek before reading.
/// Walking past either end invalidates the iterator until it is reseeked.
pub struct SkipMapIterator {
  map: SkipMap,
  nd: NodePtr,
}

impl SkipMap {
  /// Returns a new iterator over the map. The iterator keeps the map
  /// alive until it is dropped.
  #[inline]
  pub fn iter(&self) -> SkipMapIterator {
    SkipMapIterator {
      map: self.clone(),
      nd: NodePtr::NULL,
    }
  }

  /// Returns a direction-agnostic iterator: when `reversed` is set,
  /// `next`, `rewind` and `seek` walk the map in descending key order.
  #[inline]
  pub fn uni_iter(&self, reversed: bool) -> UniSkipMapIterator {
    UniSkipMapIterator {
      iter: self.iter(),
      reversed,
    }
  }
}

impl SkipMapIterator {
  /// Returns true iff the iterator is positioned at a valid node.
  #[inline]
  pub fn valid(&self) -> bool {
    !self.nd.is_null()
  }

  /// Returns the key at the current position.
  #[inline]
  pub fn key(&self) -> &[u8] {
    assert!(self.valid(), "iterator is not positioned at a valid node");
    // Safety: valid() checked the node is real, and the arena outlives self.
    unsafe { self.nd.as_ptr().get_key(self.map.arena()) }
  }

  /// Returns the value at the current position.
  #[inline]
  pub fn value(&self) -> u64 {
    assert!(self.valid(), "iterator is not positioned at a valid node");
    unsafe { self.nd.as_ptr() }.get_value()
  }

  /// Advances to the next position.
  pub fn next(&mut self) {
    assert!(self.valid(), "iterator is not positioned at a valid node");
    self.nd = unsafe { self.map.get_next(self.nd, 0) };
  }

  /// Moves to the previous position. Nodes carry no back-pointers, so
  /// this is a descending search rather than a single link hop.
  pub fn prev(&mut self) {
    assert!(self.valid(), "iterator is not positioned at a valid node");
    unsafe {
      let key = self.nd.as_ptr().get_key(self.map.arena());
      let (nd, _) = self.map.find_near(key, true, false); // find <. No equality allowed.
      self.nd = nd;
    }
  }

  /// Positions at the first entry with key >= `target`.
  pub fn seek(&mut self, target: &[u8]) {
    let (nd, _) = unsafe { self.map.find_near(target, false, true) }; // find >=.
    self.nd = nd;
  }

  /// Positions at the last entry with key <= `target`.
  pub fn seek_for_prev(&mut self, target: &[u8]) {
    let (nd, _) = unsafe { self.map.find_near(target, true, true) }; // find <=.
    self.nd = nd;
  }

  /// Positions at the first entry in the list. The final state is valid
  /// iff the list is not empty.
  pub fn seek_to_first(&mut self) {
    self.nd = unsafe { self.map.get_next(self.map.inner().head, 0) };
  }

  /// Positions at the last entry in the list. The final state is valid
  /// iff the list is not empty.
  pub fn seek_to_last(&mut self) {
    self.nd = unsafe { self.map.find_last() };
  }
}

/// A unidirectional iterator over a [`SkipMap`]: a thin wrapper around
/// [`SkipMapIterator`] that fixes the direction once, so merge code
/// upstream can drive one uniform ordering primitive.
pub struct UniSkipMapIterator {
  iter: SkipMapIterator,
  reversed: bool,
}

impl UniSkipMapIterator {
  /// Advances in the fixed direction.
  pub fn next(&mut self) {
    if !self.reversed {
      self.iter.next()
    } else {
      self.iter.prev()
    }
  }

  /// Positions at the first entry in the fixed direction.
  pub fn rewind(&mut self) {
    if !self.reversed {
      self.iter.seek_to_first()
    } else {
      self.iter.seek_to_last()
    }
  }

  /// Seeks to `key` from the fixed direction's point of view.
  pub fn seek(&mut self, key: &[u8]) {
    if !self.reversed {
      self.iter.seek(key)
    } else {
      self.iter.seek_for_prev(key)
    }
  }

  /// Returns the key at the current position.
  #[inline]
  pub fn key(&self) -> &[u8] {
    self.iter.key()
  }

  /// Returns the value at the current position.
  #[inline]
  pub fn value(&self) -> u64 {
    self.iter.value()
  }

  /// Returns true iff the iterator is positioned at a valid node.
  #[inline]
  pub fn valid(&self) -> bool {
    self.iter.valid()
  }
}
