use core::mem;

use crate::{
  arena::Arena,
  sync::{AtomicU32, AtomicU64, Ordering},
  MAX_HEIGHT,
};

/// A copyable view of a node: the raw header pointer together with the
/// arena offset it was carved out at. Offset 0 doubles as the null node.
#[derive(Debug)]
pub(crate) struct NodePtr {
  pub(crate) ptr: *const Node,
  pub(crate) offset: u32,
}

impl Clone for NodePtr {
  fn clone(&self) -> Self {
    *self
  }
}

impl Copy for NodePtr {}

impl NodePtr {
  pub(crate) const NULL: Self = Self {
    ptr: core::ptr::null(),
    offset: 0,
  };

  #[inline]
  pub(crate) const fn new(ptr: *const u8, offset: u32) -> Self {
    Self {
      ptr: ptr.cast(),
      offset,
    }
  }

  #[inline]
  pub(crate) fn is_null(&self) -> bool {
    self.ptr.is_null()
  }

  /// ## Safety
  /// - The pointer must not be null.
  #[inline]
  pub(crate) const unsafe fn as_ptr(&self) -> &Node {
    &*self.ptr
  }

  /// Returns the tower slot for `idx`. The slot lives right after the node
  /// header, so it is addressed through the arena rather than the struct.
  ///
  /// ## Safety
  /// - The node must be allocated by `arena` and `idx` must be below its height.
  #[inline]
  pub(crate) unsafe fn tower<'a>(&self, arena: &'a Arena, idx: usize) -> &'a AtomicU32 {
    debug_assert!(!self.ptr.is_null(), "tower access through the null node");
    debug_assert!(idx < (*self.ptr).height as usize, "tower level out of range");
    let tower_offset = self.offset as usize + Node::SIZE + idx * Node::OFFSET_SIZE;
    &*arena.get_pointer(tower_offset).cast()
  }

  /// ## Safety
  /// - Same contract as [`NodePtr::tower`].
  #[inline]
  pub(crate) unsafe fn next_offset(&self, arena: &Arena, idx: usize) -> u32 {
    self.tower(arena, idx).load(Ordering::Acquire)
  }

  /// Publishes this node at `idx` of the predecessor's tower. On success
  /// the release write makes the fully initialized node (key bytes and the
  /// lower tower slots included) visible to any acquire load of the slot.
  ///
  /// ## Safety
  /// - Same contract as [`NodePtr::tower`].
  #[inline]
  pub(crate) unsafe fn cas_next_offset_weak(
    &self,
    arena: &Arena,
    idx: usize,
    current: u32,
    new: u32,
  ) -> Result<u32, u32> {
    self
      .tower(arena, idx)
      .compare_exchange_weak(current, new, Ordering::SeqCst, Ordering::Acquire)
  }
}

/// The node header. The tower of per-level next-offsets is laid out
/// immediately after this struct in the arena, truncated to the node's
/// height; the tower is deliberately not a field because the unused upper
/// slots are never allocated.
#[repr(C)]
pub(crate) struct Node {
  /// The value word. This is the only part of a published node that is
  /// ever rewritten, which is what makes overwrites a single atomic store.
  value: AtomicU64,
  // Immutable once the node is linked at the base level.
  pub(crate) key_offset: u32,
  pub(crate) key_size: u16,
  pub(crate) height: u16,
}

impl Node {
  pub(crate) const SIZE: usize = mem::size_of::<Self>();
  pub(crate) const OFFSET_SIZE: usize = mem::size_of::<AtomicU32>();
  pub(crate) const NODE_ALIGN: usize = mem::align_of::<u64>() - 1;
  pub(crate) const MAX_NODE_SIZE: usize = Self::SIZE + MAX_HEIGHT * Self::OFFSET_SIZE;

  /// Allocates and initializes a node for `key` with a tower of `height`
  /// levels. The tower slots stay zero until the insert splices them.
  pub(crate) fn new_node_ptr(arena: &Arena, key: &[u8], value: u64, height: u32) -> NodePtr {
    assert!(
      height >= 1 && height <= MAX_HEIGHT as u32,
      "tower height {} out of range",
      height
    );
    assert!(
      key.len() <= u16::MAX as usize,
      "key of {} bytes exceeds the {} byte limit",
      key.len(),
      u16::MAX
    );

    let node_offset = arena.put_node(height);
    let key_offset = arena.put_key(key);

    unsafe {
      let ptr = arena.get_pointer_mut(node_offset as usize);
      let node = &mut *ptr.cast::<Node>();
      node.value = AtomicU64::new(value);
      node.key_offset = key_offset;
      node.key_size = key.len() as u16;
      node.height = height as u16;
      NodePtr::new(ptr, node_offset)
    }
  }

  /// Allocates the head sentinel: maximum height, empty key, reserved
  /// value slot. The head is identified by node identity, never by key.
  pub(crate) fn new_empty_node_ptr(arena: &Arena) -> NodePtr {
    let node_offset = arena.put_node(MAX_HEIGHT as u32);

    unsafe {
      let ptr = arena.get_pointer_mut(node_offset as usize);
      let node = &mut *ptr.cast::<Node>();
      node.value = AtomicU64::new(0);
      node.key_offset = 0;
      node.key_size = 0;
      node.height = MAX_HEIGHT as u16;
      NodePtr::new(ptr, node_offset)
    }
  }

  /// ## Safety
  /// - The node must be allocated by `arena`.
  #[inline]
  pub(crate) unsafe fn get_key<'a>(&self, arena: &'a Arena) -> &'a [u8] {
    arena.get_bytes(self.key_offset as usize, self.key_size as usize)
  }

  #[inline]
  pub(crate) fn get_value(&self) -> u64 {
    self.value.load(Ordering::Acquire)
  }

  /// Overwrites the value in place. Publication of the node itself is
  /// handled by the tower CAS; this store only has to order against reads
  /// of the value word.
  #[inline]
  pub(crate) fn set_value(&self, value: u64) {
    self.value.store(value, Ordering::Release);
  }
}
