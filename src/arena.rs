use core::{mem, ptr, slice};

use alloc::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use crossbeam_utils::CachePadded;

use crate::{
  node::Node,
  sync::{AtomicU32, Ordering},
  MAX_HEIGHT,
};

/// A fixed-capacity, zero-initialized buffer with the alignment the node
/// headers need. Deallocates with the same layout it was allocated with.
struct AlignedVec {
  ptr: ptr::NonNull<u8>,
  cap: usize,
  align: usize,
}

impl AlignedVec {
  fn new(capacity: usize, align: usize) -> Self {
    assert!(
      capacity <= isize::MAX as usize - (align - 1),
      "capacity {} is too large",
      capacity
    );
    let ptr = unsafe {
      let layout = Layout::from_size_align_unchecked(capacity, align);
      let ptr = alloc_zeroed(layout);
      if ptr.is_null() {
        handle_alloc_error(layout);
      }
      ptr::NonNull::new_unchecked(ptr)
    };
    Self {
      ptr,
      cap: capacity,
      align,
    }
  }

  #[inline]
  fn layout(&self) -> Layout {
    unsafe { Layout::from_size_align_unchecked(self.cap, self.align) }
  }
}

impl Drop for AlignedVec {
  #[inline]
  fn drop(&mut self) {
    if self.cap != 0 {
      unsafe {
        dealloc(self.ptr.as_ptr(), self.layout());
      }
    }
  }
}

/// The bump allocator every node and key is carved out of. Regions are
/// reserved with a single fetch-add on the cursor and are never reused,
/// so concurrent writers can fill them without coordination.
pub(crate) struct Arena {
  n: CachePadded<AtomicU32>,
  buf: AlignedVec,
}

impl Arena {
  pub(crate) fn new(cap: usize) -> Self {
    assert!(
      cap <= u32::MAX as usize,
      "arena capacity {} exceeds the u32 offset space",
      cap
    );
    Self {
      // Offset 0 is reserved so a zero next-offset always reads as "no node".
      n: CachePadded::new(AtomicU32::new(1)),
      buf: AlignedVec::new(cap, mem::align_of::<Node>()),
    }
  }

  /// Number of bytes reserved so far, including the reserved null byte.
  #[inline]
  pub(crate) fn size(&self) -> usize {
    self.n.load(Ordering::Acquire) as usize
  }

  #[inline]
  pub(crate) const fn capacity(&self) -> usize {
    self.buf.cap
  }

  /// Reserves `sz` bytes and returns the offset of the region. Exhausting
  /// the arena is a sizing bug in the caller and fails fatally; the
  /// surrounding engine is expected to rotate memtables well before that.
  #[inline]
  fn allocate(&self, sz: u32) -> u32 {
    let offset = self.n.fetch_add(sz, Ordering::SeqCst) + sz;
    assert!(
      offset as usize <= self.capacity(),
      "arena: not enough space to reserve {} bytes (capacity {})",
      sz,
      self.capacity()
    );
    offset - sz
  }

  /// Reserves space for a node with a tower of `height` levels and returns
  /// the 8-byte-aligned offset of the node header. The slots the node will
  /// never use are not allocated. The region reads as zero because the
  /// buffer starts zeroed and offsets are never handed out twice.
  pub(crate) fn put_node(&self, height: u32) -> u32 {
    let unused = (MAX_HEIGHT as u32 - height) * Node::OFFSET_SIZE as u32;

    // Pad the allocation so the returned offset can be aligned up.
    let l = Node::MAX_NODE_SIZE as u32 - unused + Node::NODE_ALIGN as u32;
    let n = self.allocate(l);

    (n + Node::NODE_ALIGN as u32) & !(Node::NODE_ALIGN as u32)
  }

  /// Copies `key` into the arena and returns its offset.
  pub(crate) fn put_key(&self, key: &[u8]) -> u32 {
    let offset = self.allocate(key.len() as u32);
    unsafe {
      ptr::copy_nonoverlapping(key.as_ptr(), self.get_pointer_mut(offset as usize), key.len());
    }
    offset
  }

  /// ## Safety
  /// - `offset..offset + size` must lie inside a region reserved from this arena.
  #[inline]
  pub(crate) unsafe fn get_bytes(&self, offset: usize, size: usize) -> &[u8] {
    if offset == 0 {
      return &[];
    }
    slice::from_raw_parts(self.get_pointer(offset), size)
  }

  /// ## Safety
  /// - `offset` must be within the capacity of the arena.
  #[inline]
  pub(crate) unsafe fn get_pointer(&self, offset: usize) -> *const u8 {
    if offset == 0 {
      return ptr::null();
    }
    self.buf.ptr.as_ptr().add(offset)
  }

  /// ## Safety
  /// - `offset` must be within the capacity of the arena.
  #[inline]
  pub(crate) unsafe fn get_pointer_mut(&self, offset: usize) -> *mut u8 {
    if offset == 0 {
      return ptr::null_mut();
    }
    self.buf.ptr.as_ptr().add(offset)
  }
}

unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}
