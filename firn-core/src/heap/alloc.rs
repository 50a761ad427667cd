//! First-fit allocation over the free list.

use {
    super::{BlockRef, HEAP_ALIGN, Heap, WORD, align_size},
    crate::type_desc::TypeDescriptor,
    std::ptr::NonNull,
    thiserror::Error,
};

/// Returned when the heap has no sufficient contiguous free block,
/// even after merging.
#[derive(Debug, Error)]
#[error("no contiguous free block of {size} bytes for {type_name} \
         (heap capacity {heap_size})")]
pub struct AllocError
{
    /// Name of the type that was being allocated.
    pub type_name: &'static str,

    /// Requested object size in bytes.
    pub size: usize,

    /// Capacity of the heap that refused the request.
    pub heap_size: usize,
}

impl Heap
{
    /// First-fit scan of the free list.
    ///
    /// The first fitting block is either consumed whole (when its size
    /// matches the request exactly) or split, leaving the surplus on the
    /// free list in place of the original block. A block whose surplus is
    /// too small to carry a free block of its own is skipped; consuming it
    /// would orphan the surplus bytes and break the heap tiling.
    ///
    /// # Safety
    ///
    /// The free list must be consistent and all MARK bits clear.
    pub (super) unsafe fn try_allocate(
        &mut self,
        ty: &'static TypeDescriptor,
    ) -> Option<NonNull<u8>>
    {
        let needed = align_size(ty.size());
        // Minimum room for a split-off remainder block.
        let slack = 2 * WORD + HEAP_ALIGN;

        let mut prev: Option<BlockRef> = None;
        let mut cur = self.free_list;
        while let Some(blk) = cur {
            let size = blk.free_size();
            if size == needed || size >= needed + slack {
                break;
            }
            prev = cur;
            cur = blk.next_free();
        }
        let blk = cur?;

        let size = blk.free_size();
        let mut next = blk.next_free();

        if size >= needed + slack {
            // Split: the remainder becomes a free block of its own,
            // directly after the allocated block.
            let rest = BlockRef::from_data(NonNull::new_unchecked(
                blk.data().as_ptr().add(needed + HEAP_ALIGN),
            ));
            rest.make_free(size - needed - HEAP_ALIGN, next);
            next = Some(rest);
        }

        // Unlink and stamp.
        match prev {
            Some(prev) => prev.set_next_free(next),
            None => self.free_list = next,
        }
        blk.set_type(ty);

        Some(blk.data())
    }

    /// Merge every run of contiguous free blocks into one block and
    /// rebuild the free list in ascending address order.
    ///
    /// Used objects are untouched; no destructors run. This is the
    /// allocate slow path; the sweep coalesces independently.
    ///
    /// # Safety
    ///
    /// The heap tiling must be intact and all MARK bits clear.
    pub (super) unsafe fn merge_free_blocks(&mut self)
    {
        let mut head: Option<BlockRef> = None;
        let mut tail: Option<BlockRef> = None;

        let end = self.heap_end().as_ptr() as usize;
        let mut cur = BlockRef::from_data(self.heap_start());
        while cur.addr() < end {
            if cur.is_used() {
                cur = cur.following();
                continue;
            }

            // Extend the free block over the whole contiguous free run.
            let run_start = cur;
            let mut run_end = cur.following();
            while run_end.addr() < end && run_end.is_free() {
                run_end = run_end.following();
            }

            run_start.make_free(run_end.addr() - run_start.addr() - HEAP_ALIGN, None);
            match tail {
                Some(tail) => tail.set_next_free(Some(run_start)),
                None => head = Some(run_start),
            }
            tail = Some(run_start);

            cur = run_end;
        }

        self.free_list = head;
    }

    /// Return a block to the free list without collecting.
    ///
    /// The block is pushed onto the head of the free list; its destructor
    /// is *not* run. This is the manual-free primitive underneath the
    /// collector; most callers should let `gc` reclaim objects instead.
    ///
    /// # Safety
    ///
    /// The address must be the data address of a used block of this heap,
    /// no collection may be in progress (MARK clear), and the object must
    /// not be reachable from any root or live object afterwards.
    pub unsafe fn deallocate(&mut self, addr: NonNull<u8>)
    {
        let blk = BlockRef::from_data(addr);
        assert!(blk.is_used(), "deallocate of a free block");
        assert!(!blk.is_marked(), "deallocate during a collection");

        let size = align_size(blk.type_desc().size());
        blk.make_free(size, self.free_list);
        self.free_list = Some(blk);
    }
}
