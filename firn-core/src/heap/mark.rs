//! The Deutsch–Schorr–Waite marker.
//!
//! The marker traces the object graph reachable from one root without an
//! auxiliary stack. All traversal state lives in memory that already
//! exists: the header of each object on the current path holds an
//! iterator into its type's offset array (with MARK set), and the pointer
//! field currently being followed holds a back-link to the parent object
//! instead of its real value. Advancing reverses one pointer; retreating
//! restores it and recovers the type descriptor through the sentinel at
//! the end of the offset array. When the traversal returns, every visited
//! header holds its descriptor again (now with MARK set) and every pointer
//! field holds its original value.
//!
//! The cost is O(fields) per reachable object and O(1) space regardless
//! of graph depth; cycles and shared subgraphs are cut off by the MARK
//! test on the advance step.

use {
    super::{BlockRef, Heap},
    crate::type_desc::TypeDescriptor,
    std::ptr::{self, NonNull},
};

impl Heap
{
    /// Mark everything reachable from one root.
    ///
    /// A root that is already marked (for example a duplicate registration
    /// of the same address) is left alone.
    ///
    /// # Safety
    ///
    /// The root must be the data address of an initialized live object of
    /// this heap, and every pointer field declared by any reachable
    /// object's descriptor must be null or hold the data address of an
    /// initialized live object.
    pub (super) unsafe fn mark(&mut self, root: NonNull<u8>)
    {
        if BlockRef::from_data(root).is_marked() {
            return;
        }

        let mut cur: *mut u8 = root.as_ptr();
        let mut prev: *mut u8 = ptr::null_mut();

        // INVARIANT: cur is non-null and points at a block of this heap;
        //            prev chains the reversed path back to the root.
        loop {
            let blk = BlockRef::from_data(NonNull::new_unchecked(cur));

            let mut header = blk.header();
            if !header.mark() {
                // First visit: mark and begin iterating the offsets.
                header.set_ptr(blk.type_desc().first_offset().as_ptr());
                header.set_mark(true);
            } else {
                header = header.advance_word();
            }
            blk.set_header(header);

            let offset = *header.get::<isize>();
            if offset >= 0 {
                // Advance: follow the pointer field at this offset.
                let field = cur.add(offset as usize) as *mut *mut u8;
                let target = *field;

                let visit = !target.is_null()
                    && !BlockRef::from_data(NonNull::new_unchecked(target))
                        .is_marked();
                if visit {
                    // Reverse the field: it now points back at the
                    // previous frame until we retreat through it.
                    *field = prev;
                    prev = cur;
                    cur = target;
                }
                // A null or already-marked target is skipped when the
                // next iteration advances the offset iterator.
            } else {
                // Retreat: the iterator reached the sentinel. Its value
                // leads from the sentinel slot back to the descriptor,
                // which goes back into the header; MARK stays set, so the
                // object is now permanently marked for this collection.
                let slot = header.get::<u8>();
                let ty = slot.offset(offset) as *const TypeDescriptor;
                header.set_ptr(ty);
                blk.set_header(header);

                if prev.is_null() {
                    // Retreated through the root; the traversal is done.
                    return;
                }

                // Pop one frame: the parent's current offset slot tells
                // us which field holds the back-link to restore.
                let parent = BlockRef::from_data(NonNull::new_unchecked(prev));
                let offset = *parent.header().get::<isize>();
                let field = prev.add(offset as usize) as *mut *mut u8;

                let child = cur;
                cur = prev;
                prev = *field;
                *field = child;
            }
        }
    }
}
