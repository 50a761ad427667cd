//! The managed heap.
//!
//! A [`Heap`] owns one contiguous byte region and hands out object storage
//! from it. Reclamation is by explicit [`gc`][`Heap::gc`]: the collector
//! marks everything reachable from the registered roots, then sweeps the
//! region linearly, destroying unreachable objects in place and coalescing
//! their storage into the free list. Objects never move, so the addresses
//! handed out stay valid for as long as the objects are reachable.
//!
//! The heap is single-threaded and non-reentrant: no heap operation may be
//! invoked from a managed object's destructor.

pub use self::{alloc::*, block::*, stats::*, tagged::*};

use {
    crate::type_desc::{Managed, TypeDescriptor},
    log::{debug, trace},
    std::{
        alloc::{Layout, alloc, dealloc, handle_alloc_error},
        mem::size_of,
        ptr::NonNull,
    },
};

mod alloc;
mod block;
mod mark;
mod stats;
mod sweep;
mod tagged;


/// Fixed-capacity managed heap.
///
/// The capacity is chosen at construction and never grows. Allocation is
/// first-fit from a free list threaded through the headers of free blocks;
/// exhaustion is reported, not recovered from.
pub struct Heap
{
    /// The owned byte region, of `heap_size() + HEAP_ALIGN` bytes.
    /// The leading `HEAP_ALIGN` bytes hold the first block's header.
    storage: NonNull<u8>,
    layout: Layout,

    /// First block boundary.
    heap_start: NonNull<u8>,

    /// One past the last payload byte.
    heap_end: NonNull<u8>,

    /// Head of the free list.
    ///
    /// INVARIANT: Chains through all and only the FREE blocks, acyclically.
    free_list: Option<BlockRef>,

    /// Registered roots, in insertion order. Duplicates are allowed.
    ///
    /// INVARIANT: Each entry is the data address of a used block.
    roots: Vec<NonNull<u8>>,
}

impl Heap
{
    /// Create a heap with the given capacity in bytes.
    ///
    /// The capacity is rounded down to a multiple of [`HEAP_ALIGN`] and
    /// must leave room for at least one minimal block. The storage is
    /// allocated from the global allocator; the heap starts as a single
    /// free block spanning the whole capacity.
    pub fn new(heap_size: usize) -> Self
    {
        let heap_size = heap_size & !(HEAP_ALIGN - 1);
        assert!(heap_size >= HEAP_ALIGN, "heap capacity too small");

        let layout =
            Layout::from_size_align(heap_size + HEAP_ALIGN, HEAP_ALIGN)
            .expect("heap capacity too large");

        // SAFETY: The layout has non-zero size.
        let raw = unsafe { alloc(layout) };
        let Some(storage) = NonNull::new(raw)
            else { handle_alloc_error(layout) };

        // SAFETY: Offsets within the fresh allocation.
        let (heap_start, heap_end) = unsafe {
            let start = storage.as_ptr().add(HEAP_ALIGN);
            let end = start.add(heap_size);
            (NonNull::new_unchecked(start), NonNull::new_unchecked(end))
        };

        let first = BlockRef::from_data(heap_start);
        // SAFETY: The block spans the entire fresh heap.
        unsafe { first.make_free(heap_size, None); }

        Heap{
            storage,
            layout,
            heap_start,
            heap_end,
            free_list: Some(first),
            roots: Vec::new(),
        }
    }

    /// The heap capacity in bytes.
    pub fn heap_size(&self) -> usize
    {
        self.heap_end.as_ptr() as usize - self.heap_start.as_ptr() as usize
    }

    /// The first block boundary.
    pub fn heap_start(&self) -> NonNull<u8>
    {
        self.heap_start
    }

    /// One past the last payload byte.
    pub fn heap_end(&self) -> NonNull<u8>
    {
        self.heap_end
    }

    /// Whether an address lies within the heap region.
    fn contains(&self, addr: NonNull<u8>) -> bool
    {
        let addr = addr.as_ptr() as usize;
        self.heap_start.as_ptr() as usize <= addr
            && addr < self.heap_end.as_ptr() as usize
    }

    /// Allocate storage for an object of the given type.
    ///
    /// First-fit over the free list; if that fails, adjacent free blocks
    /// are merged and the scan retried. Returns the object's data address,
    /// or [`None`] when no sufficient contiguous block exists even after
    /// merging. With `rooted`, the address is also registered as a root.
    ///
    /// The returned storage is uninitialized.
    ///
    /// # Safety
    ///
    /// The caller must initialize the object (including every pointer
    /// field the descriptor declares) before the next collection, stats
    /// pass with live counting, or dump.
    pub unsafe fn allocate(
        &mut self,
        ty: &'static TypeDescriptor,
        rooted: bool,
    ) -> Option<NonNull<u8>>
    {
        // No free blocks at all, don't even try.
        self.free_list?;

        let result = self.try_allocate(ty).or_else(|| {
            // No sufficiently sized block found using first-fit.
            trace!(
                "first fit failed for {} ({} bytes), merging free blocks",
                ty.name(),
                ty.size(),
            );
            self.merge_free_blocks();
            self.try_allocate(ty)
        });

        if let Some(data) = result {
            if rooted {
                self.register_root(data);
            }
        }
        result
    }

    /// Allocate storage for a `T` via its static descriptor.
    ///
    /// Exhaustion is reported as an [`AllocError`].
    ///
    /// # Safety
    ///
    /// As for [`allocate`][`Self::allocate`].
    pub unsafe fn allocate_object<T: Managed>(
        &mut self,
        rooted: bool,
    ) -> Result<NonNull<T>, AllocError>
    {
        let ty = T::type_desc();
        assert!(
            ty.size() >= size_of::<T>(),
            "descriptor for {} is smaller than the type",
            ty.name(),
        );

        match self.allocate(ty, rooted) {
            Some(data) => Ok(data.cast()),
            None => Err(AllocError{
                type_name: ty.name(),
                size: ty.size(),
                heap_size: self.heap_size(),
            }),
        }
    }

    /// Register a data address as a root.
    ///
    /// Roots keep the objects reachable from them alive across
    /// collections. The same address may be registered more than once.
    ///
    /// # Safety
    ///
    /// The address must be the data address of a live object of this heap,
    /// and the object must stay initialized while registered.
    pub unsafe fn register_root(&mut self, addr: NonNull<u8>)
    {
        assert!(
            addr.as_ptr() as usize % HEAP_ALIGN == 0,
            "misaligned root",
        );
        assert!(self.contains(addr), "root outside the heap");
        self.roots.push(addr);
    }

    /// Remove the first registered root equal to the given address.
    ///
    /// Removing an address that is not registered does nothing.
    pub fn remove_root(&mut self, addr: NonNull<u8>)
    {
        if let Some(i) = self.roots.iter().position(|&root| root == addr) {
            self.roots.remove(i);
        }
    }

    /// Collect garbage.
    ///
    /// Marks every object reachable from the root set, then rebuilds the
    /// free list: unreachable objects are destroyed exactly once, adjacent
    /// dead and free storage is coalesced, and every surviving object's
    /// MARK bit is clear again on return. Object addresses and pointer
    /// fields of surviving objects are unchanged.
    pub fn gc(&mut self)
    {
        for i in 0 .. self.roots.len() {
            let root = self.roots[i];
            // SAFETY: Roots are data addresses of live objects.
            unsafe { self.mark(root); }
        }

        // SAFETY: Everything reachable is marked, so the sweep only
        //         destroys unreachable objects.
        let outcome = unsafe { self.rebuild_free_list() };

        debug!(
            "collected heap of {} bytes: {} roots, {} objects destroyed, \
             {} free blocks",
            self.heap_size(),
            self.roots.len(),
            outcome.destroyed,
            outcome.free_blocks,
        );
    }
}

impl Drop for Heap
{
    fn drop(&mut self)
    {
        // Destructors of still-live objects are not run; only collections
        // destroy objects.
        // SAFETY: Storage and layout come from Heap::new.
        unsafe { dealloc(self.storage.as_ptr(), self.layout) }
    }
}
