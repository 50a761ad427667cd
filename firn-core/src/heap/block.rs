//! Block layout and header access.
//!
//! The heap is tiled into blocks. Every block boundary is the data address
//! of either a live object or a free block, and immediately before each
//! boundary sits a one-word [`TaggedPtr`] header. The rest of the layout
//! is derived, not stored: a used block's extent comes from its type
//! descriptor, a free block's from the size word at the start of its
//! payload. The entire heap walk is driven by headers alone; there are no
//! side tables.

use {
    super::tagged::TaggedPtr,
    crate::type_desc::TypeDescriptor,
    std::{mem::size_of, ptr::{self, NonNull}},
};

/// Alignment of block data addresses, and the per-block header footprint.
///
/// Must be a power of two, at least the size of a header word, and at
/// least the strictest alignment an object may need.
pub const HEAP_ALIGN: usize = 16;

/// Size of the free-block size word.
pub (crate) const WORD: usize = size_of::<usize>();

/// Round a payload size up to the block size granularity.
///
/// Every payload holds at least a size word, so the block can be threaded
/// onto the free list after the object dies.
pub (crate) const fn align_size(size: usize) -> usize
{
    let size = if size < WORD { WORD } else { size };
    (size + HEAP_ALIGN - 1) & !(HEAP_ALIGN - 1)
}

/// A block boundary, identified by its data address.
///
/// This is a bare address with typed accessors; it carries no liveness
/// guarantee of its own. All accessors are unsafe and require the address
/// to be a current block boundary of a live heap.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub (crate) struct BlockRef
{
    data: NonNull<u8>,
}

impl BlockRef
{
    /// Wrap a data address.
    pub (crate) fn from_data(data: NonNull<u8>) -> Self
    {
        debug_assert!(data.as_ptr() as usize % HEAP_ALIGN == 0);
        Self{data}
    }

    /// The data address.
    pub (crate) fn data(self) -> NonNull<u8>
    {
        self.data
    }

    /// The data address as an integer, for range comparisons.
    pub (crate) fn addr(self) -> usize
    {
        self.data.as_ptr() as usize
    }

    /// Location of the header word.
    ///
    /// # Safety
    ///
    /// The address must be a block boundary of a live heap. The first
    /// `HEAP_ALIGN` bytes of the heap storage are reserved so that this is
    /// in range even for the first block.
    pub (crate) unsafe fn header_ptr(self) -> *mut TaggedPtr
    {
        self.data.as_ptr().sub(size_of::<TaggedPtr>()).cast()
    }

    /// Read the header word.
    ///
    /// # Safety
    ///
    /// As for [`header_ptr`][`Self::header_ptr`].
    pub (crate) unsafe fn header(self) -> TaggedPtr
    {
        *self.header_ptr()
    }

    /// Overwrite the header word.
    ///
    /// # Safety
    ///
    /// As for [`header_ptr`][`Self::header_ptr`].
    pub (crate) unsafe fn set_header(self, header: TaggedPtr)
    {
        *self.header_ptr() = header;
    }

    /// Whether this is a free block.
    ///
    /// # Safety
    ///
    /// As for [`header_ptr`][`Self::header_ptr`].
    pub (crate) unsafe fn is_free(self) -> bool
    {
        self.header().free()
    }

    /// Whether this is a used block.
    ///
    /// # Safety
    ///
    /// As for [`header_ptr`][`Self::header_ptr`].
    pub (crate) unsafe fn is_used(self) -> bool
    {
        self.header().used()
    }

    /// Whether the block's MARK bit is set.
    ///
    /// # Safety
    ///
    /// As for [`header_ptr`][`Self::header_ptr`].
    pub (crate) unsafe fn is_marked(self) -> bool
    {
        self.header().mark()
    }

    /// The descriptor of the object stored in this used block.
    ///
    /// # Safety
    ///
    /// As for [`header_ptr`][`Self::header_ptr`]; additionally the block
    /// must be used and not mid-marking (MARK clear), otherwise the header
    /// does not hold a descriptor address.
    pub (crate) unsafe fn type_desc(self) -> &'static TypeDescriptor
    {
        debug_assert!(self.is_used() && !self.is_marked());
        // SAFETY: Used headers hold a descriptor address,
        //         and descriptors are never freed.
        &*self.header().get::<TypeDescriptor>()
    }

    /// The payload size of this free block.
    ///
    /// # Safety
    ///
    /// As for [`header_ptr`][`Self::header_ptr`]; the block must be free.
    pub (crate) unsafe fn free_size(self) -> usize
    {
        debug_assert!(self.is_free());
        *self.data.as_ptr().cast::<usize>()
    }

    /// The next block on the free list, if any.
    ///
    /// # Safety
    ///
    /// As for [`header_ptr`][`Self::header_ptr`]; the block must be free.
    pub (crate) unsafe fn next_free(self) -> Option<BlockRef>
    {
        debug_assert!(self.is_free());
        NonNull::new(self.header().get::<u8>()).map(Self::from_data)
    }

    /// Turn this block into a free block of the given payload size,
    /// linked to the given successor. MARK is cleared.
    ///
    /// # Safety
    ///
    /// As for [`header_ptr`][`Self::header_ptr`]; the payload must span at
    /// least `size` bytes of heap storage.
    pub (crate) unsafe fn make_free(self, size: usize, next: Option<BlockRef>)
    {
        debug_assert!(size >= WORD && size % HEAP_ALIGN == 0);

        ptr::write(self.data.as_ptr().cast::<usize>(), size);

        let mut header = TaggedPtr::null();
        if let Some(next) = next {
            header.set_ptr(next.data.as_ptr());
        }
        header.set_free(true);
        self.set_header(header);
    }

    /// Replace this free block's successor, keeping its size and tags.
    ///
    /// # Safety
    ///
    /// As for [`header_ptr`][`Self::header_ptr`]; the block must be free.
    pub (crate) unsafe fn set_next_free(self, next: Option<BlockRef>)
    {
        debug_assert!(self.is_free());
        let mut header = self.header();
        match next {
            Some(next) => header.set_ptr(next.data.as_ptr()),
            None => header.set_ptr(ptr::null::<u8>()),
        }
        self.set_header(header);
    }

    /// Turn this block into a used block of the given type.
    /// FREE and MARK are cleared; the payload is left untouched.
    ///
    /// # Safety
    ///
    /// As for [`header_ptr`][`Self::header_ptr`]; the block's payload must
    /// span at least `align_size(ty.size())` bytes of heap storage.
    pub (crate) unsafe fn set_type(self, ty: &'static TypeDescriptor)
    {
        self.set_header(TaggedPtr::new(ty));
    }

    /// The physically next block in the heap.
    ///
    /// For the last block this lands one header past the heap end; the
    /// caller must range-check before dereferencing.
    ///
    /// # Safety
    ///
    /// As for [`header_ptr`][`Self::header_ptr`]; a used block must not be
    /// mid-marking.
    pub (crate) unsafe fn following(self) -> BlockRef
    {
        let size = if self.is_free() {
            self.free_size()
        } else {
            self.type_desc().size()
        };

        // wrapping: the step past the last block leaves the allocation.
        let next = self.data.as_ptr()
            .wrapping_add(align_size(size) + HEAP_ALIGN);

        // SAFETY: Adding a nonzero offset to a nonnull address.
        Self::from_data(NonNull::new_unchecked(next))
    }
}
