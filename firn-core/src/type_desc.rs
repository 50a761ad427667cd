//! Type descriptors for managed objects.
//!
//! A [`TypeDescriptor`] stores the size of objects of one type, a pointer
//! to their destructor, and the offsets at which pointers to other managed
//! objects live inside them. The offsets can be iterated with
//! [`offsets`][`TypeDescriptor::offsets`].
//!
//! The offsets are stored in the same allocation as the descriptor,
//! terminated by a negative sentinel whose value is the byte distance from
//! the sentinel slot back to the descriptor base. The marker iterates the
//! offsets with a bare pointer kept in the object header; when it reaches
//! the sentinel, adding the sentinel to the slot address recovers the
//! descriptor without any side storage. Because of the trailing array,
//! descriptors can only be created on the heap, and they are handed out by
//! stable address for the lifetime of the program.

use std::{
    alloc::{Layout, alloc, handle_alloc_error},
    any::type_name,
    fmt,
    mem::{align_of, size_of},
    ptr::{self, NonNull},
    slice,
};

/// Destructor thunk for one object type.
///
/// The pointer passed in is the data address of the object being destroyed.
pub type DropFn = unsafe fn(NonNull<u8>);

/// Per-type record describing managed objects.
///
/// See the [module documentation][`self`] for the storage scheme.
#[repr(C)]
pub struct TypeDescriptor
{
    name: &'static str,
    size: usize,
    drop_fn: DropFn,
    num_offsets: usize,

    // INVARIANT: Followed in memory by num_offsets + 1 isize slots:
    //            the pointer offsets in order, then the sentinel.
    offsets: [isize; 0],
}

impl TypeDescriptor
{
    /// Create a descriptor from its parts.
    ///
    /// The offsets must name, in any fixed order, every field of the
    /// described type that holds a pointer to a managed object. They must
    /// be non-negative; the negative sentinel is appended by this method.
    ///
    /// The descriptor is allocated once and never freed; the returned
    /// reference is valid for the rest of the program.
    pub fn new(
        name: &'static str,
        size: usize,
        drop_fn: DropFn,
        offsets: &[isize],
    ) -> &'static TypeDescriptor
    {
        for &offset in offsets {
            assert!(offset >= 0, "negative pointer offset {offset}");
        }

        let layout = Self::layout_for(offsets.len());

        // SAFETY: The layout has non-zero size.
        let raw = unsafe { alloc(layout) };
        let Some(base) = NonNull::new(raw)
            else { handle_alloc_error(layout) };

        let this = base.cast::<TypeDescriptor>().as_ptr();
        let num_offsets = offsets.len();

        // SAFETY: The allocation is large enough for the descriptor
        //         followed by num_offsets + 1 offset slots.
        unsafe {
            ptr::write(
                this,
                TypeDescriptor{name, size, drop_fn, num_offsets, offsets: []},
            );

            let slots = (*this).offsets.as_mut_ptr();
            for (i, &offset) in offsets.iter().enumerate() {
                ptr::write(slots.add(i), offset);
            }

            // The sentinel leads from its own slot back to the descriptor.
            let sentinel = slots.add(num_offsets);
            ptr::write(sentinel, this as isize - sentinel as isize);

            &*this
        }
    }

    /// Create a descriptor for `T` with the given pointer offsets.
    ///
    /// The name, size, and destructor are derived from `T`; the destructor
    /// drops the object in place.
    pub fn of<T>(offsets: &[isize]) -> &'static TypeDescriptor
    {
        Self::new(type_name::<T>(), size_of::<T>(), drop_thunk::<T>, offsets)
    }

    /// Layout of a descriptor with `n` offsets plus the sentinel.
    fn layout_for(n: usize) -> Layout
    {
        let slots = n.checked_add(1)
            .and_then(|n| n.checked_mul(size_of::<isize>()))
            .expect("too many pointer offsets");
        Layout::from_size_align(size_of::<Self>() + slots, align_of::<Self>())
            .expect("too many pointer offsets")
    }

    /// The name of the described type.
    pub fn name(&self) -> &'static str
    {
        self.name
    }

    /// The size in bytes of objects of the described type.
    pub fn size(&self) -> usize
    {
        self.size
    }

    /// Whether the described type has pointers to other managed objects.
    pub fn has_pointers(&self) -> bool
    {
        self.num_offsets != 0
    }

    /// The pointer offsets, without the sentinel.
    pub fn offsets(&self) -> &[isize]
    {
        // SAFETY: Guaranteed by the construction in TypeDescriptor::new.
        unsafe { slice::from_raw_parts(self.offsets.as_ptr(), self.num_offsets) }
    }

    /// Pointer to the first offset slot.
    ///
    /// This is where the marker starts iterating. For a type without
    /// pointers it points directly at the sentinel.
    pub fn first_offset(&self) -> NonNull<isize>
    {
        // SAFETY: The trailing array directly follows the descriptor.
        unsafe { NonNull::new_unchecked(self.offsets.as_ptr() as *mut isize) }
    }

    /// Destroy the object at the given data address.
    ///
    /// # Safety
    ///
    /// The address must hold an initialized object of the described type
    /// that has not been destroyed already.
    pub unsafe fn destroy(&self, object: NonNull<u8>)
    {
        (self.drop_fn)(object)
    }
}

impl fmt::Debug for TypeDescriptor
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("offsets", &self.offsets())
            .finish()
    }
}

/// Destructor thunk that drops a `T` in place.
unsafe fn drop_thunk<T>(object: NonNull<u8>)
{
    ptr::drop_in_place(object.cast::<T>().as_ptr())
}

/// Types that can live on a managed heap.
///
/// The descriptor this trait hands out is what the collector uses to size,
/// trace, and destroy objects of the implementing type; it is the Rust
/// analogue of a static `type` member on each managed class. Implementors
/// typically keep it in a `OnceLock`, as descriptors never move once
/// created.
///
/// # Safety
///
/// `type_desc` must always return the same descriptor, the descriptor's
/// size must be at least `size_of::<Self>()`, and its offsets must name
/// exactly the fields of `Self` that hold pointers to managed objects.
pub unsafe trait Managed
{
    /// The descriptor shared by all objects of this type.
    fn type_desc() -> &'static TypeDescriptor;
}
