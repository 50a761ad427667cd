//! Fixed-capacity managed heap with a precise,
//! non-moving mark-and-sweep garbage collector.
//!
//! Application objects are allocated from a single contiguous byte region
//! owned by a [`Heap`]. Each live object is preceded by a one-word header
//! that identifies its type and carries collector bookkeeping. A
//! [`TypeDescriptor`] per object type declares the object's size, its
//! destructor, and the byte offsets within it where pointers to other
//! managed objects live. The collector reaches live objects from an
//! explicit root set and reclaims the rest, destroying unreachable objects
//! in place and coalescing their storage into a free list.
//!
//! Marking uses the Deutsch–Schorr–Waite pointer-reversal technique:
//! traversal state lives in the object headers and pointer fields
//! themselves, so a collection needs no auxiliary space proportional to
//! the depth of the object graph.
//!
//! # Example
//!
//! ```
//! use firn_core::{heap::Heap, type_desc::{Managed, TypeDescriptor}};
//! use std::{mem::offset_of, ptr, sync::OnceLock};
//!
//! #[repr(C)]
//! struct Pair
//! {
//!     left: *mut Pair,
//!     right: *mut Pair,
//!     tag: u64,
//! }
//!
//! // SAFETY: The offsets name every managed pointer field of Pair.
//! unsafe impl Managed for Pair
//! {
//!     fn type_desc() -> &'static TypeDescriptor
//!     {
//!         static DESC: OnceLock<&'static TypeDescriptor> = OnceLock::new();
//!         *DESC.get_or_init(|| TypeDescriptor::of::<Pair>(&[
//!             offset_of!(Pair, left) as isize,
//!             offset_of!(Pair, right) as isize,
//!         ]))
//!     }
//! }
//!
//! let mut heap = Heap::new(4096);
//!
//! // SAFETY: The object is initialized before the next collection.
//! let pair = unsafe { heap.allocate_object::<Pair>(true) }.unwrap();
//! unsafe {
//!     pair.as_ptr().write(Pair{
//!         left: ptr::null_mut(),
//!         right: ptr::null_mut(),
//!         tag: 7,
//!     });
//! }
//!
//! heap.gc();
//! assert_eq!(unsafe { (*pair.as_ptr()).tag }, 7);
//! ```
//!
//! [`Heap`]: `heap::Heap`
//! [`TypeDescriptor`]: `type_desc::TypeDescriptor`

#![warn(missing_docs)]

pub mod heap;
pub mod type_desc;
