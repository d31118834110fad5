use std::fmt;
use std::num::NonZeroUsize;

use static_assertions::{assert_eq_size, const_assert};

/// `ObjectReference` is an opaque, non-null handle to a heap object.
///
/// The collector never dereferences an object reference itself. Everything it needs to know
/// about an object (its mark word, its fields, its region) is asked of the binding through
/// [`crate::vm::ObjectModel`]. An `Option<ObjectReference>` stands for a nullable reference
/// and has the same size as a raw word.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialOrd, Ord, PartialEq)]
pub struct ObjectReference(NonZeroUsize);

assert_eq_size!(ObjectReference, Option<ObjectReference>);
assert_eq_size!(ObjectReference, usize);

impl ObjectReference {
    /// Cast a raw address to an object reference. Returns `None` for zero.
    pub fn from_raw_address(addr: usize) -> Option<ObjectReference> {
        NonZeroUsize::new(addr).map(ObjectReference)
    }

    /// Like `from_raw_address`, but assume `addr` is not zero.
    ///
    /// # Safety
    ///
    /// `addr` must not be zero.
    pub unsafe fn from_raw_address_unchecked(addr: usize) -> ObjectReference {
        debug_assert!(addr != 0);
        ObjectReference(NonZeroUsize::new_unchecked(addr))
    }

    pub fn to_raw_address(self) -> usize {
        self.0.get()
    }
}

impl fmt::Debug for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The raw content of a finalizer slot: an object address in the low bits and a region tag in
/// the top bits.
///
/// Region tags let a moving heap find out which region an object lives in without touching the
/// object. When a finalizable object is resurrected, its slot is rewritten with the tag derived
/// from the object's current region.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialEq, Default)]
pub struct TaggedRef(u64);

const_assert!(TaggedRef::TAG_SHIFT + TaggedRef::TAG_BITS == u64::BITS);
assert_eq_size!(TaggedRef, u64);

impl TaggedRef {
    /// The number of bits used by the region tag.
    pub const TAG_BITS: u32 = 16;
    /// Where the region tag starts.
    pub const TAG_SHIFT: u32 = 48;
    pub const MAX_REGION_TAG: usize = (1 << Self::TAG_BITS) - 1;
    const ADDRESS_MASK: u64 = (1 << Self::TAG_SHIFT) - 1;

    pub const NULL: TaggedRef = TaggedRef(0);

    /// An untagged reference to `object`.
    pub fn new(object: ObjectReference) -> TaggedRef {
        let addr = object.to_raw_address() as u64;
        assert!(
            addr & !Self::ADDRESS_MASK == 0,
            "{} does not fit below the region tag",
            object
        );
        TaggedRef(addr)
    }

    pub fn from_raw_bits(bits: u64) -> TaggedRef {
        TaggedRef(bits)
    }

    pub fn raw_bits(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.object().is_none()
    }

    pub fn object(self) -> Option<ObjectReference> {
        ObjectReference::from_raw_address((self.0 & Self::ADDRESS_MASK) as usize)
    }

    pub fn region_tag(self) -> usize {
        (self.0 >> Self::TAG_SHIFT) as usize
    }

    /// The same reference with its region tag replaced by `tag`.
    pub fn with_region_tag(self, tag: usize) -> TaggedRef {
        assert!(
            tag <= Self::MAX_REGION_TAG,
            "Region tag {} is out of range",
            tag
        );
        TaggedRef((self.0 & Self::ADDRESS_MASK) | ((tag as u64) << Self::TAG_SHIFT))
    }
}

impl fmt::Debug for TaggedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.object() {
            Some(object) => write!(f, "{}[region {}]", object, self.region_tag()),
            None => write!(f, "null[region {}]", self.region_tag()),
        }
    }
}
