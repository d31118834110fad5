use std::sync::atomic::{AtomicU64, Ordering};

use crate::util::{ObjectReference, TaggedRef};

/// One entry of the finalizer table: a tagged reference to an object that has a finalizer.
///
/// Resurrection rewrites a slot with a compare-and-swap, so the binding may update slots
/// concurrently (e.g. clear a slot whose finalizer was cancelled).
#[derive(Debug, Default)]
pub struct FinalizerSlot(AtomicU64);

impl FinalizerSlot {
    pub fn new(value: TaggedRef) -> Self {
        FinalizerSlot(AtomicU64::new(value.raw_bits()))
    }

    pub fn for_object(object: ObjectReference) -> Self {
        Self::new(TaggedRef::new(object))
    }

    pub fn load(&self) -> TaggedRef {
        TaggedRef::from_raw_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, value: TaggedRef) {
        self.0.store(value.raw_bits(), Ordering::Release)
    }

    /// Replace `current` with `new`. On failure, returns the value found in the slot.
    pub fn compare_exchange(
        &self,
        current: TaggedRef,
        new: TaggedRef,
    ) -> Result<TaggedRef, TaggedRef> {
        self.0
            .compare_exchange(
                current.raw_bits(),
                new.raw_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(TaggedRef::from_raw_bits)
            .map_err(TaggedRef::from_raw_bits)
    }
}
