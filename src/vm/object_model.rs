use std::sync::atomic::AtomicU8;

use crate::util::mark_bit;
use crate::util::ObjectReference;

/// A reference field of an object, as reported by [`ObjectModel::scan_object`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectField {
    /// The target is traced.
    Strong(ObjectReference),
    /// The target is not traced. The holder is recorded for weak reference processing.
    Weak(ObjectReference),
}

/// Callback trait of [`ObjectModel::scan_object`].
pub trait FieldVisitor {
    /// Call this function for each non-null reference field.
    fn visit_field(&mut self, field: ObjectField);
}

/// This lets us use closures as FieldVisitor.
impl<F: FnMut(ObjectField)> FieldVisitor for F {
    fn visit_field(&mut self, field: ObjectField) {
        self(field)
    }
}

/// The per-object queries of the collector.
pub trait ObjectModel: Send + Sync + 'static {
    /// The mark byte of an object. The collector owns its content and keeps a
    /// [`mark_bit::MarkState`] in it. The binding resets it to white between cycles.
    fn mark_word(&self, object: ObjectReference) -> &AtomicU8;

    /// Whether the object has any reference field. Objects without one are marked but not
    /// scanned.
    fn has_reference_fields(&self, object: ObjectReference) -> bool;

    /// Report every non-null reference field of the object.
    fn scan_object<V: FieldVisitor>(&self, object: ObjectReference, visitor: &mut V);

    /// Whether the reference points into the collected heap. SATB log entries that do not are
    /// ignored.
    fn is_heap_object(&self, _object: ObjectReference) -> bool {
        true
    }

    /// The region tag of the region the object currently lives in.
    fn region_tag(&self, object: ObjectReference) -> usize;

    /// Mark the object. Returns `true` if it was already marked.
    #[inline(always)]
    fn mark_object(&self, object: ObjectReference) -> bool {
        mark_bit::mark(self.mark_word(object))
    }

    #[inline(always)]
    fn is_marked(&self, object: ObjectReference) -> bool {
        mark_bit::is_marked(self.mark_word(object))
    }

    /// Shade a white object gray. Returns `true` if this call did it.
    #[inline(always)]
    fn shade_object(&self, object: ObjectReference) -> bool {
        mark_bit::shade(self.mark_word(object))
    }
}
