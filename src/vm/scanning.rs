use crate::plan::tracing::WeakRef;
use crate::util::ObjectReference;
use crate::vm::FinalizerSlot;

/// A static root: the address of a global slot and its content.
///
/// Several static root buckets may report the same slot. Root enumeration keeps only the first
/// report of each address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RootSlot {
    pub address: usize,
    pub object: Option<ObjectReference>,
}

/// VM-specific methods for finding roots.
pub trait Scanning: Send + Sync + 'static {
    /// The number of static root buckets. Buckets are scanned in parallel, bucket `i` by worker
    /// `i % workers`.
    fn static_root_buckets(&self) -> usize;

    /// Report every slot of one static root bucket. Called from GC worker threads.
    fn scan_static_root_bucket(&self, bucket: usize, visitor: &mut dyn FnMut(RootSlot));

    /// Report the objects on the finalization queue, i.e. objects resurrected in an earlier
    /// cycle whose finalizers have not run yet. They are roots.
    fn scan_finalizer_roots(&self, visitor: &mut dyn FnMut(ObjectReference));

    /// Visit every slot of the finalizer table.
    fn scan_finalizable_slots(&self, visitor: &mut dyn FnMut(&FinalizerSlot));

    /// Whether the runtime has roots owned by its concurrency model (e.g. thread objects that
    /// are not reachable from a mutator).
    fn has_concurrency_model_roots(&self) -> bool {
        false
    }

    /// Report the roots owned by the concurrency model. Only called if
    /// [`Scanning::has_concurrency_model_roots`] returns true, so a binding that enables it must
    /// implement this.
    fn scan_concurrency_model_roots(&self, _visitor: &mut dyn FnMut(ObjectReference)) {
        panic!("Concurrency model roots are enabled but there is no scan_concurrency_model_roots")
    }

    /// Process the weak references discovered in this cycle. `is_live` tells whether a referent
    /// was marked. Called while the world is stopped.
    fn process_weak_references(
        &self,
        _weak_refs: Vec<WeakRef>,
        _is_live: &dyn Fn(ObjectReference) -> bool,
    ) {
    }
}
