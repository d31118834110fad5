use crate::plan::concurrent::barrier::SatbLog;
use crate::util::ObjectReference;

/// A mutator as seen by the collector: a source of roots and an SATB log.
pub trait Mutator: Send + Sync {
    /// Report the roots held by this mutator (stack slots, registers, thread-local handles).
    fn scan_roots(&self, visitor: &mut dyn FnMut(ObjectReference));

    /// The log the SATB barrier of this mutator appends to.
    fn satb_log(&self) -> &SatbLog;

    /// Move the logged entries into `out`. Returns the number moved.
    fn drain_satb_log(&self, out: &mut Vec<ObjectReference>) -> usize {
        self.satb_log().drain_into(out)
    }
}

/// The set of mutators and the means to stop them.
pub trait MutatorRegistry: Send + Sync + 'static {
    type Mutator: Mutator;
    /// Held while the collector walks the mutator list, so no mutator is created or destroyed
    /// meanwhile. Released on drop.
    type ManagementGuard<'a>
    where
        Self: 'a;

    /// Whether all mutators are currently stopped at a safepoint.
    fn world_stopped(&self) -> bool;

    /// Acquire the mutator management lock for reading.
    fn management_read_lock(&self) -> Self::ManagementGuard<'_>;

    fn visit_all_mutators(&self, visitor: &mut dyn FnMut(&Self::Mutator));

    /// Destroy mutators whose threads have exited. Their SATB logs must already be in
    /// [`MutatorRegistry::retired_satb_log`].
    fn destroy_expired_mutators(&self);

    /// SATB entries of mutators that have exited.
    fn retired_satb_log(&self) -> &SatbLog;

    /// Stop all mutators at a safepoint. Blocks until they are all stopped.
    fn stop_all_mutators(&self);

    fn resume_mutators(&self);
}

/// Take the management lock for reading, unless the world is stopped, in which case the mutator
/// list cannot change anyway.
pub fn lock_management_unless_stopped<R: MutatorRegistry>(
    registry: &R,
) -> Option<R::ManagementGuard<'_>> {
    if registry.world_stopped() {
        None
    } else {
        Some(registry.management_read_lock())
    }
}
