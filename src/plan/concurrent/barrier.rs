use std::sync::Arc;

use crate::global_state::CollectorState;
use crate::util::ObjectReference;
use crate::vm::{ObjectModel, VMBinding};

/// A per-mutator log of objects recorded by the SATB barrier.
///
/// The owning mutator appends, the collector drains. Entries are not unique across logs, and
/// may already be marked by the time they are drained.
#[derive(Default, Debug)]
pub struct SatbLog {
    entries: spin::Mutex<Vec<ObjectReference>>,
}

impl SatbLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self, object: ObjectReference) {
        self.entries.lock().push(object);
    }

    /// Move all entries into `out`. Returns the number moved.
    pub fn drain_into(&self, out: &mut Vec<ObjectReference>) -> usize {
        let mut entries = self.entries.lock();
        let n = entries.len();
        out.append(&mut entries);
        n
    }

    /// Move all entries into another log, e.g. the retired log when a mutator exits.
    pub fn flush_into(&self, other: &SatbLog) {
        let mut moved = Vec::new();
        self.drain_into(&mut moved);
        if !moved.is_empty() {
            other.entries.lock().append(&mut moved);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// The snapshot-at-the-beginning write barrier.
///
/// While concurrent marking is active, the old value of every reference field a mutator
/// overwrites is shaded and logged. Everything reachable when marking started is therefore
/// either reached by the marker or found in some log.
pub struct SatbBarrier<VM: VMBinding> {
    vm: Arc<VM>,
    state: Arc<CollectorState>,
}

impl<VM: VMBinding> Clone for SatbBarrier<VM> {
    fn clone(&self) -> Self {
        SatbBarrier {
            vm: self.vm.clone(),
            state: self.state.clone(),
        }
    }
}

impl<VM: VMBinding> SatbBarrier<VM> {
    pub fn new(vm: Arc<VM>, state: Arc<CollectorState>) -> Self {
        SatbBarrier { vm, state }
    }

    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.state.is_concurrent_marking_active()
    }

    /// Call before overwriting a reference field whose current value is `old`.
    #[inline(always)]
    pub fn object_reference_write_pre(&self, log: &SatbLog, old: Option<ObjectReference>) {
        if !self.is_active() {
            return;
        }
        if let Some(old) = old {
            self.log_object(log, old);
        }
    }

    /// Call when a mutator loads the referent of a weak reference. A referent that escapes into
    /// a strong field during marking must be kept alive.
    #[inline(always)]
    pub fn load_weak_reference(&self, log: &SatbLog, referent: ObjectReference) {
        if self.is_active() {
            self.log_object(log, referent);
        }
    }

    #[cold]
    fn log_object(&self, log: &SatbLog, object: ObjectReference) {
        // Only the thread that shades the object logs it.
        if self.vm.object_model().shade_object(object) {
            log.log(object);
        }
    }
}
