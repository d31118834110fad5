use std::sync::Arc;

use crate::global_state::CollectorState;
use crate::plan::concurrent::marking::discover_children;
use crate::plan::tracing::{WeakStack, WorkStack};
use crate::vm::{ObjectModel, Scanning, VMBinding};

/// Keeps finalizable objects alive once they become unreachable, so their finalizers can run.
///
/// Each finalizer slot whose object is unmarked is rewritten with the object's current region
/// tag. The thread whose compare-and-swap succeeds marks the object and pushes its children for
/// tracing. An object that is already marked, whether reachable or resurrected earlier, is left
/// alone, so running this again resurrects nothing new.
pub struct Resurrector<VM: VMBinding> {
    vm: Arc<VM>,
    state: Arc<CollectorState>,
}

impl<VM: VMBinding> Resurrector<VM> {
    pub fn new(vm: Arc<VM>, state: Arc<CollectorState>) -> Self {
        Resurrector { vm, state }
    }

    /// Resurrect unmarked finalizable objects and push their children onto `stack`. Returns the
    /// number of objects resurrected. The caller traces `stack` afterwards.
    pub fn resurrect(&self, stack: &mut WorkStack) -> usize {
        let om = self.vm.object_model();
        let mut weak_refs = WeakStack::default();
        let mut resurrected = 0;
        let mut lost_races = 0;

        self.vm.scanning().scan_finalizable_slots(&mut |slot| {
            let old = slot.load();
            let Some(object) = old.object() else {
                return;
            };
            if om.is_marked(object) {
                return;
            }
            let new = old.with_region_tag(om.region_tag(object));
            if slot.compare_exchange(old, new).is_err() {
                lost_races += 1;
                return;
            }
            // Several slots may hold the same object. Only one resurrects it.
            if !om.mark_object(object) {
                resurrected += 1;
                discover_children(om, object, &mut *stack, &mut weak_refs);
            }
        });

        if lost_races > 0 {
            debug!("{} finalizer slots changed while resurrecting", lost_races);
        }
        self.state.add_marked_objects(resurrected);
        self.state.add_resurrected_objects(resurrected);
        self.state.merge_weak_refs(&mut weak_refs);
        debug!("Resurrected {} finalizable objects", resurrected);
        resurrected
    }
}
