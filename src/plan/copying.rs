use std::sync::Arc;

use crate::global_state::{CollectorState, Phase};
use crate::scheduler::ThreadPool;
use crate::vm::{HeapSpace, VMBinding};

/// The from-space and to-space sizes around one evacuation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionCopyStats {
    pub from_space_before: usize,
    pub to_space_before: usize,
    pub from_space_after: usize,
    pub to_space_after: usize,
}

impl RegionCopyStats {
    /// Bytes that arrived in the to-space.
    pub fn copied_bytes(&self) -> usize {
        self.to_space_after.saturating_sub(self.to_space_before)
    }
}

/// Hands the from-space to the heap for evacuation once marking is complete.
pub struct RegionCopier<VM: VMBinding> {
    vm: Arc<VM>,
    state: Arc<CollectorState>,
    pool: Option<Arc<dyn ThreadPool>>,
}

impl<VM: VMBinding> RegionCopier<VM> {
    pub fn new(
        vm: Arc<VM>,
        state: Arc<CollectorState>,
        pool: Option<Arc<dyn ThreadPool>>,
    ) -> Self {
        RegionCopier { vm, state, pool }
    }

    /// Evacuate the from-space. An empty from-space is exempted instead.
    pub fn copy_regions(&self) -> RegionCopyStats {
        debug_assert!(
            !self.state.is_concurrent_marking_active(),
            "Regions are copied after marking"
        );
        self.state.set_phase(Phase::RegionCopy);
        let heap = self.vm.heap();
        let from_space_before = heap.from_space_size();
        let to_space_before = heap.to_space_size();

        if from_space_before == 0 {
            heap.exempt_from_space();
        } else {
            heap.copy_from_space(self.pool.as_deref());
        }

        let stats = RegionCopyStats {
            from_space_before,
            to_space_before,
            from_space_after: heap.from_space_size(),
            to_space_after: heap.to_space_size(),
        };
        info!(
            "Region copy: from-space {}K -> {}K, to-space {}K -> {}K",
            stats.from_space_before / 1024,
            stats.from_space_after / 1024,
            stats.to_space_before / 1024,
            stats.to_space_after / 1024
        );
        stats
    }

    /// Leave the from-space in place for this cycle.
    pub fn exempt_regions(&self) {
        self.state.set_phase(Phase::RegionCopy);
        self.vm.heap().exempt_from_space();
        debug!("From-space exempted from copying");
    }
}
