//! Concurrent marking: the SATB barrier, the parallel marker and SATB reconciliation.

pub mod barrier;
pub mod marking;
pub mod satb;

use bytemuck::NoUninit;

use crate::global_state::CollectorState;
use crate::vm::{MutatorRegistry, VMBinding};

/// The stop-the-world pauses of a cycle.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Copy, Clone, NoUninit)]
pub enum Pause {
    /// Roots are enumerated and the SATB barrier is switched on.
    InitialMark = 1,
    /// The SATB logs are drained, finalizable objects are resurrected, weak references are
    /// processed and regions are evacuated.
    FinalMark,
    /// The SATB remark did not converge and finishes with mutators stopped.
    ForcedRemark,
}

unsafe impl bytemuck::ZeroableInOption for Pause {}

unsafe impl bytemuck::PodInOption for Pause {}

/// Stops the world for as long as it is alive, unless the world is already stopped.
///
/// A scope that stopped the mutators resumes them on drop and records the pause in the pause
/// window of the collector.
pub struct StopTheWorld<'a, VM: VMBinding> {
    vm: &'a VM,
    state: &'a CollectorState,
    pause: Pause,
    previous_pause: Option<Pause>,
    /// When this scope stopped the mutators. `None` if they were already stopped.
    start_us: Option<u64>,
}

impl<'a, VM: VMBinding> StopTheWorld<'a, VM> {
    pub fn new(vm: &'a VM, state: &'a CollectorState, pause: Pause) -> Self {
        let mutators = vm.mutators();
        let start_us = if mutators.world_stopped() {
            None
        } else {
            let start_us = state.now_us();
            mutators.stop_all_mutators();
            debug!("Stopped the world for {:?}", pause);
            Some(start_us)
        };
        let previous_pause = state.current_pause();
        state.set_current_pause(Some(pause));
        StopTheWorld {
            vm,
            state,
            pause,
            previous_pause,
            start_us,
        }
    }

    /// Whether this scope stopped the mutators itself.
    pub fn stopped_here(&self) -> bool {
        self.start_us.is_some()
    }
}

impl<VM: VMBinding> Drop for StopTheWorld<'_, VM> {
    fn drop(&mut self) {
        self.state.set_current_pause(self.previous_pause);
        if let Some(start_us) = self.start_us {
            self.vm.mutators().resume_mutators();
            let end_us = self.state.now_us();
            if self.state.record_pause(start_us, end_us) {
                debug!("{:?} pause took {}us", self.pause, end_us - start_us);
            } else {
                warn!(
                    "{:?} pause took {}us and exceeded the pause budget",
                    self.pause,
                    end_us - start_us
                );
            }
        }
    }
}
