//! SATB reconciliation: drain the barrier logs and trace what they hold until nothing new turns
//! up, while mutators keep running.
//!
//! A mutator that keeps overwriting references can keep the logs from ever running dry. After
//! a bounded number of rounds, or a bounded amount of time, the reconciler stops the world and
//! finishes there.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::marking::{MarkingContext, ParallelMarker};
use super::{Pause, StopTheWorld};
use crate::plan::tracing::WorkStack;
use crate::scheduler::ThreadPool;
use crate::util::options::Options;
use crate::vm::{lock_management_unless_stopped, Mutator, MutatorRegistry, ObjectModel, VMBinding};

pub struct SatbReconciler<VM: VMBinding> {
    context: Arc<MarkingContext<VM>>,
    pool: Option<Arc<dyn ThreadPool>>,
    parallel: ParallelMarker<VM>,
    serial: ParallelMarker<VM>,
    parallel_threshold: usize,
    max_iterations: usize,
    max_duration: Duration,
}

impl<VM: VMBinding> SatbReconciler<VM> {
    pub fn new(
        context: Arc<MarkingContext<VM>>,
        pool: Option<Arc<dyn ThreadPool>>,
        options: &Options,
    ) -> Self {
        SatbReconciler {
            parallel: ParallelMarker::new(context.clone(), pool.clone()),
            serial: ParallelMarker::serial(context.clone()),
            context,
            pool,
            parallel_threshold: options.parallel_remark_threshold,
            max_iterations: options.satb_max_iterations,
            max_duration: Duration::from_millis(options.satb_max_duration_ms),
        }
    }

    /// Move the entries of every SATB log that are still unmarked onto `remark`. Returns the
    /// number of entries pushed.
    pub fn drain(&self, remark: &mut WorkStack) -> usize {
        let vm = &self.context.vm;
        let om = vm.object_model();
        let mutators = vm.mutators();

        let mut entries = Vec::new();
        {
            let _guard = lock_management_unless_stopped(mutators);
            mutators.visit_all_mutators(&mut |mutator| {
                mutator.drain_satb_log(&mut entries);
            });
        }
        mutators.retired_satb_log().drain_into(&mut entries);

        let before = remark.len();
        for object in entries {
            if om.is_heap_object(object) && !om.is_marked(object) {
                remark.push(object);
            }
        }
        remark.len() - before
    }

    fn trace(&self, stack: WorkStack) -> usize {
        let busy_pool = self.pool.as_ref().is_some_and(|p| p.work_count() > 0);
        if self.parallel.is_parallel() && (stack.len() >= self.parallel_threshold || busy_pool) {
            self.parallel.mark(stack)
        } else {
            self.serial.mark(stack)
        }
    }

    /// Drain and trace until a drain comes back empty. Returns `false` if that did not happen
    /// within the round or time limit, in which case marking was finished with the world
    /// stopped.
    pub fn reconcile(&self, remark: &mut WorkStack) -> bool {
        let converged = self.reconcile_concurrently(remark);
        if !converged {
            self.finish_with_world_stopped(remark);
        }
        converged
    }

    /// The concurrent part of [`Self::reconcile`]. Returns `false` when the round or time
    /// limit is hit, leaving the undrained entries on `remark` for
    /// [`Self::finish_with_world_stopped`].
    pub fn reconcile_concurrently(&self, remark: &mut WorkStack) -> bool {
        let start = Instant::now();
        let mut iterations = 0;
        let converged = loop {
            self.drain(remark);
            if remark.is_empty() {
                break true;
            }
            if iterations >= self.max_iterations || start.elapsed() >= self.max_duration {
                warn!(
                    "SATB remark did not converge after {} rounds in {:?}, stopping the world",
                    iterations,
                    start.elapsed()
                );
                break false;
            }
            let n = remark.len();
            let marked = self.trace(std::mem::take(remark));
            trace!("SATB round {}: {} entries, {} newly marked", iterations, n, marked);
            iterations += 1;
        };
        self.context.state.add_satb_iterations(iterations);
        debug!(
            "SATB remark finished after {} rounds in {:?}",
            iterations,
            start.elapsed()
        );
        converged
    }

    /// Finish the remark in a [`Pause::ForcedRemark`] pause.
    pub fn finish_with_world_stopped(&self, remark: &mut WorkStack) {
        let _stw = StopTheWorld::new(&*self.context.vm, &self.context.state, Pause::ForcedRemark);
        loop {
            self.drain(remark);
            if remark.is_empty() {
                break;
            }
            self.trace(std::mem::take(remark));
        }
    }
}
