//! Parallel marking with dynamic work splitting.
//!
//! A [`MarkingTask`] drains its own [`WorkStack`]: pop an entry, mark it, push its unmarked
//! children. Whenever the stack grows large, or is moderately large while some worker is idle,
//! the newest entries are split off into a new task on the pool. A task without a pool never
//! splits, which is how serial marking runs.

use std::cmp::max;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::global_state::CollectorState;
use crate::plan::tracing::{ObjectQueue, WeakRef, WeakStack, WorkStack};
use crate::scheduler::{GCWork, ThreadPool};
use crate::util::options::Options;
use crate::util::ObjectReference;
use crate::vm::{ObjectField, ObjectModel, VMBinding};

/// When a marking task gives away part of its stack.
#[derive(Copy, Clone, Debug)]
pub struct ForkPolicy {
    pub high_water: usize,
    pub low_water: usize,
    pub low_water_divisor: usize,
    /// The bulk path splits a stack across workers only above `workers * min_chunk_size`.
    pub min_chunk_size: usize,
}

impl ForkPolicy {
    pub fn new(options: &Options) -> Self {
        ForkPolicy {
            high_water: options.fork_high_water,
            low_water: options.fork_low_water,
            low_water_divisor: max(options.fork_low_water_divisor, 1),
            min_chunk_size: max(options.min_chunk_size, 1),
        }
    }

    /// How many entries a stack of `len` entries should give away, if any.
    pub fn fork_size(&self, len: usize, idle_workers: usize) -> Option<usize> {
        if len > self.high_water {
            Some(len / 2)
        } else if len > self.low_water && idle_workers > 0 {
            Some(max(len / self.low_water_divisor, 1))
        } else {
            None
        }
    }
}

/// What every marking task of a collector shares.
pub struct MarkingContext<VM: VMBinding> {
    pub vm: Arc<VM>,
    pub state: Arc<CollectorState>,
    pub policy: ForkPolicy,
}

impl<VM: VMBinding> MarkingContext<VM> {
    pub fn new(vm: Arc<VM>, state: Arc<CollectorState>, policy: ForkPolicy) -> Self {
        MarkingContext { vm, state, policy }
    }
}

/// Push the unmarked strong children of `object` onto `queue` and record its weak fields.
pub(crate) fn discover_children<OM: ObjectModel, Q: ObjectQueue>(
    om: &OM,
    object: ObjectReference,
    queue: &mut Q,
    weak_refs: &mut WeakStack,
) {
    if !om.has_reference_fields(object) {
        return;
    }
    om.scan_object(object, &mut |field| match field {
        ObjectField::Strong(child) => {
            if !om.is_marked(child) {
                queue.enqueue(child);
            }
        }
        ObjectField::Weak(referent) => weak_refs.push(WeakRef {
            holder: object,
            referent,
        }),
    });
}

/// Drains one work stack, forking parts of it to the pool as it grows.
pub struct MarkingTask<VM: VMBinding> {
    context: Arc<MarkingContext<VM>>,
    pool: Option<Arc<dyn ThreadPool>>,
    /// Marks made by this task and the tasks forked from it, shared with the caller that
    /// created the first of them.
    marked: Arc<AtomicUsize>,
    stack: WorkStack,
    weak_refs: WeakStack,
    newly_marked: usize,
}

impl<VM: VMBinding> MarkingTask<VM> {
    pub fn new(
        context: Arc<MarkingContext<VM>>,
        pool: Option<Arc<dyn ThreadPool>>,
        marked: Arc<AtomicUsize>,
        stack: WorkStack,
    ) -> Self {
        MarkingTask {
            context,
            pool,
            marked,
            stack,
            weak_refs: WeakStack::default(),
            newly_marked: 0,
        }
    }

    /// Mark everything reachable from the stack, then publish the mark count and the weak
    /// references found.
    pub fn run(&mut self) {
        let context = self.context.clone();
        let om = context.vm.object_model();
        while let Some(object) = self.stack.pop() {
            if om.mark_object(object) {
                continue;
            }
            self.newly_marked += 1;
            discover_children(om, object, &mut self.stack, &mut self.weak_refs);
            self.maybe_fork();
        }
        self.finish();
    }

    fn maybe_fork(&mut self) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        let len = self.stack.len();
        if len <= self.context.policy.low_water {
            return;
        }
        let Some(n) = self.context.policy.fork_size(len, pool.waiting_thread_number()) else {
            return;
        };
        let forked = self.stack.split_off_newest(n);
        trace!("Forking {} of {} entries", forked.len(), len);
        pool.add_work(Box::new(MarkingTask::new(
            self.context.clone(),
            Some(pool.clone()),
            self.marked.clone(),
            forked,
        )));
    }

    fn finish(&mut self) {
        let newly_marked = std::mem::take(&mut self.newly_marked);
        self.marked.fetch_add(newly_marked, Ordering::Relaxed);
        self.context.state.add_marked_objects(newly_marked);
        self.context.state.merge_weak_refs(&mut self.weak_refs);
    }
}

impl<VM: VMBinding> GCWork for MarkingTask<VM> {
    fn do_work(&mut self) {
        self.run();
    }

    fn name(&self) -> &'static str {
        "MarkingTask"
    }
}

/// Marks the transitive closure of a work stack, in parallel if it has a pool.
pub struct ParallelMarker<VM: VMBinding> {
    context: Arc<MarkingContext<VM>>,
    pool: Option<Arc<dyn ThreadPool>>,
}

impl<VM: VMBinding> ParallelMarker<VM> {
    pub fn new(context: Arc<MarkingContext<VM>>, pool: Option<Arc<dyn ThreadPool>>) -> Self {
        ParallelMarker { context, pool }
    }

    /// A marker that runs on the calling thread and never forks.
    pub fn serial(context: Arc<MarkingContext<VM>>) -> Self {
        Self::new(context, None)
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Mark everything reachable from `stack`. Returns when the closure is complete, with the
    /// number of objects this call marked.
    pub fn mark(&self, stack: WorkStack) -> usize {
        let marked = Arc::new(AtomicUsize::new(0));
        let len = stack.len();
        match self.pool.as_ref() {
            Some(pool) => {
                let workers = pool.max_active_thread_num();
                if workers > 1 && len >= workers * self.context.policy.min_chunk_size {
                    let parts = stack.split_into(workers);
                    debug!("Marking {} roots in {} tasks", len, parts.len());
                    for part in parts {
                        pool.add_work(Box::new(MarkingTask::new(
                            self.context.clone(),
                            Some(pool.clone()),
                            marked.clone(),
                            part,
                        )));
                    }
                    pool.wait_finish();
                } else {
                    // Too little to split up front. Run here and let the task fork as it grows.
                    debug!("Marking {} roots inline", len);
                    pool.start();
                    MarkingTask::new(
                        self.context.clone(),
                        Some(pool.clone()),
                        marked.clone(),
                        stack,
                    )
                    .run();
                    pool.drain_work_queue();
                }
            }
            None => {
                trace!("Marking {} roots serially", len);
                MarkingTask::new(self.context.clone(), None, marked.clone(), stack).run();
            }
        }
        // Every task of this call has finished, forks included.
        marked.load(Ordering::SeqCst)
    }
}
