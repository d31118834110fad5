//! Root enumeration.
//!
//! Static roots are scanned in parallel: worker `i` of `W` scans buckets `i, i + W, ...` into
//! its own collection, and the collections are merged afterwards, keeping each slot address
//! once. Mutator roots, roots of the concurrency model and the finalization queue follow on the
//! calling thread.

use std::collections::HashSet;
use std::sync::Arc;

use crate::plan::tracing::WorkStack;
use crate::scheduler::{GCWork, ThreadPool};
use crate::vm::{
    lock_management_unless_stopped, Mutator, MutatorRegistry, RootSlot, Scanning, VMBinding,
};

type RootCollections = Arc<Vec<spin::Mutex<Vec<RootSlot>>>>;

/// Scans the static root buckets assigned to one worker.
struct ScanStaticRoots<VM: VMBinding> {
    vm: Arc<VM>,
    worker: usize,
    workers: usize,
    collections: RootCollections,
}

impl<VM: VMBinding> ScanStaticRoots<VM> {
    fn scan(&self) {
        let scanning = self.vm.scanning();
        let mut found = Vec::new();
        for bucket in (self.worker..scanning.static_root_buckets()).step_by(self.workers) {
            scanning.scan_static_root_bucket(bucket, &mut |slot| found.push(slot));
        }
        trace!("Worker {} found {} static root slots", self.worker, found.len());
        *self.collections[self.worker].lock() = found;
    }
}

impl<VM: VMBinding> GCWork for ScanStaticRoots<VM> {
    fn do_work(&mut self) {
        self.scan();
    }

    fn name(&self) -> &'static str {
        "ScanStaticRoots"
    }
}

pub struct RootEnumerator<VM: VMBinding> {
    vm: Arc<VM>,
    pool: Option<Arc<dyn ThreadPool>>,
}

impl<VM: VMBinding> RootEnumerator<VM> {
    pub fn new(vm: Arc<VM>, pool: Option<Arc<dyn ThreadPool>>) -> Self {
        RootEnumerator { vm, pool }
    }

    /// Push every root onto `stack`. Static slots reported by several buckets are pushed once.
    /// Returns the number of roots pushed.
    pub fn enumerate_all_roots(&self, stack: &mut WorkStack) -> usize {
        let before = stack.len();
        let statics = self.scan_static_roots(stack);
        let mutators = self.scan_mutator_roots(stack);

        let scanning = self.vm.scanning();
        if scanning.has_concurrency_model_roots() {
            scanning.scan_concurrency_model_roots(&mut |object| stack.push(object));
        }
        let finalizer_roots_start = stack.len();
        scanning.scan_finalizer_roots(&mut |object| stack.push(object));

        debug!(
            "Enumerated {} roots: {} static, {} from mutators, {} from the finalization queue",
            stack.len() - before,
            statics,
            mutators,
            stack.len() - finalizer_roots_start
        );
        stack.len() - before
    }

    fn scan_static_roots(&self, stack: &mut WorkStack) -> usize {
        let buckets = self.vm.scanning().static_root_buckets();
        let workers = match self.pool.as_ref() {
            Some(pool) => pool.max_active_thread_num().clamp(1, buckets.max(1)),
            None => 1,
        };
        let collections: RootCollections =
            Arc::new((0..workers).map(|_| Default::default()).collect());

        let tasks = (0..workers).map(|worker| ScanStaticRoots {
            vm: self.vm.clone(),
            worker,
            workers,
            collections: collections.clone(),
        });
        match self.pool.as_ref() {
            Some(pool) if workers > 1 => {
                for task in tasks {
                    pool.add_work(Box::new(task));
                }
                pool.wait_finish();
            }
            _ => tasks.for_each(|task| task.scan()),
        }

        let mut seen = HashSet::new();
        let mut pushed = 0;
        for collection in collections.iter() {
            for slot in collection.lock().drain(..) {
                if !seen.insert(slot.address) {
                    continue;
                }
                if let Some(object) = slot.object {
                    stack.push(object);
                    pushed += 1;
                }
            }
        }
        pushed
    }

    fn scan_mutator_roots(&self, stack: &mut WorkStack) -> usize {
        let mutators = self.vm.mutators();
        let _guard = lock_management_unless_stopped(mutators);
        let before = stack.len();
        mutators.visit_all_mutators(&mut |mutator| {
            mutator.scan_roots(&mut |object| stack.push(object));
        });
        stack.len() - before
    }
}
