//! The collector: one instance per heap, driving cycles of
//! initial-mark pause, concurrent marking, SATB remark and final-mark pause.

use std::cmp::max;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::global_state::{CollectorState, Phase};
use crate::plan::concurrent::barrier::SatbBarrier;
use crate::plan::concurrent::marking::{ForkPolicy, MarkingContext, ParallelMarker};
use crate::plan::concurrent::satb::SatbReconciler;
use crate::plan::concurrent::{Pause, StopTheWorld};
use crate::plan::copying::{RegionCopier, RegionCopyStats};
use crate::plan::finalization::Resurrector;
use crate::plan::roots::RootEnumerator;
use crate::plan::tracing::WorkStack;
use crate::scheduler::{ScopedPriorityOverride, ThreadPool, WorkerPool};
use crate::util::options::Options;
use crate::util::statistics::{CycleStats, GCStatistics, PhaseTimes};
use crate::vm::{HeapSpace, MutatorRegistry, ObjectModel, Scanning, VMBinding};

pub struct Collector<VM: VMBinding> {
    vm: Arc<VM>,
    options: Options,
    state: Arc<CollectorState>,
    pool: Option<Arc<dyn ThreadPool>>,
    marker: ParallelMarker<VM>,
    roots: RootEnumerator<VM>,
    reconciler: SatbReconciler<VM>,
    resurrector: Resurrector<VM>,
    copier: RegionCopier<VM>,
    statistics: Mutex<GCStatistics>,
    /// Held for the duration of `collect`, so cycles do not overlap.
    cycle_lock: Mutex<()>,
}

impl<VM: VMBinding> Collector<VM> {
    /// Create a collector for `vm`. Without a pool, every phase runs on the calling thread.
    pub fn new(vm: Arc<VM>, options: Options, pool: Option<Arc<dyn ThreadPool>>) -> Self {
        match crate::util::logger::try_init() {
            Ok(_) => debug!("satbgc initialized the logger."),
            Err(_) => debug!(
                "satbgc failed to initialize the logger. Possibly a logger has been initialized by user."
            ),
        }
        let state = Arc::new(CollectorState::new(&options));
        let context = Arc::new(MarkingContext::new(
            vm.clone(),
            state.clone(),
            ForkPolicy::new(&options),
        ));
        info!(
            "Collector created with {} worker(s)",
            pool.as_ref().map_or(0, |p| p.thread_count())
        );
        Collector {
            marker: ParallelMarker::new(context.clone(), pool.clone()),
            roots: RootEnumerator::new(vm.clone(), pool.clone()),
            reconciler: SatbReconciler::new(context, pool.clone(), &options),
            resurrector: Resurrector::new(vm.clone(), state.clone()),
            copier: RegionCopier::new(vm.clone(), state.clone(), pool.clone()),
            statistics: Mutex::new(GCStatistics::default()),
            cycle_lock: Mutex::new(()),
            vm,
            options,
            state,
            pool,
        }
    }

    /// Create a collector with a [`WorkerPool`] of `options.threads` workers. A single thread
    /// means serial collection and no pool.
    pub fn with_worker_pool(vm: Arc<VM>, options: Options) -> io::Result<Self> {
        let pool: Option<Arc<dyn ThreadPool>> = if options.threads > 1 {
            Some(Arc::new(WorkerPool::new(options.threads)?))
        } else {
            None
        };
        Ok(Self::new(vm, options, pool))
    }

    pub fn vm(&self) -> &Arc<VM> {
        &self.vm
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn state(&self) -> &Arc<CollectorState> {
        &self.state
    }

    pub fn pool(&self) -> Option<&Arc<dyn ThreadPool>> {
        self.pool.as_ref()
    }

    /// The write barrier mutators must run while concurrent marking is active.
    pub fn satb_barrier(&self) -> SatbBarrier<VM> {
        SatbBarrier::new(self.vm.clone(), self.state.clone())
    }

    /// Push all roots onto `stack`: static roots (deduplicated by slot), mutator roots,
    /// concurrency model roots and the finalization queue.
    pub fn enumerate_all_roots(&self, stack: &mut WorkStack) -> usize {
        self.state.set_phase(Phase::RootEnumeration);
        self.roots.enumerate_all_roots(stack)
    }

    /// Mark the closure of `stack` with the whole pool. Returns the number of objects marked.
    pub fn mark(&self, stack: &mut WorkStack) -> usize {
        self.marker.mark(std::mem::take(stack))
    }

    /// Mark the closure of `stack` while mutators run, with fewer workers at a lower priority.
    pub fn mark_concurrently(&self, stack: &mut WorkStack) -> usize {
        let _override = self.lower_pool_priority();
        self.mark_while_mutators_run(stack)
    }

    fn mark_while_mutators_run(&self, stack: &mut WorkStack) -> usize {
        self.state.set_phase(Phase::ConcurrentMark);
        self.marker.mark(std::mem::take(stack))
    }

    /// Limit the pool to the concurrent marking workers at the concurrent marking niceness
    /// until the returned guard is dropped.
    fn lower_pool_priority(&self) -> Option<ScopedPriorityOverride<'_>> {
        self.pool.as_deref().map(|pool| {
            ScopedPriorityOverride::new(
                pool,
                self.concurrent_mark_workers(pool),
                self.options.concurrent_mark_nice,
            )
        })
    }

    /// Concurrent marking followed by the concurrent SATB remark, both with the lowered pool
    /// settings. The settings are restored before a remark that does not converge stops the
    /// world. Returns whether the remark converged.
    fn mark_and_remark_concurrently(
        &self,
        stack: &mut WorkStack,
        times: &mut PhaseTimes,
        gc_count: usize,
    ) -> bool {
        let converged = {
            let _override = self.lower_pool_priority();
            times.measure(Phase::ConcurrentMark, || self.mark_while_mutators_run(stack));
            times.measure(Phase::Remark, || {
                self.state.set_phase(Phase::Remark);
                self.reconciler.reconcile_concurrently(stack)
            })
        };
        if !converged {
            self.pause_delay_hint(gc_count, Pause::ForcedRemark);
            times.measure(Phase::Remark, || {
                self.reconciler.finish_with_world_stopped(stack)
            });
        }
        converged
    }

    /// Ask the pause window how long to wait before `pause`, so it can take the largest
    /// pause the budget allows. The answer is reported, not waited for.
    fn pause_delay_hint(&self, gc_count: usize, pause: Pause) -> Duration {
        let delay_us = self.state.min_delay_before_max_pause(self.state.now_us());
        if delay_us > 0 {
            debug!(
                "[GC {}] The pause budget asks for a delay of {}us before {:?}",
                gc_count, delay_us, pause
            );
        }
        Duration::from_micros(delay_us)
    }

    fn concurrent_mark_workers(&self, pool: &dyn ThreadPool) -> usize {
        match self.options.concurrent_mark_workers {
            0 => max(pool.thread_count() / 2, 1),
            n => n.min(pool.thread_count()),
        }
    }

    /// Drain the SATB logs and trace what they hold until nothing new is logged. Returns
    /// `false` if that took too many rounds or too long and marking was finished with the
    /// world stopped.
    pub fn mark_satb_buffer(&self, stack: &mut WorkStack) -> bool {
        self.state.set_phase(Phase::Remark);
        self.reconciler.reconcile(stack)
    }

    /// Resurrect unmarked finalizable objects and mark everything they reach. Returns the
    /// number of objects resurrected.
    pub fn resurrect(&self, stack: &mut WorkStack) -> usize {
        self.state.set_phase(Phase::Resurrection);
        let resurrected = self.resurrector.resurrect(stack);
        self.marker.mark(std::mem::take(stack));
        resurrected
    }

    /// Concurrent mark, SATB remark, resurrection and weak reference processing, starting from
    /// the roots in `stack`. Returns whether the remark converged without stopping the world.
    pub fn trace_roots(&self, stack: &mut WorkStack) -> bool {
        let mut times = PhaseTimes::default();
        let gc_count = self.state.gc_count();
        let converged = self.mark_and_remark_concurrently(stack, &mut times, gc_count);
        self.resurrect(stack);
        self.process_weak_references();
        converged
    }

    /// Hand the weak references found in this cycle to the binding.
    pub fn process_weak_references(&self) {
        self.state.set_phase(Phase::WeakReferences);
        let weak_refs = self.state.take_weak_refs();
        debug!("Processing {} weak references", weak_refs.len());
        let om = self.vm.object_model();
        self.vm
            .scanning()
            .process_weak_references(weak_refs.into_vec(), &|object| om.is_marked(object));
    }

    /// Evacuate the from-space, or exempt it if copying is disabled. Must run after marking.
    pub fn copy_regions(&self) -> Option<RegionCopyStats> {
        if self.options.copy_regions {
            Some(self.copier.copy_regions())
        } else {
            self.copier.exempt_regions();
            None
        }
    }

    /// Run a whole cycle.
    pub fn collect(&self) -> CycleStats {
        let _cycle = self.cycle_lock.lock().unwrap();
        let cycle_start = Instant::now();
        let gc_count = self.state.prepare_cycle();
        let allocated_bytes = self.vm.heap().allocated_size();
        debug!(
            "[GC {}] {}K allocated since the last cycle, {}K capacity",
            gc_count,
            self.vm.heap().recent_allocated_size() / 1024,
            self.vm.heap().capacity() / 1024
        );
        let mut times = PhaseTimes::default();

        let pause_delay_hint = self.pause_delay_hint(gc_count, Pause::InitialMark);
        info!("[GC {}] Start", gc_count);

        let mut stack = WorkStack::new();
        {
            let _stw = StopTheWorld::new(&*self.vm, &self.state, Pause::InitialMark);
            times.measure(Phase::RootEnumeration, || {
                self.enumerate_all_roots(&mut stack)
            });
            self.state.set_concurrent_marking_active(true);
        }

        let satb_converged = self.mark_and_remark_concurrently(&mut stack, &mut times, gc_count);

        let final_mark_delay_hint = self.pause_delay_hint(gc_count, Pause::FinalMark);
        {
            let _stw = StopTheWorld::new(&*self.vm, &self.state, Pause::FinalMark);
            times.measure(Phase::Remark, || self.mark_satb_buffer(&mut stack));
            self.state.set_concurrent_marking_active(false);
            times.measure(Phase::Resurrection, || self.resurrect(&mut stack));
            times.measure(Phase::WeakReferences, || self.process_weak_references());
            times.measure(Phase::RegionCopy, || self.copy_regions());
            self.vm.mutators().destroy_expired_mutators();
        }
        self.state.finish_cycle();

        let stats = CycleStats {
            gc_count,
            marked_objects: self.state.marked_objects(),
            resurrected_objects: self.state.resurrected_objects(),
            satb_iterations: self.state.satb_iterations(),
            satb_converged,
            phase_times: times,
            allocated_bytes,
            survived_bytes: self.vm.heap().survived_size(),
            cycle_time: cycle_start.elapsed(),
            pause_time: Duration::from_micros(self.state.pause_time_us()),
            pauses_within_budget: self.state.pauses_within_budget(),
            pause_delay_hint,
            final_mark_delay_hint,
        };
        info!("[GC {}] End: {}", gc_count, stats);
        self.statistics.lock().unwrap().record_cycle(stats.clone());
        stats
    }

    /// See [`crate::util::pause_window::BoundedPauseWindow::min_delay_before_pause`]. Times are
    /// on the clock of [`CollectorState::now_us`].
    pub fn min_delay_before_pause(&self, now_us: u64, proposed_us: u64) -> u64 {
        self.state.min_delay_before_pause(now_us, proposed_us)
    }

    pub fn min_delay_before_max_pause(&self, now_us: u64) -> u64 {
        self.state.min_delay_before_max_pause(now_us)
    }

    pub fn statistics(&self) -> GCStatistics {
        self.statistics.lock().unwrap().clone()
    }
}

impl<VM: VMBinding> Drop for Collector<VM> {
    fn drop(&mut self) {
        if let Ok(statistics) = self.statistics.lock() {
            if statistics.cycles() > 0 {
                statistics.log_summary();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::util::test_util::mock_vm::{MockVM, OBJECT_ALIGN};
    use crate::util::test_util::panic_after;
    use crate::util::{mark_bit, ObjectReference};
    use crate::vm::ObjectField;

    fn options(threads: usize) -> Options {
        let mut options = Options::builtin();
        options.threads = threads;
        options
    }

    fn collector(vm: &Arc<MockVM>, threads: usize) -> Collector<MockVM> {
        Collector::with_worker_pool(vm.clone(), options(threads)).unwrap()
    }

    fn reachable(vm: &MockVM, roots: &[ObjectReference]) -> HashSet<ObjectReference> {
        let mut seen = HashSet::new();
        let mut todo = roots.to_vec();
        while let Some(object) = todo.pop() {
            if !seen.insert(object) {
                continue;
            }
            for field in vm.fields(object) {
                if let ObjectField::Strong(child) = field {
                    todo.push(child);
                }
            }
        }
        seen
    }

    /// A graph of `n` objects with up to four random edges each.
    fn random_graph(vm: &MockVM, n: usize, rng: &mut ChaCha8Rng) -> Vec<ObjectReference> {
        let objects: Vec<_> = (0..n).map(|_| vm.allocate_with(&[])).collect();
        for object in objects.iter() {
            let edges = rng.random_range(0..=4);
            let children = (0..edges)
                .map(|_| ObjectField::Strong(objects[rng.random_range(0..n)]))
                .collect();
            vm.set_fields(*object, children);
        }
        objects
    }

    #[test]
    fn marks_everything_reachable_from_all_roots() {
        let vm = Arc::new(MockVM::new(64));
        let garbage = vm.allocate_with(&[]);
        let leaf = vm.allocate_with(&[]);
        let from_static = vm.allocate_with(&[leaf]);
        let from_mutator = vm.allocate_with(&[]);
        let from_thread = vm.allocate_with(&[]);
        let from_queue = vm.allocate_with(&[]);
        let unreachable = vm.allocate_with(&[from_static, garbage]);

        vm.add_static_root(0, 0x100, Some(from_static));
        vm.add_static_root(0, 0x108, None);
        vm.add_mutator().add_root(from_mutator);
        vm.set_concurrency_roots(vec![from_thread]);
        vm.enqueue_for_finalization(from_queue);

        let collector = collector(&vm, 1);
        let mut stack = WorkStack::new();
        assert_eq!(collector.enumerate_all_roots(&mut stack), 4);
        assert_eq!(collector.mark(&mut stack), 5);
        assert!(stack.is_empty());

        for object in [leaf, from_static, from_mutator, from_thread, from_queue] {
            assert!(vm.is_marked(object));
        }
        assert!(!vm.is_marked(garbage));
        assert!(!vm.is_marked(unreachable));
        assert_eq!(collector.state().marked_objects(), 5);
    }

    #[test]
    fn parallel_marking_marks_each_object_once() {
        let vm = Arc::new(MockVM::new(5000));
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let objects = random_graph(&vm, 5000, &mut rng);
        let collector = collector(&vm, 4);
        assert!(collector.pool().is_some());

        // Few roots run inline and fork, many roots are split up front.
        for root_count in [3, 400] {
            vm.reset_marks();
            let roots: Vec<_> = (0..root_count)
                .map(|_| objects[rng.random_range(0..objects.len())])
                .collect();
            let expected = reachable(&vm, &roots);

            let mut stack = WorkStack::from_vec(roots);
            assert_eq!(collector.mark(&mut stack), expected.len());
            for object in objects.iter() {
                assert_eq!(vm.is_marked(*object), expected.contains(object));
            }
        }
    }

    #[test]
    fn serial_and_parallel_marking_agree() {
        let vm = Arc::new(MockVM::new(2000));
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let objects = random_graph(&vm, 2000, &mut rng);
        let roots = objects[..20].to_vec();

        let serial = collector(&vm, 1);
        let serial_marked = serial.mark(&mut WorkStack::from_vec(roots.clone()));
        let serial_set: HashSet<_> = objects.iter().filter(|o| vm.is_marked(**o)).collect();

        vm.reset_marks();
        let parallel = collector(&vm, 3);
        let parallel_marked = parallel.mark(&mut WorkStack::from_vec(roots));
        let parallel_set: HashSet<_> = objects.iter().filter(|o| vm.is_marked(**o)).collect();

        assert_eq!(serial_marked, parallel_marked);
        assert_eq!(serial_set, parallel_set);
    }

    #[test]
    fn satb_keeps_snapshot_reachable_objects() {
        let vm = Arc::new(MockVM::new(16));
        let c = vm.allocate_with(&[]);
        let b = vm.allocate_with(&[c]);
        let a = vm.allocate_with(&[b]);
        let mutator = vm.add_mutator();
        mutator.add_root(a);

        let collector = collector(&vm, 1);
        let barrier = collector.satb_barrier();
        let mut stack = WorkStack::new();
        collector.enumerate_all_roots(&mut stack);
        collector.state().set_concurrent_marking_active(true);

        // The mutator moves `b` out of the heap graph before the marker gets to it.
        vm.write_field(&barrier, mutator.log(), a, 0, None);
        assert_eq!(mutator.log().len(), 1);

        collector.mark_concurrently(&mut stack);
        assert!(vm.is_marked(a));
        assert!(!vm.is_marked(b));

        assert!(collector.mark_satb_buffer(&mut stack));
        assert!(vm.is_marked(b));
        assert!(vm.is_marked(c));
        assert!(mutator.log().is_empty());
    }

    #[test]
    fn barrier_is_inactive_outside_marking() {
        let vm = Arc::new(MockVM::new(4));
        let b = vm.allocate_with(&[]);
        let a = vm.allocate_with(&[b]);
        let mutator = vm.add_mutator();
        let collector = collector(&vm, 1);
        let barrier = collector.satb_barrier();

        vm.write_field(&barrier, mutator.log(), a, 0, None);
        assert!(mutator.log().is_empty());
        assert_eq!(vm.mark_state(b), mark_bit::MarkState::White);
    }

    #[test]
    fn concurrent_mutator_cannot_hide_objects() {
        const LENGTH: usize = 10_000;
        let vm = Arc::new(MockVM::new(LENGTH));
        let mut chain = Vec::with_capacity(LENGTH);
        let mut next: Option<ObjectReference> = None;
        for _ in 0..LENGTH {
            let object = match next {
                Some(next) => vm.allocate_with(&[next]),
                None => vm.allocate_with(&[]),
            };
            chain.push(object);
            next = Some(object);
        }
        chain.reverse();
        let mutator = vm.add_mutator();
        mutator.add_root(chain[0]);

        let collector = collector(&vm, 4);
        let barrier = collector.satb_barrier();
        let done = Arc::new(AtomicBool::new(false));

        let handle = {
            let vm = vm.clone();
            let mutator = mutator.clone();
            let chain = chain.clone();
            let done = done.clone();
            thread::spawn(move || {
                while !barrier.is_active() && !done.load(Ordering::SeqCst) {
                    thread::yield_now();
                }
                let mut cuts = 0;
                for object in chain.iter().step_by(97) {
                    let _mutation = vm.world().enter_mutation();
                    if !barrier.is_active() {
                        break;
                    }
                    if !vm.fields(*object).is_empty() {
                        vm.write_field(&barrier, mutator.log(), *object, 0, None);
                        cuts += 1;
                    }
                }
                cuts
            })
        };

        let stats = collector.collect();
        done.store(true, Ordering::SeqCst);
        let cuts = handle.join().unwrap();
        debug!("The mutator cut {} links during marking", cuts);

        for object in chain.iter() {
            assert!(vm.is_marked(*object));
        }
        assert_eq!(stats.marked_objects, LENGTH);
        assert!(!collector.state().is_concurrent_marking_active());
    }

    #[test]
    fn resurrection_marks_once_and_updates_the_tag() {
        let vm = Arc::new(MockVM::new(16));
        let child = vm.allocate_with(&[]);
        let finalizable = vm.allocate_with(&[child]);
        let live = vm.allocate_with(&[]);
        let root = vm.allocate_with(&[live]);
        vm.set_region_tag(finalizable, 7);
        vm.add_mutator().add_root(root);

        let first = vm.register_finalizer(finalizable);
        let second = vm.register_finalizer(finalizable);
        let live_slot = vm.register_finalizer(live);

        let collector = collector(&vm, 1);
        let mut stack = WorkStack::new();
        collector.enumerate_all_roots(&mut stack);
        collector.mark(&mut stack);
        assert!(!vm.is_marked(finalizable));

        assert_eq!(collector.resurrect(&mut stack), 1);
        assert!(vm.is_marked(finalizable));
        assert!(vm.is_marked(child));
        assert_eq!(vm.finalizer_slot(first).region_tag(), 7);
        assert_eq!(vm.finalizer_slot(first).object(), Some(finalizable));
        assert_eq!(vm.finalizer_slot(second).object(), Some(finalizable));
        assert_eq!(vm.finalizer_slot(live_slot).region_tag(), 0);
        assert_eq!(collector.state().resurrected_objects(), 1);

        // Nothing is left to resurrect.
        assert_eq!(collector.resurrect(&mut stack), 0);
        assert_eq!(collector.state().resurrected_objects(), 1);
    }

    #[test]
    fn remark_converges_after_a_burst() {
        let vm = Arc::new(MockVM::new(16));
        let burst: Vec<_> = (0..3).map(|_| vm.allocate_with(&[])).collect();
        let mutator = vm.add_mutator();
        mutator.set_script(burst.clone());

        let collector = collector(&vm, 1);
        let mut stack = WorkStack::new();
        collector.enumerate_all_roots(&mut stack);
        assert!(collector.trace_roots(&mut stack));
        assert_eq!(collector.state().satb_iterations(), 3);
        assert_eq!(mutator.script_len(), 0);
        for object in burst {
            assert!(vm.is_marked(object));
        }
        assert_eq!(vm.world().stops(), 0);
    }

    #[test]
    fn remark_stops_the_world_when_mutator_never_quiesces() {
        panic_after(10_000, || {
            let vm = Arc::new(MockVM::new(128));
            let flood: Vec<_> = (0..100).map(|_| vm.allocate_with(&[])).collect();
            let mutator = vm.add_mutator();
            mutator.set_script(flood);

            let mut options = options(1);
            options.satb_max_iterations = 5;
            let collector = Collector::new(vm.clone(), options, None);
            let mut stack = WorkStack::new();
            assert!(!collector.mark_satb_buffer(&mut stack));
            assert!(stack.is_empty());
            assert_eq!(collector.state().satb_iterations(), 5);
            assert_eq!(vm.world().stops(), 1);
            assert!(!vm.world().is_stopped());
            assert_eq!(collector.state().pause_window().len(), 1);
            assert_eq!(collector.state().current_pause(), None);
        })
    }

    #[test]
    fn static_roots_are_deduplicated() {
        let vm = Arc::new(MockVM::new(16));
        let shared = vm.allocate_with(&[]);
        let other = vm.allocate_with(&[]);
        vm.add_static_root(0, 0x100, Some(shared));
        vm.add_static_root(1, 0x100, Some(shared));
        vm.add_static_root(2, 0x100, Some(shared));
        vm.add_static_root(3, 0x200, Some(other));
        vm.add_static_root(3, 0x300, Some(shared));

        for threads in [1, 4] {
            let collector = collector(&vm, threads);
            let mut stack = WorkStack::new();
            assert_eq!(collector.enumerate_all_roots(&mut stack), 3);
            let mut roots = stack.into_vec();
            roots.sort();
            let mut expected = vec![shared, shared, other];
            expected.sort();
            assert_eq!(roots, expected);
        }
    }

    #[test]
    fn management_lock_is_skipped_while_stopped() {
        let vm = Arc::new(MockVM::new(16));
        let object = vm.allocate_with(&[]);
        let mutator = vm.add_mutator();
        mutator.add_root(object);
        mutator.log().log(object);
        let collector = collector(&vm, 1);

        vm.stop_all_mutators();
        let before = vm.management_acquisitions();
        let mut stack = WorkStack::new();
        assert_eq!(collector.enumerate_all_roots(&mut stack), 1);
        assert!(collector.mark_satb_buffer(&mut stack));
        assert_eq!(vm.management_acquisitions(), before);
        vm.resume_mutators();

        collector.enumerate_all_roots(&mut WorkStack::new());
        assert!(vm.management_acquisitions() > before);
    }

    #[test]
    fn concurrent_marking_restores_the_pool() {
        let vm = Arc::new(MockVM::new(16));
        let collector = collector(&vm, 4);
        let pool = collector.pool().unwrap().clone();
        assert_eq!(collector.concurrent_mark_workers(&*pool), 2);

        let root = vm.allocate_with(&[]);
        collector.mark_concurrently(&mut WorkStack::from_vec(vec![root]));
        assert_eq!(pool.max_active_thread_num(), 4);
        assert_eq!(pool.priority(), 0);
    }

    /// A [`WorkerPool`] that records its settings, and whether the world was stopped, each time
    /// the SATB remark asks how much work is queued.
    struct RecordingPool {
        pool: WorkerPool,
        vm: Arc<MockVM>,
        seen: Mutex<Vec<(usize, i32, bool)>>,
    }

    impl RecordingPool {
        fn new(vm: &Arc<MockVM>, threads: usize) -> Arc<Self> {
            Arc::new(RecordingPool {
                pool: WorkerPool::new(threads).unwrap(),
                vm: vm.clone(),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self, stopped: bool) -> Vec<(usize, i32)> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, _, s)| *s == stopped)
                .map(|(active, nice, _)| (*active, *nice))
                .collect()
        }
    }

    impl ThreadPool for RecordingPool {
        fn start(&self) {
            self.pool.start()
        }
        fn wait_finish(&self) {
            self.pool.wait_finish()
        }
        fn drain_work_queue(&self) {
            self.pool.drain_work_queue()
        }
        fn add_work(&self, work: Box<dyn crate::scheduler::GCWork>) {
            self.pool.add_work(work)
        }
        fn thread_count(&self) -> usize {
            self.pool.thread_count()
        }
        fn waiting_thread_number(&self) -> usize {
            self.pool.waiting_thread_number()
        }
        fn max_active_thread_num(&self) -> usize {
            self.pool.max_active_thread_num()
        }
        fn set_max_active_thread_num(&self, threads: usize) {
            self.pool.set_max_active_thread_num(threads)
        }
        fn priority(&self) -> i32 {
            self.pool.priority()
        }
        fn set_priority(&self, nice: i32) {
            self.pool.set_priority(nice)
        }
        fn work_count(&self) -> usize {
            self.seen.lock().unwrap().push((
                self.pool.max_active_thread_num(),
                self.pool.priority(),
                self.vm.world().is_stopped(),
            ));
            self.pool.work_count()
        }
    }

    fn recording_collector(
        vm: &Arc<MockVM>,
        options: Options,
    ) -> (Collector<MockVM>, Arc<RecordingPool>) {
        let pool = RecordingPool::new(vm, options.threads);
        let shared: Arc<dyn ThreadPool> = pool.clone();
        let collector = Collector::new(vm.clone(), options, Some(shared));
        (collector, pool)
    }

    #[test]
    fn concurrent_remark_runs_with_the_lowered_pool() {
        let vm = Arc::new(MockVM::new(16));
        let logged = vm.allocate_with(&[]);
        vm.add_mutator().log().log(logged);
        let mut options = options(4);
        options.concurrent_mark_nice = 3;
        let (collector, pool) = recording_collector(&vm, options);

        let stats = collector.collect();
        assert!(stats.satb_converged);
        assert!(vm.is_marked(logged));
        assert_eq!(pool.seen(false), vec![(2, 3)]);
        assert!(pool.seen(true).is_empty());
        assert_eq!(pool.max_active_thread_num(), 4);
        assert_eq!(pool.priority(), 0);
    }

    #[test]
    fn forced_remark_runs_with_the_restored_pool() {
        panic_after(10_000, || {
            let vm = Arc::new(MockVM::new(128));
            let flood: Vec<_> = (0..100).map(|_| vm.allocate_with(&[])).collect();
            vm.add_mutator().set_script(flood);
            let mut options = options(4);
            options.concurrent_mark_nice = 3;
            options.satb_max_iterations = 5;
            let (collector, pool) = recording_collector(&vm, options);

            let stats = collector.collect();
            assert!(!stats.satb_converged);
            assert_eq!(vm.world().stops(), 3);
            assert_eq!(pool.seen(false), vec![(2, 3); 5]);
            let stopped = pool.seen(true);
            assert!(!stopped.is_empty());
            assert!(stopped.iter().all(|settings| *settings == (4, 0)));
            assert_eq!(pool.max_active_thread_num(), 4);
            assert_eq!(pool.priority(), 0);
        })
    }

    #[test]
    fn final_mark_pause_is_reported() {
        let vm = Arc::new(MockVM::new(4));
        let mut options = options(1);
        options.pause_window_us = 20_000_000;
        options.pause_budget_us = 1_000;
        let collector = Collector::new(vm, options, None);
        let now = collector.state().now_us();
        assert!(!collector.state().record_pause(now, now + 5_000));

        let stats = collector.collect();
        assert!(stats.pause_delay_hint > Duration::ZERO);
        assert!(stats.final_mark_delay_hint > Duration::ZERO);
    }

    #[test]
    fn collect_records_both_pauses() {
        let vm = Arc::new(MockVM::new(16));
        let root = vm.allocate_with(&[]);
        vm.add_mutator().add_root(root);
        let collector = collector(&vm, 2);

        let stats = collector.collect();
        assert_eq!(stats.gc_count, 1);
        assert!(stats.satb_converged);
        assert_eq!(vm.world().stops(), 2);
        assert_eq!(collector.state().pause_window().len(), 2);
        assert_eq!(collector.state().phase(), Phase::Idle);
        assert_eq!(collector.state().current_pause(), None);

        vm.reset_marks();
        collector.collect();
        let statistics = collector.statistics();
        assert_eq!(statistics.cycles(), 2);
        assert_eq!(statistics.total_marked(), 2);
        assert_eq!(statistics.forced_remarks(), 0);
        assert_eq!(collector.state().pause_window().len(), 4);
    }

    #[test]
    fn weak_references_see_liveness() {
        let vm = Arc::new(MockVM::new(16));
        let dead = vm.allocate_with(&[]);
        let live = vm.allocate_with(&[]);
        let holder = vm.allocate(
            OBJECT_ALIGN,
            vec![
                ObjectField::Weak(dead),
                ObjectField::Weak(live),
                ObjectField::Strong(live),
            ],
        );
        vm.add_mutator().add_root(holder);

        let collector = collector(&vm, 1);
        collector.collect();
        assert!(!vm.is_marked(dead));

        let mut results = vm.weak_results();
        results.sort_by_key(|(weak_ref, _)| weak_ref.referent);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.holder, holder);
        assert_eq!(results[0].0.referent, dead);
        assert!(!results[0].1);
        assert_eq!(results[1].0.referent, live);
        assert!(results[1].1);
    }

    #[test]
    fn collect_copies_live_objects() {
        let vm = Arc::new(MockVM::new(16));
        let live = vm.allocate_with(&[]);
        let _garbage = vm.allocate_with(&[]);
        vm.add_mutator().add_root(live);

        let collector = collector(&vm, 2);
        let stats = collector.collect();
        assert_eq!(vm.copies(), 1);
        assert_eq!(vm.parallel_copies(), 1);
        assert_eq!(vm.exemptions(), 0);
        assert_eq!(stats.allocated_bytes, 2 * OBJECT_ALIGN);
        assert_eq!(stats.survived_bytes, OBJECT_ALIGN);
        assert_eq!(vm.to_space_size(), OBJECT_ALIGN);
        assert_eq!(vm.from_space_size(), 0);
    }

    #[test]
    fn copying_can_be_disabled() {
        let vm = Arc::new(MockVM::new(16));
        vm.allocate_with(&[]);
        let mut options = options(1);
        options.copy_regions = false;
        let collector = Collector::new(vm.clone(), options, None);
        collector.collect();
        assert_eq!(vm.copies(), 0);
        assert_eq!(vm.exemptions(), 1);
    }

    #[test]
    fn empty_from_space_is_exempted() {
        let vm = Arc::new(MockVM::new(4));
        let collector = collector(&vm, 1);
        let stats = collector.copy_regions().unwrap();
        assert_eq!(stats.from_space_before, 0);
        assert_eq!(stats.copied_bytes(), 0);
        assert_eq!(vm.copies(), 0);
        assert_eq!(vm.exemptions(), 1);
    }

    #[test]
    fn expired_mutators_are_destroyed() {
        let vm = Arc::new(MockVM::new(16));
        let logged = vm.allocate_with(&[]);
        let _running = vm.add_mutator();
        let exiting = vm.add_mutator();
        exiting.log().log(logged);
        vm.expire_mutator(&exiting);
        assert!(exiting.log().is_empty());

        let collector = collector(&vm, 1);
        collector.collect();
        assert_eq!(vm.mutator_count(), 1);
        assert!(vm.is_marked(logged));
        assert!(vm.retired_satb_log().is_empty());
    }

    #[test]
    fn pause_delay_follows_the_window() {
        let vm = Arc::new(MockVM::new(4));
        let mut options = options(1);
        options.pause_window_us = 20_000;
        options.pause_budget_us = 10_000;
        let collector = Collector::new(vm, options, None);
        collector.state().record_pause(0, 3_000);
        collector.state().record_pause(6_000, 9_000);
        collector.state().record_pause(12_000, 16_000);
        assert_eq!(collector.min_delay_before_pause(16_000, 3_000), 4_000);
    }
}
