//! An in-memory runtime for testing the collector.
//!
//! Objects live in a fixed table. Object `i` has the address `BASE + i * OBJECT_ALIGN`, a mark
//! byte, a list of reference fields, a region tag and a size. The mock also keeps static root
//! buckets, a set of mutators with SATB logs, a finalizer table and two-space heap accounting.
//! A [`MockWorld`] lets real threads act as mutators that the collector can stop.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock, RwLockReadGuard};

use crate::plan::concurrent::barrier::{SatbBarrier, SatbLog};
use crate::plan::tracing::WeakRef;
use crate::scheduler::ThreadPool;
use crate::util::{mark_bit, ObjectReference, TaggedRef};
use crate::vm::{
    FieldVisitor, FinalizerSlot, HeapSpace, Mutator, MutatorRegistry, ObjectField, ObjectModel,
    RootSlot, Scanning, VMBinding,
};

pub const BASE: usize = 0x1000_0000;
pub const OBJECT_ALIGN: usize = 16;
/// The region tag of newly allocated objects.
pub const FROM_SPACE_TAG: usize = 1;
/// The region tag of objects evacuated by [`HeapSpace::copy_from_space`].
pub const TO_SPACE_TAG: usize = 2;

pub struct MockObject {
    mark: AtomicU8,
    fields: spin::Mutex<Vec<ObjectField>>,
    region_tag: AtomicUsize,
    size: AtomicUsize,
}

impl Default for MockObject {
    fn default() -> Self {
        MockObject {
            mark: AtomicU8::new(0),
            fields: spin::Mutex::new(Vec::new()),
            region_tag: AtomicUsize::new(FROM_SPACE_TAG),
            size: AtomicUsize::new(0),
        }
    }
}

#[derive(Default)]
struct WorldState {
    stopped: bool,
    mutating: usize,
}

/// The safepoint protocol of the mock. A mutator thread writes the heap only inside
/// [`MockWorld::enter_mutation`], and stopping the world waits for those scopes to end.
#[derive(Default)]
pub struct MockWorld {
    state: Mutex<WorldState>,
    changed: Condvar,
    stops: AtomicUsize,
}

pub struct MutationGuard<'a> {
    world: &'a MockWorld,
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.world.state.lock().unwrap();
        state.mutating -= 1;
        self.world.changed.notify_all();
    }
}

impl MockWorld {
    /// Block while the world is stopped, then enter a scope in which the heap may be written.
    pub fn enter_mutation(&self) -> MutationGuard<'_> {
        let mut state = self.state.lock().unwrap();
        while state.stopped {
            state = self.changed.wait(state).unwrap();
        }
        state.mutating += 1;
        MutationGuard { world: self }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().unwrap().stopped
    }

    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        assert!(!state.stopped, "The world is already stopped");
        state.stopped = true;
        while state.mutating > 0 {
            state = self.changed.wait(state).unwrap();
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        assert!(state.stopped, "The world is not stopped");
        state.stopped = false;
        self.changed.notify_all();
    }

    /// How many times the world was stopped.
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

/// A mutator of the mock. Besides roots and an SATB log, it may hold a script of objects that it
/// logs one at a time, each time its log is drained while the world is running. This mimics a
/// mutator that keeps overwriting references during remark.
pub struct MockMutator {
    roots: spin::Mutex<Vec<ObjectReference>>,
    satb: SatbLog,
    script: spin::Mutex<Vec<ObjectReference>>,
    expired: AtomicBool,
    world: Arc<MockWorld>,
}

impl MockMutator {
    pub fn add_root(&self, object: ObjectReference) {
        self.roots.lock().push(object);
    }

    pub fn clear_roots(&self) {
        self.roots.lock().clear();
    }

    pub fn log(&self) -> &SatbLog {
        &self.satb
    }

    /// Objects to log one per drain. Logged in the order given.
    pub fn set_script(&self, mut objects: Vec<ObjectReference>) {
        objects.reverse();
        *self.script.lock() = objects;
    }

    pub fn script_len(&self) -> usize {
        self.script.lock().len()
    }
}

impl Mutator for MockMutator {
    fn scan_roots(&self, visitor: &mut dyn FnMut(ObjectReference)) {
        for object in self.roots.lock().iter() {
            visitor(*object);
        }
    }

    fn satb_log(&self) -> &SatbLog {
        &self.satb
    }

    fn drain_satb_log(&self, out: &mut Vec<ObjectReference>) -> usize {
        let mut n = self.satb.drain_into(out);
        if !self.world.is_stopped() {
            if let Some(object) = self.script.lock().pop() {
                out.push(object);
                n += 1;
            }
        }
        n
    }
}

pub struct MockVM {
    objects: Box<[MockObject]>,
    next_object: AtomicUsize,
    static_roots: spin::Mutex<Vec<Vec<RootSlot>>>,
    mutators: RwLock<Vec<Arc<MockMutator>>>,
    management: RwLock<()>,
    management_acquisitions: AtomicUsize,
    world: Arc<MockWorld>,
    retired: SatbLog,
    finalizers: RwLock<Vec<FinalizerSlot>>,
    finalization_queue: spin::Mutex<Vec<ObjectReference>>,
    concurrency_roots: spin::Mutex<Option<Vec<ObjectReference>>>,
    weak_results: spin::Mutex<Vec<(WeakRef, bool)>>,
    allocated: AtomicUsize,
    recent_allocated: AtomicUsize,
    survived: AtomicUsize,
    from_space: AtomicUsize,
    to_space: AtomicUsize,
    copies: AtomicUsize,
    parallel_copies: AtomicUsize,
    exemptions: AtomicUsize,
}

impl MockVM {
    pub fn new(capacity: usize) -> Self {
        MockVM {
            objects: (0..capacity).map(|_| MockObject::default()).collect(),
            next_object: AtomicUsize::new(0),
            static_roots: spin::Mutex::new(Vec::new()),
            mutators: RwLock::new(Vec::new()),
            management: RwLock::new(()),
            management_acquisitions: AtomicUsize::new(0),
            world: Arc::new(MockWorld::default()),
            retired: SatbLog::new(),
            finalizers: RwLock::new(Vec::new()),
            finalization_queue: spin::Mutex::new(Vec::new()),
            concurrency_roots: spin::Mutex::new(None),
            weak_results: spin::Mutex::new(Vec::new()),
            allocated: AtomicUsize::new(0),
            recent_allocated: AtomicUsize::new(0),
            survived: AtomicUsize::new(0),
            from_space: AtomicUsize::new(0),
            to_space: AtomicUsize::new(0),
            copies: AtomicUsize::new(0),
            parallel_copies: AtomicUsize::new(0),
            exemptions: AtomicUsize::new(0),
        }
    }

    fn index(&self, object: ObjectReference) -> Option<usize> {
        let address = object.to_raw_address();
        if address < BASE || (address - BASE) % OBJECT_ALIGN != 0 {
            return None;
        }
        let index = (address - BASE) / OBJECT_ALIGN;
        (index < self.object_count()).then_some(index)
    }

    fn object(&self, object: ObjectReference) -> &MockObject {
        let index = self
            .index(object)
            .unwrap_or_else(|| panic!("{} is not a mock object", object));
        &self.objects[index]
    }

    /// Allocate an object of `size` bytes with the given fields.
    pub fn allocate(&self, size: usize, fields: Vec<ObjectField>) -> ObjectReference {
        let index = self.next_object.fetch_add(1, Ordering::SeqCst);
        assert!(index < self.objects.len(), "The mock heap is full");
        let slot = &self.objects[index];
        *slot.fields.lock() = fields;
        slot.size.store(size, Ordering::SeqCst);
        self.allocated.fetch_add(size, Ordering::SeqCst);
        self.recent_allocated.fetch_add(size, Ordering::SeqCst);
        self.from_space.fetch_add(size, Ordering::SeqCst);
        ObjectReference::from_raw_address(BASE + index * OBJECT_ALIGN).unwrap()
    }

    /// Allocate an object with strong fields only.
    pub fn allocate_with(&self, children: &[ObjectReference]) -> ObjectReference {
        self.allocate(
            OBJECT_ALIGN,
            children.iter().copied().map(ObjectField::Strong).collect(),
        )
    }

    /// Allocate an object already marked, as objects allocated during marking are.
    pub fn allocate_black(&self, children: &[ObjectReference]) -> ObjectReference {
        let object = self.allocate_with(children);
        mark_bit::mark(self.mark_word(object));
        object
    }

    pub fn object_count(&self) -> usize {
        self.next_object.load(Ordering::SeqCst).min(self.objects.len())
    }

    pub fn all_objects(&self) -> impl Iterator<Item = ObjectReference> + '_ {
        (0..self.object_count())
            .map(|i| ObjectReference::from_raw_address(BASE + i * OBJECT_ALIGN).unwrap())
    }

    pub fn fields(&self, object: ObjectReference) -> Vec<ObjectField> {
        self.object(object).fields.lock().clone()
    }

    pub fn set_fields(&self, object: ObjectReference, fields: Vec<ObjectField>) {
        *self.object(object).fields.lock() = fields;
    }

    /// Overwrite field `index` of `object` through the SATB barrier, logging to `log`. Writing
    /// `None` removes the field.
    pub fn write_field(
        &self,
        barrier: &SatbBarrier<MockVM>,
        log: &SatbLog,
        object: ObjectReference,
        index: usize,
        new: Option<ObjectReference>,
    ) {
        let mut fields = self.object(object).fields.lock();
        let old = match fields.get(index) {
            Some(ObjectField::Strong(old)) => Some(*old),
            _ => None,
        };
        barrier.object_reference_write_pre(log, old);
        match new {
            Some(new) => fields[index] = ObjectField::Strong(new),
            None => {
                fields.remove(index);
            }
        }
    }

    pub fn mark_state(&self, object: ObjectReference) -> mark_bit::MarkState {
        mark_bit::load(self.mark_word(object))
    }

    pub fn reset_marks(&self) {
        for object in self.objects.iter() {
            mark_bit::clear(&object.mark);
        }
    }

    pub fn set_region_tag(&self, object: ObjectReference, tag: usize) {
        self.object(object).region_tag.store(tag, Ordering::SeqCst);
    }

    pub fn add_static_root(&self, bucket: usize, address: usize, object: Option<ObjectReference>) {
        let mut buckets = self.static_roots.lock();
        if buckets.len() <= bucket {
            buckets.resize_with(bucket + 1, Vec::new);
        }
        buckets[bucket].push(RootSlot { address, object });
    }

    pub fn add_mutator(&self) -> Arc<MockMutator> {
        let mutator = Arc::new(MockMutator {
            roots: spin::Mutex::new(Vec::new()),
            satb: SatbLog::new(),
            script: spin::Mutex::new(Vec::new()),
            expired: AtomicBool::new(false),
            world: self.world.clone(),
        });
        self.mutators.write().unwrap().push(mutator.clone());
        mutator
    }

    /// Retire a mutator whose thread exits. Its log moves to the retired log.
    pub fn expire_mutator(&self, mutator: &MockMutator) {
        mutator.satb.flush_into(&self.retired);
        mutator.expired.store(true, Ordering::SeqCst);
    }

    pub fn mutator_count(&self) -> usize {
        self.mutators.read().unwrap().len()
    }

    pub fn world(&self) -> &MockWorld {
        &self.world
    }

    pub fn management_acquisitions(&self) -> usize {
        self.management_acquisitions.load(Ordering::SeqCst)
    }

    /// Register `object` in the finalizer table. Returns the index of its slot.
    pub fn register_finalizer(&self, object: ObjectReference) -> usize {
        let mut table = self.finalizers.write().unwrap();
        table.push(FinalizerSlot::for_object(object));
        table.len() - 1
    }

    pub fn finalizer_slot(&self, index: usize) -> TaggedRef {
        self.finalizers.read().unwrap()[index].load()
    }

    pub fn enqueue_for_finalization(&self, object: ObjectReference) {
        self.finalization_queue.lock().push(object);
    }

    /// Enable concurrency model roots, reporting `roots`.
    pub fn set_concurrency_roots(&self, roots: Vec<ObjectReference>) {
        *self.concurrency_roots.lock() = Some(roots);
    }

    /// The weak references handed over by the last cycles, with the liveness of their referents.
    pub fn weak_results(&self) -> Vec<(WeakRef, bool)> {
        self.weak_results.lock().clone()
    }

    pub fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    pub fn parallel_copies(&self) -> usize {
        self.parallel_copies.load(Ordering::SeqCst)
    }

    pub fn exemptions(&self) -> usize {
        self.exemptions.load(Ordering::SeqCst)
    }
}

impl ObjectModel for MockVM {
    fn mark_word(&self, object: ObjectReference) -> &AtomicU8 {
        &self.object(object).mark
    }

    fn has_reference_fields(&self, object: ObjectReference) -> bool {
        !self.object(object).fields.lock().is_empty()
    }

    fn scan_object<V: FieldVisitor>(&self, object: ObjectReference, visitor: &mut V) {
        let fields = self.object(object).fields.lock().clone();
        for field in fields {
            visitor.visit_field(field);
        }
    }

    fn is_heap_object(&self, object: ObjectReference) -> bool {
        self.index(object).is_some()
    }

    fn region_tag(&self, object: ObjectReference) -> usize {
        self.object(object).region_tag.load(Ordering::SeqCst)
    }
}

impl Scanning for MockVM {
    fn static_root_buckets(&self) -> usize {
        self.static_roots.lock().len()
    }

    fn scan_static_root_bucket(&self, bucket: usize, visitor: &mut dyn FnMut(RootSlot)) {
        let slots = self.static_roots.lock()[bucket].clone();
        for slot in slots {
            visitor(slot);
        }
    }

    fn scan_finalizer_roots(&self, visitor: &mut dyn FnMut(ObjectReference)) {
        let queue = self.finalization_queue.lock().clone();
        for object in queue {
            visitor(object);
        }
    }

    fn scan_finalizable_slots(&self, visitor: &mut dyn FnMut(&FinalizerSlot)) {
        for slot in self.finalizers.read().unwrap().iter() {
            visitor(slot);
        }
    }

    fn has_concurrency_model_roots(&self) -> bool {
        self.concurrency_roots.lock().is_some()
    }

    fn scan_concurrency_model_roots(&self, visitor: &mut dyn FnMut(ObjectReference)) {
        let roots = self.concurrency_roots.lock().clone().unwrap_or_default();
        for object in roots {
            visitor(object);
        }
    }

    fn process_weak_references(
        &self,
        weak_refs: Vec<WeakRef>,
        is_live: &dyn Fn(ObjectReference) -> bool,
    ) {
        let mut results = self.weak_results.lock();
        for weak_ref in weak_refs {
            results.push((weak_ref, is_live(weak_ref.referent)));
        }
    }
}

impl MutatorRegistry for MockVM {
    type Mutator = MockMutator;
    type ManagementGuard<'a> = RwLockReadGuard<'a, ()>;

    fn world_stopped(&self) -> bool {
        self.world.is_stopped()
    }

    fn management_read_lock(&self) -> Self::ManagementGuard<'_> {
        self.management_acquisitions.fetch_add(1, Ordering::SeqCst);
        self.management.read().unwrap()
    }

    fn visit_all_mutators(&self, visitor: &mut dyn FnMut(&MockMutator)) {
        for mutator in self.mutators.read().unwrap().iter() {
            visitor(mutator.as_ref());
        }
    }

    fn destroy_expired_mutators(&self) {
        self.mutators
            .write()
            .unwrap()
            .retain(|m| !m.expired.load(Ordering::SeqCst));
    }

    fn retired_satb_log(&self) -> &SatbLog {
        &self.retired
    }

    fn stop_all_mutators(&self) {
        self.world.stop();
    }

    fn resume_mutators(&self) {
        self.world.resume();
    }
}

impl HeapSpace for MockVM {
    fn allocated_size(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    fn survived_size(&self) -> usize {
        self.survived.load(Ordering::SeqCst)
    }

    fn recent_allocated_size(&self) -> usize {
        self.recent_allocated.load(Ordering::SeqCst)
    }

    fn capacity(&self) -> usize {
        self.objects.len() * OBJECT_ALIGN
    }

    fn from_space_size(&self) -> usize {
        self.from_space.load(Ordering::SeqCst)
    }

    fn to_space_size(&self) -> usize {
        self.to_space.load(Ordering::SeqCst)
    }

    fn copy_from_space(&self, pool: Option<&dyn ThreadPool>) {
        let mut live = 0;
        for object in self.all_objects() {
            let o = self.object(object);
            if o.region_tag.load(Ordering::SeqCst) == FROM_SPACE_TAG
                && mark_bit::is_marked(&o.mark)
            {
                live += o.size.load(Ordering::SeqCst);
                o.region_tag.store(TO_SPACE_TAG, Ordering::SeqCst);
            }
        }
        self.to_space.fetch_add(live, Ordering::SeqCst);
        self.from_space.store(0, Ordering::SeqCst);
        self.survived.store(live, Ordering::SeqCst);
        self.recent_allocated.store(0, Ordering::SeqCst);
        self.copies.fetch_add(1, Ordering::SeqCst);
        if pool.is_some() {
            self.parallel_copies.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn exempt_from_space(&self) {
        self.survived
            .store(self.from_space.load(Ordering::SeqCst), Ordering::SeqCst);
        self.recent_allocated.store(0, Ordering::SeqCst);
        self.exemptions.fetch_add(1, Ordering::SeqCst);
    }
}

impl VMBinding for MockVM {
    type VMObjectModel = MockVM;
    type VMScanning = MockVM;
    type VMMutators = MockVM;
    type VMHeap = MockVM;

    fn object_model(&self) -> &MockVM {
        self
    }

    fn scanning(&self) -> &MockVM {
        self
    }

    fn mutators(&self) -> &MockVM {
        self
    }

    fn heap(&self) -> &MockVM {
        self
    }
}
