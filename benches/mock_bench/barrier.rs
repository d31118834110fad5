use std::sync::Arc;

use criterion::Criterion;

use satbgc::util::options::Options;
use satbgc::util::test_util::mock_vm::MockVM;
use satbgc::Collector;

pub fn bench(c: &mut Criterion) {
    let vm = Arc::new(MockVM::new(16));
    let old = vm.allocate_with(&[]);
    let mutator = vm.add_mutator();
    let collector = Collector::new(vm.clone(), Options::builtin(), None);
    let barrier = collector.satb_barrier();

    c.bench_function("write barrier, marking inactive", |b| {
        b.iter(|| barrier.object_reference_write_pre(mutator.log(), Some(old)))
    });

    collector.state().set_concurrent_marking_active(true);
    c.bench_function("write barrier, object already shaded", |b| {
        b.iter(|| barrier.object_reference_write_pre(mutator.log(), Some(old)))
    });
}
