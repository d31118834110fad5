use std::sync::Arc;

use criterion::Criterion;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use satbgc::plan::WorkStack;
use satbgc::util::options::Options;
use satbgc::util::test_util::mock_vm::MockVM;
use satbgc::vm::ObjectField;
use satbgc::Collector;

const OBJECTS: usize = 100_000;
const ROOTS: usize = 64;

pub fn bench(c: &mut Criterion) {
    let vm = Arc::new(MockVM::new(OBJECTS));
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let objects: Vec<_> = (0..OBJECTS).map(|_| vm.allocate_with(&[])).collect();
    for object in objects.iter() {
        let children = (0..rng.random_range(1..=3))
            .map(|_| ObjectField::Strong(objects[rng.random_range(0..OBJECTS)]))
            .collect();
        vm.set_fields(*object, children);
    }
    let roots: Vec<_> = objects[..ROOTS].to_vec();

    for threads in [1, 4] {
        let mut options = Options::builtin();
        options.threads = threads;
        let collector = Collector::with_worker_pool(vm.clone(), options).unwrap();
        c.bench_function(&format!("mark {} objects, {} threads", OBJECTS, threads), |b| {
            b.iter(|| {
                vm.reset_marks();
                collector.mark(&mut WorkStack::from_vec(roots.clone()))
            })
        });
    }
}
