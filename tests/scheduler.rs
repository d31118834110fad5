//! A parallel quicksort on the worker pool. Each packet partitions its values and adds one
//! packet per side, so the pool has to keep running packets added by packets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;
use satbgc::scheduler::{GCWork, ThreadPool, WorkerPool};

const NUM_WORKERS: usize = 8;

/// Sorts `values` into `out[offset..offset + values.len()]`.
struct Sort {
    values: Vec<usize>,
    offset: usize,
    out: Arc<Vec<AtomicUsize>>,
    pool: Arc<WorkerPool>,
}

impl Sort {
    fn child(&self, values: Vec<usize>, offset: usize) -> Sort {
        Sort {
            values,
            offset,
            out: self.out.clone(),
            pool: self.pool.clone(),
        }
    }
}

impl GCWork for Sort {
    fn do_work(&mut self) {
        match self.values.len() {
            0 => {}
            1 => self.out[self.offset].store(self.values[0], Ordering::SeqCst),
            _ => {
                let pivot = self.values[0];
                let (le, gt): (Vec<usize>, Vec<usize>) =
                    self.values[1..].iter().partition(|v| **v <= pivot);
                let pivot_index = self.offset + le.len();
                self.out[pivot_index].store(pivot, Ordering::SeqCst);

                let left = self.child(le, self.offset);
                let right = self.child(gt, pivot_index + 1);
                self.pool.add_work(Box::new(left));
                self.pool.add_work(Box::new(right));
            }
        }
    }
}

fn random_array(size: usize) -> Vec<usize> {
    let mut rng = rand::rng();
    (0..size).map(|_| rng.random_range(0..1_000_000)).collect()
}

fn parallel_sort(pool: &Arc<WorkerPool>, values: Vec<usize>) -> Vec<usize> {
    let out: Arc<Vec<AtomicUsize>> = Arc::new(values.iter().map(|_| AtomicUsize::new(0)).collect());
    pool.add_work(Box::new(Sort {
        values,
        offset: 0,
        out: out.clone(),
        pool: pool.clone(),
    }));
    pool.wait_finish();
    out.iter().map(|v| v.load(Ordering::SeqCst)).collect()
}

#[test]
fn quicksort() {
    let pool = Arc::new(WorkerPool::new(NUM_WORKERS).unwrap());
    let data = random_array(10_000);
    let mut expected = data.clone();
    expected.sort_unstable();

    assert_eq!(parallel_sort(&pool, data), expected);
    assert_eq!(pool.work_count(), 0);
}

#[test]
fn quicksort_with_one_active_worker() {
    let pool = Arc::new(WorkerPool::new(NUM_WORKERS).unwrap());
    pool.set_max_active_thread_num(1);
    assert_eq!(pool.max_active_thread_num(), 1);

    let data = random_array(2_000);
    let mut expected = data.clone();
    expected.sort_unstable();
    assert_eq!(parallel_sort(&pool, data), expected);
}

#[test]
fn pool_is_reusable() {
    let pool = Arc::new(WorkerPool::new(NUM_WORKERS).unwrap());
    for size in [0, 1, 100, 3_000] {
        let data = random_array(size);
        let mut expected = data.clone();
        expected.sort_unstable();
        assert_eq!(parallel_sort(&pool, data), expected);
    }
}
