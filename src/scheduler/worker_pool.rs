use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::deque::{Injector, Steal};

use super::priority::set_current_thread_nice;
use super::worker_monitor::WorkerMonitor;
use super::{GCWork, ThreadPool};

/// A fixed set of OS threads running [`GCWork`] packets from a shared queue.
pub struct WorkerPool {
    shared: Arc<WorkerPoolShared>,
    handles: Vec<JoinHandle<()>>,
}

struct WorkerPoolShared {
    queue: Injector<Box<dyn GCWork>>,
    monitor: WorkerMonitor,
    worker_count: usize,
    max_active: AtomicUsize,
    /// Workers that claimed a packet and have not finished it.
    running: AtomicUsize,
    /// Packets added and not finished yet, queued or running.
    pending: AtomicUsize,
    priority: AtomicI32,
}

impl WorkerPoolShared {
    fn poll(&self) -> Option<Box<dyn GCWork>> {
        loop {
            match self.queue.steal() {
                Steal::Success(work) => return Some(work),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    fn execute(&self, mut work: Box<dyn GCWork>) {
        let name = work.name();
        trace!("Executing {}", name);
        if panic::catch_unwind(AssertUnwindSafe(|| work.do_work())).is_err() {
            error!("Work packet {} panicked", name);
            self.monitor.record_panic();
        }
        // Release what the packet holds before anyone waiting on the pool can return.
        drop(work);
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.monitor.notify_all_finished();
        }
    }

    fn try_claim(&self) -> bool {
        if self.queue.is_empty()
            || self.running.load(Ordering::SeqCst) >= self.max_active.load(Ordering::SeqCst)
        {
            return false;
        }
        self.running.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn run(&self, ordinal: usize) {
        debug!("Worker {} started", ordinal);
        let mut applied_nice = 0;
        while self
            .monitor
            .park_and_wait(ordinal, || self.try_claim())
            .is_ok()
        {
            let nice = self.priority.load(Ordering::Relaxed);
            if nice != applied_nice {
                set_current_thread_nice(nice);
                applied_nice = nice;
            }
            if let Some(work) = self.poll() {
                self.execute(work);
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            if !self.queue.is_empty() {
                self.monitor.notify_work_available(false);
            }
        }
        debug!("Worker {} exited", ordinal);
    }
}

impl WorkerPool {
    /// Spawn `worker_count` worker threads. The pool starts stopped.
    pub fn new(worker_count: usize) -> io::Result<WorkerPool> {
        assert!(worker_count > 0, "A worker pool needs at least one worker");
        let shared = Arc::new(WorkerPoolShared {
            queue: Injector::new(),
            monitor: WorkerMonitor::new(worker_count),
            worker_count,
            max_active: AtomicUsize::new(worker_count),
            running: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            priority: AtomicI32::new(0),
        });

        let mut handles = Vec::with_capacity(worker_count);
        for ordinal in 0..worker_count {
            let worker = shared.clone();
            let spawned = thread::Builder::new()
                .name(format!("satbgc-worker-{}", ordinal))
                .spawn(move || worker.run(ordinal));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shared.monitor.request_exit();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(e);
                }
            }
        }
        Ok(WorkerPool { shared, handles })
    }
}

impl ThreadPool for WorkerPool {
    fn start(&self) {
        self.shared.monitor.start();
    }

    fn wait_finish(&self) {
        self.start();
        let shared = &self.shared;
        let panicked = shared
            .monitor
            .wait_for_completion(|| shared.pending.load(Ordering::SeqCst) == 0);
        if panicked > 0 {
            panic!("{} work packet(s) panicked", panicked);
        }
    }

    fn drain_work_queue(&self) {
        self.start();
        while let Some(work) = self.shared.poll() {
            self.shared.execute(work);
        }
        self.wait_finish();
    }

    fn add_work(&self, work: Box<dyn GCWork>) {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.shared.queue.push(work);
        self.shared.monitor.notify_work_available(false);
    }

    fn thread_count(&self) -> usize {
        self.shared.worker_count
    }

    fn waiting_thread_number(&self) -> usize {
        let shared = &self.shared;
        let free_slots = shared
            .max_active
            .load(Ordering::Relaxed)
            .saturating_sub(shared.running.load(Ordering::Relaxed));
        free_slots.min(shared.monitor.parked_workers())
    }

    fn max_active_thread_num(&self) -> usize {
        self.shared.max_active.load(Ordering::SeqCst)
    }

    fn set_max_active_thread_num(&self, threads: usize) {
        let threads = threads.clamp(1, self.shared.worker_count);
        self.shared.max_active.store(threads, Ordering::SeqCst);
        self.shared.monitor.notify_work_available(true);
    }

    fn priority(&self) -> i32 {
        self.shared.priority.load(Ordering::SeqCst)
    }

    fn set_priority(&self, nice: i32) {
        self.shared.priority.store(nice, Ordering::SeqCst);
    }

    fn work_count(&self) -> usize {
        self.shared.queue.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.monitor.request_exit();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("A worker thread panicked");
            }
        }
    }
}
