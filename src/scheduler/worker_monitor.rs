//! This module contains `WorkerMonitor`.  It allows workers to park until they may run a packet,
//! and lets the thread driving the pool wait until all packets have finished.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

/// Returned by `park_and_wait` when the worker should exit.
#[derive(Debug)]
pub(crate) struct WorkerShouldExit;

/// A data structure for synchronizing workers with each other and with the driving thread.
pub(crate) struct WorkerMonitor {
    /// The synchronized part.
    sync: Mutex<WorkerMonitorSync>,
    /// Workers wait on this when idle.  Notified if packets are added, the pool is started, the
    /// active limit is raised, or the pool shuts down.
    work_available: Condvar,
    /// The driving thread waits on this in `wait_for_completion`.
    all_finished: Condvar,
    /// Mirrors `sync.parker.parked_workers`, so it can be read without the lock.
    parked_workers: AtomicUsize,
}

/// The synchronized part of `WorkerMonitor`.
struct WorkerMonitorSync {
    parker: WorkerParker,
    /// Workers only pick up packets while the pool is started.
    started: bool,
    should_exit: bool,
    /// Packets that panicked since the last `wait_for_completion`.
    panicked_packets: usize,
}

/// This struct counts the number of workers parked.
struct WorkerParker {
    /// The total number of workers.
    worker_count: usize,
    /// Number of parked workers.
    parked_workers: usize,
}

impl WorkerParker {
    fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            parked_workers: 0,
        }
    }

    fn inc_parked_workers(&mut self) -> usize {
        debug_assert!(self.parked_workers < self.worker_count);
        self.parked_workers += 1;
        self.parked_workers
    }

    fn dec_parked_workers(&mut self) -> usize {
        debug_assert!(self.parked_workers > 0);
        self.parked_workers -= 1;
        self.parked_workers
    }
}

impl WorkerMonitor {
    pub fn new(worker_count: usize) -> Self {
        Self {
            sync: Mutex::new(WorkerMonitorSync {
                parker: WorkerParker::new(worker_count),
                started: false,
                should_exit: false,
                panicked_packets: 0,
            }),
            work_available: Default::default(),
            all_finished: Default::default(),
            parked_workers: AtomicUsize::new(0),
        }
    }

    pub fn start(&self) {
        let mut sync = self.sync.lock().unwrap();
        if !sync.started {
            sync.started = true;
            self.work_available.notify_all();
        }
    }

    pub fn request_exit(&self) {
        let mut sync = self.sync.lock().unwrap();
        sync.should_exit = true;
        self.work_available.notify_all();
    }

    /// Wake up workers after the state they wait on has changed. The state must be updated
    /// before calling this, so a worker that checks it under the lock cannot miss the change.
    pub fn notify_work_available(&self, all: bool) {
        let _sync = self.sync.lock().unwrap();
        if all {
            self.work_available.notify_all();
        } else {
            self.work_available.notify_one();
        }
    }

    pub fn parked_workers(&self) -> usize {
        self.parked_workers.load(Ordering::Relaxed)
    }

    /// Park a worker until the pool is started and `try_claim` succeeds. `try_claim` is called
    /// with the lock held, so claims of different workers are serialized.
    ///
    /// Returns `Err(WorkerShouldExit)` if the worker should exit now.
    pub fn park_and_wait<F>(&self, ordinal: usize, mut try_claim: F) -> Result<(), WorkerShouldExit>
    where
        F: FnMut() -> bool,
    {
        let mut sync = self.sync.lock().unwrap();
        loop {
            if sync.should_exit {
                return Err(WorkerShouldExit);
            }
            if sync.started && try_claim() {
                return Ok(());
            }
            let parked = sync.parker.inc_parked_workers();
            self.parked_workers.store(parked, Ordering::Relaxed);
            trace!(
                "Worker {} parked.  parked/total: {}/{}",
                ordinal,
                parked,
                sync.parker.worker_count
            );
            sync = self.work_available.wait(sync).unwrap();
            let parked = sync.parker.dec_parked_workers();
            self.parked_workers.store(parked, Ordering::Relaxed);
            trace!("Worker {} unparked.", ordinal);
        }
    }

    pub fn record_panic(&self) {
        self.sync.lock().unwrap().panicked_packets += 1;
    }

    pub fn notify_all_finished(&self) {
        let _sync = self.sync.lock().unwrap();
        self.all_finished.notify_all();
    }

    /// Block until `is_finished` holds, then stop the pool. Returns the number of packets that
    /// panicked since the last call.
    pub fn wait_for_completion<F>(&self, is_finished: F) -> usize
    where
        F: Fn() -> bool,
    {
        let mut sync = self.sync.lock().unwrap();
        while !is_finished() {
            sync = self.all_finished.wait(sync).unwrap();
        }
        sync.started = false;
        std::mem::take(&mut sync.panicked_packets)
    }
}
