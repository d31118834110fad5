use super::ThreadPool;

/// Set the scheduling niceness of the calling thread. Failures are logged and otherwise ignored:
/// an unprivileged process may lower the priority of its threads but not raise it again.
#[cfg(target_os = "linux")]
pub(crate) fn set_current_thread_nice(nice: i32) {
    // On Linux, PRIO_PROCESS with a thread id applies to that thread only.
    let tid = unsafe { libc::syscall(libc::SYS_gettid) } as libc::id_t;
    if unsafe { libc::setpriority(libc::PRIO_PROCESS, tid, nice) } != 0 {
        debug!(
            "Failed to set niceness of thread {} to {}: {}",
            tid,
            nice,
            std::io::Error::last_os_error()
        );
    } else {
        trace!("Set niceness of thread {} to {}", tid, nice);
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_current_thread_nice(nice: i32) {
    trace!("Thread niceness {} is not supported on this platform", nice);
}

/// Lowers how many workers of a pool are active, and at what priority, for as long as it is
/// alive. The previous settings are restored on drop, including when unwinding.
pub struct ScopedPriorityOverride<'a> {
    pool: &'a dyn ThreadPool,
    saved_active_threads: usize,
    saved_priority: i32,
}

impl<'a> ScopedPriorityOverride<'a> {
    pub fn new(pool: &'a dyn ThreadPool, active_threads: usize, priority: i32) -> Self {
        let saved_active_threads = pool.max_active_thread_num();
        let saved_priority = pool.priority();
        debug!(
            "Worker pool: {} active at nice {} (was {} at nice {})",
            active_threads, priority, saved_active_threads, saved_priority
        );
        pool.set_max_active_thread_num(active_threads);
        pool.set_priority(priority);
        ScopedPriorityOverride {
            pool,
            saved_active_threads,
            saved_priority,
        }
    }
}

impl Drop for ScopedPriorityOverride<'_> {
    fn drop(&mut self) {
        self.pool.set_max_active_thread_num(self.saved_active_threads);
        self.pool.set_priority(self.saved_priority);
    }
}
