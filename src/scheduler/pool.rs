use super::GCWork;

/// A pool of GC worker threads.
///
/// Packets added to a pool run once the pool is started. `wait_finish` is the barrier of the
/// pool: when it returns, every packet added before and every packet those packets added has
/// run, and the pool is stopped again.
pub trait ThreadPool: Send + Sync {
    /// Let workers pick up queued packets.
    fn start(&self);

    /// Start the pool if needed and block until no packet is queued or running. Panics if any
    /// packet panicked.
    fn wait_finish(&self);

    /// Run queued packets on the calling thread too, then `wait_finish`.
    fn drain_work_queue(&self);

    fn add_work(&self, work: Box<dyn GCWork>);

    /// The number of worker threads.
    fn thread_count(&self) -> usize;

    /// The number of workers that would pick up a packet right now.
    fn waiting_thread_number(&self) -> usize;

    fn max_active_thread_num(&self) -> usize;

    /// Limit how many workers run packets at the same time. Clamped to `1..=thread_count`.
    fn set_max_active_thread_num(&self, threads: usize);

    /// The scheduling niceness of the workers.
    fn priority(&self) -> i32;

    fn set_priority(&self, nice: i32);

    /// The number of queued packets.
    fn work_count(&self) -> usize;
}
