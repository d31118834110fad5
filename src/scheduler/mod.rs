//! GC worker threads and the packets they run.

mod pool;
mod priority;
mod work;
mod worker_monitor;
mod worker_pool;

pub use self::pool::ThreadPool;
pub use self::priority::ScopedPriorityOverride;
pub use self::work::GCWork;
pub use self::worker_pool::WorkerPool;
