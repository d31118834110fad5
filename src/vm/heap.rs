use crate::scheduler::ThreadPool;

/// The heap the collector works on. The collector only decides when regions are evacuated;
/// how objects are copied is up to the heap.
pub trait HeapSpace: Send + Sync + 'static {
    /// Bytes allocated since the heap was created or last reset.
    fn allocated_size(&self) -> usize;
    /// Bytes that survived the last cycle.
    fn survived_size(&self) -> usize;
    /// Bytes allocated since the last cycle.
    fn recent_allocated_size(&self) -> usize;
    fn capacity(&self) -> usize;
    fn from_space_size(&self) -> usize;
    fn to_space_size(&self) -> usize;

    /// Evacuate the marked objects of the from-space into the to-space. Called while the world is
    /// stopped, after marking. The pool, if any, may be used to copy in parallel.
    fn copy_from_space(&self, pool: Option<&dyn ThreadPool>);

    /// Keep the from-space regions where they are for this cycle.
    fn exempt_from_space(&self);
}
