use std::any::type_name;

/// A unit of work run by a [`super::ThreadPool`].
///
/// A packet owns everything it needs. It may add more packets to the pool it runs on, but must
/// not wait for the pool to finish.
pub trait GCWork: 'static + Send {
    fn do_work(&mut self);

    /// Name used in logs. Defaults to the type name of the packet.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}
