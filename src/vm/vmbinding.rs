use super::{HeapSpace, MutatorRegistry, ObjectModel, Scanning};

/// The `VMBinding` trait ties together everything the collector asks of the runtime that
/// embeds it.
///
/// Unlike a static binding, the collector holds an instance (`Arc<VM>`) and reaches each
/// collaborator through an accessor. A binding may implement several collaborator traits on one
/// type and return `self` from the accessors.
pub trait VMBinding: Sized + Send + Sync + 'static {
    type VMObjectModel: ObjectModel;
    type VMScanning: Scanning;
    type VMMutators: MutatorRegistry;
    type VMHeap: HeapSpace;

    fn object_model(&self) -> &Self::VMObjectModel;
    fn scanning(&self) -> &Self::VMScanning;
    fn mutators(&self) -> &Self::VMMutators;
    fn heap(&self) -> &Self::VMHeap;
}
