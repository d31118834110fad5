//! The interface between the collector and the runtime that embeds it.

mod finalizable;
mod heap;
mod mutators;
mod object_model;
mod scanning;
mod vmbinding;

pub use self::finalizable::FinalizerSlot;
pub use self::heap::HeapSpace;
pub use self::mutators::{lock_management_unless_stopped, Mutator, MutatorRegistry};
pub use self::object_model::{FieldVisitor, ObjectField, ObjectModel};
pub use self::scanning::{RootSlot, Scanning};
pub use self::vmbinding::VMBinding;
