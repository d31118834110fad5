//! The phases of a collection cycle: root enumeration, concurrent marking, SATB remark,
//! resurrection of finalizable objects and region copying.

pub mod concurrent;
pub mod copying;
pub mod finalization;
pub mod roots;
pub mod tracing;

pub use self::concurrent::barrier::{SatbBarrier, SatbLog};
pub use self::concurrent::marking::{ForkPolicy, MarkingContext, MarkingTask, ParallelMarker};
pub use self::concurrent::satb::SatbReconciler;
pub use self::concurrent::{Pause, StopTheWorld};
pub use self::copying::{RegionCopier, RegionCopyStats};
pub use self::finalization::Resurrector;
pub use self::roots::RootEnumerator;
pub use self::tracing::{ObjectQueue, WeakRef, WeakStack, WorkStack};
