//! satbgc is the concurrent marking core of a tracing garbage collector.
//!
//! A cycle has two short stop-the-world pauses. The initial-mark pause enumerates the roots and
//! switches on the snapshot-at-the-beginning (SATB) write barrier. Marking then runs on a pool
//! of worker threads while mutators keep running, and the objects the barrier logged are traced
//! until no more show up. The final-mark pause resurrects finalizable objects, hands weak
//! references to the runtime and evacuates the from-space. A sliding window keeps the total
//! pause time within a budget.
//!
//! A runtime embeds the collector by implementing the traits in [`vm`] and creating a
//! [`Collector`]. Tuning knobs are in [`util::options::Options`].

#[macro_use]
extern crate log;
#[cfg_attr(any(test, feature = "mock_test"), macro_use)]
extern crate lazy_static;

mod collector;
mod global_state;

pub mod plan;
pub mod scheduler;
pub mod util;
pub mod vm;

pub use crate::collector::Collector;
pub use crate::global_state::{CollectorState, Phase};
