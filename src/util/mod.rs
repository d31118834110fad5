//! Utilities: object references, mark bytes, options, logging, the pause window and statistics.

pub mod address;
pub mod logger;
pub mod mark_bit;
pub mod options;
pub mod pause_window;
pub mod statistics;
#[cfg(any(test, feature = "mock_test"))]
pub mod test_util;

pub use self::address::{ObjectReference, TaggedRef};
