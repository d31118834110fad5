//! Tri-color mark states kept in a per-object mark byte.
//!
//! An object starts white. The SATB barrier may shade it gray when it logs the object, so the
//! same object is not logged twice. Tracing turns it black exactly once: of all threads racing
//! on the same object, only one observes the transition and goes on to scan it.

use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MarkState {
    White = 0,
    Gray = 1,
    Black = 2,
}

impl MarkState {
    pub fn from_u8(value: u8) -> MarkState {
        match value {
            0 => MarkState::White,
            1 => MarkState::Gray,
            2 => MarkState::Black,
            _ => unreachable!("Invalid mark state {}", value),
        }
    }
}

pub fn load(word: &AtomicU8) -> MarkState {
    MarkState::from_u8(word.load(Ordering::Acquire))
}

/// Mark the object black. Returns `true` if it was already black, in which case the caller
/// must not scan it.
pub fn mark(word: &AtomicU8) -> bool {
    let mut old = word.load(Ordering::Acquire);
    loop {
        if old == MarkState::Black as u8 {
            return true;
        }
        match word.compare_exchange_weak(
            old,
            MarkState::Black as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return false,
            Err(current) => old = current,
        }
    }
}

pub fn is_marked(word: &AtomicU8) -> bool {
    word.load(Ordering::Acquire) == MarkState::Black as u8
}

/// Shade a white object gray. Returns `true` if this call did it.
pub fn shade(word: &AtomicU8) -> bool {
    word.compare_exchange(
        MarkState::White as u8,
        MarkState::Gray as u8,
        Ordering::AcqRel,
        Ordering::Relaxed,
    )
    .is_ok()
}

pub fn clear(word: &AtomicU8) {
    word.store(MarkState::White as u8, Ordering::Release);
}
