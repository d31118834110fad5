//! A sliding window over recent stop-the-world pauses.
//!
//! The window answers two questions: did the pause just recorded keep the total pause time
//! within the budget, and how long must the collector wait before it may pause for a given
//! length without exceeding the budget. All times are microseconds on a monotonic clock chosen
//! by the caller. Arithmetic is done in `i64` since the start of a window can precede time zero.

use std::cmp::max;
use std::collections::VecDeque;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PauseEntry {
    start_us: u64,
    end_us: u64,
}

impl PauseEntry {
    pub fn new(start_us: u64, end_us: u64) -> PauseEntry {
        assert!(
            end_us >= start_us,
            "Pause ends at {}us, before it starts at {}us",
            end_us,
            start_us
        );
        PauseEntry { start_us, end_us }
    }

    pub fn start_us(&self) -> u64 {
        self.start_us
    }

    pub fn end_us(&self) -> u64 {
        self.end_us
    }

    pub fn duration_us(&self) -> u64 {
        self.end_us - self.start_us
    }

    /// The part of this pause that lies after `window_start`.
    fn time_after(&self, window_start: i64) -> i64 {
        max(self.end_us as i64 - max(self.start_us as i64, window_start), 0)
    }
}

/// Recent pauses, oldest first, bounded by a fixed capacity.
#[derive(Clone, Debug)]
pub struct BoundedPauseWindow {
    window_us: u64,
    budget_us: u64,
    capacity: usize,
    entries: VecDeque<PauseEntry>,
}

impl BoundedPauseWindow {
    pub const DEFAULT_CAPACITY: usize = 16;

    pub fn new(window_us: u64, budget_us: u64) -> Self {
        Self::with_capacity(window_us, budget_us, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(window_us: u64, budget_us: u64, capacity: usize) -> Self {
        assert!(window_us > 0, "The pause window must not be empty");
        assert!(capacity > 0, "The pause window must remember at least one pause");
        if budget_us > window_us {
            warn!(
                "Pause budget {}us is larger than the window {}us",
                budget_us, window_us
            );
        }
        BoundedPauseWindow {
            window_us,
            budget_us,
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn window_us(&self) -> u64 {
        self.window_us
    }

    pub fn budget_us(&self) -> u64 {
        self.budget_us
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &PauseEntry> {
        self.entries.iter()
    }

    fn window_start(&self, window_end_us: i64) -> i64 {
        window_end_us - self.window_us as i64
    }

    /// Drop pauses that ended at or before the start of the window ending at `now_us`.
    fn evict_expired(&mut self, now_us: u64) {
        let window_start = self.window_start(now_us as i64);
        while let Some(oldest) = self.entries.front() {
            if oldest.end_us as i64 > window_start {
                break;
            }
            self.entries.pop_front();
        }
    }

    /// Total pause time inside the window that ends at `end_us`.
    pub fn pause_time_in_window(&self, end_us: u64) -> u64 {
        let window_start = self.window_start(end_us as i64);
        self.entries
            .iter()
            .map(|e| e.time_after(window_start))
            .sum::<i64>() as u64
    }

    /// Record a pause. Returns whether the pause time in the window ending at `end_us`,
    /// including this pause, stays within the budget.
    pub fn record_pause(&mut self, start_us: u64, end_us: u64) -> bool {
        let entry = PauseEntry::new(start_us, end_us);
        self.evict_expired(end_us);
        if self.entries.len() == self.capacity {
            let dropped = self.entries.pop_front();
            trace!("Pause window is full, forgetting {:?}", dropped);
        }
        self.entries.push_back(entry);

        let total = self.pause_time_in_window(end_us);
        trace!(
            "Recorded pause {}us..{}us, {}us paused in the last {}us",
            start_us,
            end_us,
            total,
            self.window_us
        );
        total <= self.budget_us
    }

    /// The smallest delay after `now_us` before a pause of `proposed_us` fits in the budget.
    /// A proposal longer than the budget is treated as a pause of exactly the budget.
    pub fn min_delay_before_pause(&mut self, now_us: u64, proposed_us: u64) -> u64 {
        self.evict_expired(now_us);

        let proposed = proposed_us.min(self.budget_us) as i64;
        let mut remaining = self.budget_us as i64 - proposed;
        // The window that would end when the proposed pause ends.
        let window_start = self.window_start(now_us as i64 + proposed);

        for entry in self.entries.iter().rev() {
            if entry.end_us as i64 <= window_start {
                break;
            }
            let paused = entry.time_after(window_start);
            if paused <= remaining {
                remaining -= paused;
                continue;
            }
            // Wait until no more than `remaining` of this pause is left in the window.
            let required_window_start = entry.end_us as i64 - remaining;
            return (required_window_start - window_start) as u64;
        }
        0
    }

    /// The smallest delay after `now_us` before a pause of the whole budget is allowed.
    pub fn min_delay_before_max_pause(&mut self, now_us: u64) -> u64 {
        self.min_delay_before_pause(now_us, self.budget_us)
    }
}
