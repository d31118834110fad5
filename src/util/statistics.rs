//! Per-cycle telemetry: phase times, mark counts and the collection rate.

use std::fmt;
use std::time::{Duration, Instant};

use enum_map::EnumMap;
use itertools::Itertools;
use strum::IntoEnumIterator;

use crate::global_state::Phase;

/// Wall-clock time spent in each phase of one cycle.
#[derive(Clone, Debug, Default)]
pub struct PhaseTimes(EnumMap<Phase, Duration>);

impl PhaseTimes {
    /// Run `f`, charging its duration to `phase`.
    pub fn measure<T>(&mut self, phase: Phase, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.0[phase] += start.elapsed();
        result
    }

    pub fn get(&self, phase: Phase) -> Duration {
        self.0[phase]
    }

    pub fn total(&self) -> Duration {
        self.0.values().sum()
    }
}

impl fmt::Display for PhaseTimes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = Phase::iter()
            .filter(|p| !self.0[*p].is_zero())
            .map(|p| format!("{}: {:.3}ms", p, self.0[p].as_secs_f64() * 1e3))
            .join(", ");
        f.write_str(&line)
    }
}

/// What one collection cycle did.
#[derive(Clone, Debug, Default)]
pub struct CycleStats {
    pub gc_count: usize,
    pub marked_objects: usize,
    pub resurrected_objects: usize,
    pub satb_iterations: usize,
    /// Whether the SATB remark converged without stopping the world.
    pub satb_converged: bool,
    pub phase_times: PhaseTimes,
    pub allocated_bytes: usize,
    pub survived_bytes: usize,
    pub cycle_time: Duration,
    pub pause_time: Duration,
    /// Whether every pause of this cycle stayed within the pause budget.
    pub pauses_within_budget: bool,
    /// The delay the pause window asked for before the first pause of the cycle.
    pub pause_delay_hint: Duration,
    /// The delay the pause window asked for before the final-mark pause.
    pub final_mark_delay_hint: Duration,
}

impl CycleStats {
    /// Reclaimed bytes per microsecond of cycle time.
    pub fn collection_rate(&self) -> f64 {
        let micros = self.cycle_time.as_micros();
        if micros == 0 {
            return 0.0;
        }
        self.allocated_bytes.saturating_sub(self.survived_bytes) as f64 / micros as f64
    }
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GC {}: marked {} (resurrected {}), {} SATB rounds{}, {}K -> {}K, \
             cycle {:.3}ms, paused {:.3}ms{}, {:.2} bytes/us [{}]",
            self.gc_count,
            self.marked_objects,
            self.resurrected_objects,
            self.satb_iterations,
            if self.satb_converged { "" } else { " (forced STW)" },
            self.allocated_bytes / 1024,
            self.survived_bytes / 1024,
            self.cycle_time.as_secs_f64() * 1e3,
            self.pause_time.as_secs_f64() * 1e3,
            if self.pauses_within_budget { "" } else { " over budget" },
            self.collection_rate(),
            self.phase_times
        )
    }
}

/// Accumulated telemetry over the lifetime of a collector.
#[derive(Clone, Debug, Default)]
pub struct GCStatistics {
    cycles: usize,
    total_marked: usize,
    total_cycle_time: Duration,
    total_pause_time: Duration,
    forced_remarks: usize,
    over_budget_cycles: usize,
    last_cycle: Option<CycleStats>,
}

impl GCStatistics {
    pub fn record_cycle(&mut self, stats: CycleStats) {
        self.cycles += 1;
        self.total_marked += stats.marked_objects;
        self.total_cycle_time += stats.cycle_time;
        self.total_pause_time += stats.pause_time;
        if !stats.satb_converged {
            self.forced_remarks += 1;
        }
        if !stats.pauses_within_budget {
            self.over_budget_cycles += 1;
        }
        self.last_cycle = Some(stats);
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn total_marked(&self) -> usize {
        self.total_marked
    }

    pub fn total_pause_time(&self) -> Duration {
        self.total_pause_time
    }

    pub fn forced_remarks(&self) -> usize {
        self.forced_remarks
    }

    pub fn over_budget_cycles(&self) -> usize {
        self.over_budget_cycles
    }

    pub fn last_cycle(&self) -> Option<&CycleStats> {
        self.last_cycle.as_ref()
    }

    pub fn log_summary(&self) {
        info!(
            "{} cycles, {} objects marked, {:.3}ms in cycles, {:.3}ms paused, \
             {} forced remarks, {} cycles over the pause budget",
            self.cycles,
            self.total_marked,
            self.total_cycle_time.as_secs_f64() * 1e3,
            self.total_pause_time.as_secs_f64() * 1e3,
            self.forced_remarks,
            self.over_budget_cycles
        );
    }
}
