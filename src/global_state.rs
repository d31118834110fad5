use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use atomic::Atomic;
use bytemuck::NoUninit;
use enum_map::Enum;
use strum_macros::{Display, EnumIter, IntoStaticStr};

use crate::plan::concurrent::Pause;
use crate::plan::tracing::WeakStack;
use crate::util::options::Options;
use crate::util::pause_window::BoundedPauseWindow;

/// The phase a collection cycle is in.
#[repr(u8)]
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Enum, EnumIter, Display, IntoStaticStr, NoUninit,
)]
pub enum Phase {
    Idle,
    RootEnumeration,
    ConcurrentMark,
    Remark,
    Resurrection,
    WeakReferences,
    RegionCopy,
}

/// State shared by the collector, its work packets and the write barrier.
///
/// Counters are reset at the start of each cycle. The pause window lives for the whole lifetime
/// of the collector.
pub struct CollectorState {
    epoch: Instant,
    phase: Atomic<Phase>,
    current_pause: Atomic<Option<Pause>>,
    /// Is the SATB barrier active? Set and cleared while the world is stopped.
    concurrent_marking_active: AtomicBool,
    gc_count: AtomicUsize,
    marked_objects: AtomicUsize,
    resurrected_objects: AtomicUsize,
    satb_iterations: AtomicUsize,
    pause_time_us: AtomicU64,
    pauses_within_budget: AtomicBool,
    weak_refs: Mutex<WeakStack>,
    pause_window: Mutex<BoundedPauseWindow>,
}

impl CollectorState {
    pub fn new(options: &Options) -> Self {
        CollectorState {
            epoch: Instant::now(),
            phase: Atomic::new(Phase::Idle),
            current_pause: Atomic::new(None),
            concurrent_marking_active: AtomicBool::new(false),
            gc_count: AtomicUsize::new(0),
            marked_objects: AtomicUsize::new(0),
            resurrected_objects: AtomicUsize::new(0),
            satb_iterations: AtomicUsize::new(0),
            pause_time_us: AtomicU64::new(0),
            pauses_within_budget: AtomicBool::new(true),
            weak_refs: Mutex::new(WeakStack::default()),
            pause_window: Mutex::new(BoundedPauseWindow::with_capacity(
                options.pause_window_us,
                options.pause_budget_us,
                options.pause_window_capacity,
            )),
        }
    }

    /// Microseconds since the collector was created. This is the clock of the pause window.
    pub fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    pub fn phase(&self) -> Phase {
        self.phase.load(Ordering::SeqCst)
    }

    pub fn set_phase(&self, phase: Phase) {
        trace!("Phase {} -> {}", self.phase(), phase);
        self.phase.store(phase, Ordering::SeqCst);
    }

    pub fn current_pause(&self) -> Option<Pause> {
        self.current_pause.load(Ordering::SeqCst)
    }

    pub fn set_current_pause(&self, pause: Option<Pause>) {
        self.current_pause.store(pause, Ordering::SeqCst);
    }

    pub fn is_world_stopped_by_collector(&self) -> bool {
        self.current_pause().is_some()
    }

    #[inline(always)]
    pub fn is_concurrent_marking_active(&self) -> bool {
        // Flipped only while mutators are stopped, so the handshake publishes it.
        self.concurrent_marking_active.load(Ordering::Relaxed)
    }

    pub fn set_concurrent_marking_active(&self, active: bool) {
        self.concurrent_marking_active
            .store(active, Ordering::SeqCst);
    }

    pub fn gc_count(&self) -> usize {
        self.gc_count.load(Ordering::SeqCst)
    }

    /// Reset the per-cycle counters. Returns the number of the new cycle.
    pub fn prepare_cycle(&self) -> usize {
        self.marked_objects.store(0, Ordering::SeqCst);
        self.resurrected_objects.store(0, Ordering::SeqCst);
        self.satb_iterations.store(0, Ordering::SeqCst);
        self.pause_time_us.store(0, Ordering::SeqCst);
        self.pauses_within_budget.store(true, Ordering::SeqCst);
        self.weak_refs.lock().unwrap().clear();
        self.gc_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// End the current cycle: the barrier is off and no pause is in progress.
    pub fn finish_cycle(&self) {
        debug_assert!(self.current_pause().is_none(), "A cycle ends with mutators running");
        self.set_concurrent_marking_active(false);
        self.set_phase(Phase::Idle);
    }

    pub fn marked_objects(&self) -> usize {
        self.marked_objects.load(Ordering::SeqCst)
    }

    pub fn add_marked_objects(&self, n: usize) {
        if n > 0 {
            self.marked_objects.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn resurrected_objects(&self) -> usize {
        self.resurrected_objects.load(Ordering::SeqCst)
    }

    pub fn add_resurrected_objects(&self, n: usize) {
        self.resurrected_objects.fetch_add(n, Ordering::Relaxed);
    }

    pub fn satb_iterations(&self) -> usize {
        self.satb_iterations.load(Ordering::SeqCst)
    }

    pub fn add_satb_iterations(&self, n: usize) {
        self.satb_iterations.fetch_add(n, Ordering::Relaxed);
    }

    pub fn pause_time_us(&self) -> u64 {
        self.pause_time_us.load(Ordering::SeqCst)
    }

    pub fn pauses_within_budget(&self) -> bool {
        self.pauses_within_budget.load(Ordering::SeqCst)
    }

    pub fn merge_weak_refs(&self, refs: &mut WeakStack) {
        if !refs.is_empty() {
            self.weak_refs.lock().unwrap().merge(refs);
        }
    }

    pub fn take_weak_refs(&self) -> WeakStack {
        std::mem::take(&mut *self.weak_refs.lock().unwrap())
    }

    /// Record a stop-the-world pause in the pause window. Returns whether it stayed within the
    /// budget.
    pub fn record_pause(&self, start_us: u64, end_us: u64) -> bool {
        let within_budget = self
            .pause_window
            .lock()
            .unwrap()
            .record_pause(start_us, end_us);
        self.pause_time_us
            .fetch_add(end_us.saturating_sub(start_us), Ordering::SeqCst);
        if !within_budget {
            self.pauses_within_budget.store(false, Ordering::SeqCst);
        }
        within_budget
    }

    pub fn min_delay_before_pause(&self, now_us: u64, proposed_us: u64) -> u64 {
        self.pause_window
            .lock()
            .unwrap()
            .min_delay_before_pause(now_us, proposed_us)
    }

    pub fn min_delay_before_max_pause(&self, now_us: u64) -> u64 {
        self.pause_window
            .lock()
            .unwrap()
            .min_delay_before_max_pause(now_us)
    }

    pub fn pause_window(&self) -> BoundedPauseWindow {
        self.pause_window.lock().unwrap().clone()
    }
}
