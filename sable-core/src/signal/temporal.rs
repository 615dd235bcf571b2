//! Temporal persistence filter
//!
//! Suppresses alpha that does not outlive the execution window: an
//! imbalance run must hold one direction for at least
//! [`MIN_PERSISTENCE_TICKS`] consecutive ticks, and the current reading
//! must retain at least 60% of the run's average strength. A 12-tick run
//! at ~100 ns/tick dwarfs the >=550 ns submit-to-eligibility floor, so
//! flow that flips inside the execution window never reaches the quote
//! engine.
//!
//! A plain state machine with explicit transitions: reset on weak
//! imbalance, reset-and-reseed on direction flip, extend otherwise.

/// Minimum consecutive confirming ticks before a signal may trade
pub const MIN_PERSISTENCE_TICKS: u32 = 12;
/// Imbalance magnitude below which the filter resets
pub const OBI_THRESHOLD: f64 = 0.09;
/// The current reading must be at least this fraction of the run average
const QUALITY_FLOOR: f64 = 0.60;

/// Outcome of one filter observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterDecision {
    /// True when the run passes both the persistence and quality gates
    pub persistent: bool,
    /// Run direction: +1 buy, -1 sell, 0 idle
    pub direction: i8,
    /// Consecutive confirming ticks in the current run
    pub confirmation_ticks: u32,
    /// The observed imbalance this tick
    pub obi: f64,
    /// Running average imbalance over the run (signed)
    pub avg_obi: f64,
    /// Peak |imbalance| over the run
    pub max_obi: f64,
    /// Nanoseconds since the run began
    pub persistence_ns: i64,
}

impl FilterDecision {
    /// Signal strength reported downstream: the run's average magnitude
    #[inline(always)]
    pub fn strength(&self) -> f64 {
        self.avg_obi.abs()
    }
}

/// Persistence filter state. Owned by the signal path; reset is explicit.
#[derive(Debug, Clone, Default)]
pub struct TemporalFilter {
    signal_start_ns: i64,
    confirmation_ticks: u32,
    /// +1, -1, or 0 when idle
    last_direction: i8,
    accumulated_obi: f64,
    avg_obi: f64,
    max_obi: f64,
}

impl TemporalFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one tick's imbalance and update the run state.
    pub fn observe(&mut self, now_ns: i64, obi: f64) -> FilterDecision {
        if obi.abs() < OBI_THRESHOLD {
            // Imbalance too weak to track
            self.reset();
            return FilterDecision {
                obi,
                ..FilterDecision::default()
            };
        }

        let direction: i8 = if obi > 0.0 { 1 } else { -1 };

        if self.confirmation_ticks > 0 && direction != self.last_direction {
            // Direction flip: the old run is dead; this tick seeds a new one
            self.reset();
        }

        if self.confirmation_ticks == 0 {
            self.signal_start_ns = now_ns;
            self.last_direction = direction;
        }

        self.accumulated_obi += obi;
        self.confirmation_ticks += 1;
        self.avg_obi = self.accumulated_obi / self.confirmation_ticks as f64;
        self.max_obi = self.max_obi.max(obi.abs());

        let quality_ok = obi.abs() >= QUALITY_FLOOR * self.avg_obi.abs();
        let persistent = self.confirmation_ticks >= MIN_PERSISTENCE_TICKS && quality_ok;

        FilterDecision {
            persistent,
            direction,
            confirmation_ticks: self.confirmation_ticks,
            obi,
            avg_obi: self.avg_obi,
            max_obi: self.max_obi,
            persistence_ns: now_ns - self.signal_start_ns,
        }
    }

    /// Clear the run state
    pub fn reset(&mut self) {
        self.signal_start_ns = 0;
        self.confirmation_ticks = 0;
        self.last_direction = 0;
        self.accumulated_obi = 0.0;
        self.avg_obi = 0.0;
        self.max_obi = 0.0;
    }

    pub fn confirmation_ticks(&self) -> u32 {
        self.confirmation_ticks
    }
}
