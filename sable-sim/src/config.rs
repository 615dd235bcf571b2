//! Simulator configuration

use serde::{Deserialize, Serialize};

use sable_core::errors::ConfigError;

/// Minimum submit-to-eligibility delay, nanoseconds.
///
/// The full pipeline beats 500 ns toxic-flow regimes; simulating faster
/// fictitious latencies inverts PnL. 50 ns of buffer sits on top.
pub const MIN_LATENCY_FLOOR_NS: i64 = 550;

/// Backtest configuration. Serialized verbatim into the replay log's
/// CONFIG record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Requested submit-to-eligible delay; floored at 550 ns at use
    pub simulated_latency_ns: i64,
    /// Starting equity
    pub initial_capital: f64,
    /// Deducted per filled share
    pub commission_per_share: f64,
    /// Position limit magnitude
    pub max_position: i64,
    /// Apply square-root slippage at fill
    pub enable_slippage: bool,
    /// Apply the adverse-move fill multiplier
    pub enable_adverse_selection: bool,
    /// Seed for the fill-draw generator
    pub random_seed: u32,
    /// Rerun the simulation across `latency_sweep_ns`
    pub run_latency_sweep: bool,
    /// Latencies to sweep
    pub latency_sweep_ns: Vec<i64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            simulated_latency_ns: 500,
            initial_capital: 100_000.0,
            commission_per_share: 0.0005,
            max_position: 1000,
            enable_slippage: true,
            enable_adverse_selection: true,
            random_seed: 42,
            run_latency_sweep: false,
            latency_sweep_ns: vec![100, 250, 500, 1000, 2000],
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capital <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "initial_capital",
                value: self.initial_capital,
            });
        }
        if self.max_position <= 0 {
            return Err(ConfigError::NonPositive {
                name: "max_position",
                value: self.max_position as f64,
            });
        }
        if self.commission_per_share < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "commission_per_share",
                value: self.commission_per_share,
                bound: ">= 0",
            });
        }
        Ok(())
    }

    /// The enforced submit-to-eligibility delay
    #[inline]
    pub fn effective_latency_ns(&self) -> i64 {
        self.simulated_latency_ns.max(MIN_LATENCY_FLOOR_NS)
    }
}
