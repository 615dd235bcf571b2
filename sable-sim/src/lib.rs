//! Sable Sim - Deterministic Event-Driven Backtest Harness
//!
//! Replays the tick-to-trade pipeline against sorted historical events
//! with a configurable simulated latency floor. Strictly single-threaded:
//! event time advances monotonically, randomness comes from one owned
//! linear congruential generator, and no wall-clock call happens during
//! replay. Two runs with the same input bytes, seed and configuration
//! produce byte-identical replay logs and metrics.
//!
//! ```text
//! [CSV events] -> [Backtester] -> [Hawkes + filter] -> [AS quotes + risk]
//!                      |                                      |
//!                      |                             [fill model + floor]
//!                      v                                      v
//!               [replay log]  <---------------------  [PnL + metrics]
//! ```
//!
//! The latency floor is load-bearing: submit-to-eligibility is never
//! below 550 ns regardless of configuration, because regimes faster than
//! that trade against flow that flips inside the execution window.

pub mod config;
pub mod engine;
pub mod event;
pub mod fill;
pub mod metrics;
pub mod replay_log;
pub mod rng;

pub use config::{SimConfig, MIN_LATENCY_FLOOR_NS};
pub use engine::{Backtester, RunCounters, SimulatedOrder};
pub use event::{load_events_csv, HistoricalEvent, LoadedEvents};
pub use fill::{FillModel, FillParams};
pub use metrics::PerformanceMetrics;
pub use replay_log::ReplayLogger;
pub use rng::Lcg;
