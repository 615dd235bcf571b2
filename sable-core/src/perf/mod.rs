//! Performance utilities
//!
//! - [`cpu`] - core layout and real-time scheduling for the two hot
//!   threads (poll loop, strategy)
//! - [`latency`] - latency sample statistics (percentiles, jitter) and
//!   the per-stage pipeline timing breakdown, with CSV export

pub mod cpu;
pub mod latency;

pub use cpu::{pin_to_core, set_realtime_priority, CoreLayout, ThreadRole};
pub use latency::{LatencyStats, StageTimings, STAGE_NAMES};
