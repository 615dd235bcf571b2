//! Common utilities for all binaries
//!
//! Logging initialization and performance setup shared by the backtest
//! runner and the latency benchmark.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sable_core::perf::{CoreLayout, ThreadRole};

/// Initialize tracing with an env-filterable level.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    Ok(())
}

/// CPU placement for measurement runs: the calling thread becomes the
/// strategy core of the layout.
pub fn setup_performance(cpu_core: Option<usize>, realtime: bool) -> Result<()> {
    let layout = CoreLayout {
        poll_core: None,
        strategy_core: cpu_core,
        realtime,
    };
    layout.apply(ThreadRole::Strategy)
}
