//! Sable Core - Ultra-Low-Latency Tick-to-Trade Pipeline
//!
//! A market-making core designed for **sub-microsecond tick-to-trade
//! latency**: market data enters through a kernel-bypass ingress path and
//! leaves as an order roughly one microsecond later.
//!
//! ## System Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  [NIC descriptor ring] ──▶ [Zero-copy decoder] ──▶ [SPSC ring]   │
//! │        (ingress::nic)        (ingress::decode)    (ingress::ring)│
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │  Tick (one cache line group)
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  [Book engine + Deep OFI] ──▶ [Hawkes λ] ──▶ [Temporal filter]   │
//! │        (book)                  (signal::hawkes) (signal::temporal)│
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │  persistent directional signal
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  [Avellaneda-Stoikov quotes] ──▶ [Risk gate] ──▶ [Executor]      │
//! │        (quote)                    (risk)          (engine)       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! - **Single-threaded hot path** - the SPSC ring is the only cross-thread
//!   hand-off; everything downstream of it runs on one strategy core.
//! - **No locks on the critical path** - the ring's index atomics are the
//!   only synchronization in the whole pipeline.
//! - **Compile-time dispatch** - [`engine::Engine`] is generic over
//!   strategy and executor; no `dyn`, full monomorphization.
//! - **Explicit context** - every component owns its state and is handed
//!   to its consumer by value or `&mut`; there are no process-wide
//!   singletons.
//! - **Non-fatal by construction** - full ring, empty ring, rejected
//!   update, no-quote and risk rejection are ordinary return values, not
//!   errors. Nothing on the hot path panics or allocates.
//!
//! ## Crates in this workspace
//!
//! - **sable-core** (this crate) - the pipeline components
//! - **sable-sim** - deterministic event-driven backtest harness
//! - **sable-bins** - `backtest` and `latency-bench` binaries

pub mod types;
pub mod errors;
pub mod ingress;
pub mod book;
pub mod signal;
pub mod quote;
pub mod risk;
pub mod engine;
pub mod perf;

pub use errors::{ConfigError, DecodeError, RiskReject};
pub use types::{ArrivalEvent, Order, QuoteSet, Side, Tick, DEPTH_LEVELS};

pub use engine::{Engine, EngineStats, Executor, Strategy};

// Re-export error types
pub use anyhow::{Error, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::types::{ArrivalEvent, Order, QuoteSet, Side, Tick, DEPTH_LEVELS};

    pub use crate::book::{BookSnapshot, BookUpdate, DeepOfiSnapshot, OrderBook, UpdateKind};
    pub use crate::engine::{Engine, EngineStats, Executor, Strategy};
    pub use crate::ingress::ring::SpscRing;
    pub use crate::quote::{QuoteEngine, QuoteParams};
    pub use crate::risk::{RiskGate, RiskLimits};
    pub use crate::signal::hawkes::{HawkesEngine, HawkesParams};
    pub use crate::signal::temporal::{FilterDecision, TemporalFilter};

    pub use crate::{Error, Result};
}
