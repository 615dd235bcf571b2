//! Signal engine: order-flow intensity and persistence filtering
//!
//! Two stages sit between the book and the quote engine:
//!
//! - [`hawkes`] - a multivariate self-/cross-exciting intensity estimator
//!   over buy/sell arrivals with a power-law kernel. Its intensity
//!   imbalance is the primary directional alpha.
//! - [`temporal`] - a persistence filter that suppresses fleeting alpha:
//!   only imbalance runs that outlast the execution window may produce
//!   orders.

pub mod hawkes;
pub mod temporal;

pub use hawkes::{HawkesEngine, HawkesParams};
pub use temporal::{FilterDecision, TemporalFilter, MIN_PERSISTENCE_TICKS, OBI_THRESHOLD};
