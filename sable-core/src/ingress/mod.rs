//! Ingress path: hardware receive to strategy thread
//!
//! Three layers, leaves first:
//!
//! - [`nic`] - a memory-mapped descriptor-ring driver model for the
//!   receive/transmit path (poll-mode, no interrupts)
//! - [`decode`] - zero-copy overlay decoding of the fixed binary wire
//!   format into typed message views
//! - [`ring`] - the single-producer / single-consumer hand-off ring that
//!   delivers parsed ticks onto the strategy core
//!
//! The ring is the only cross-thread edge in the whole system. The
//! producer side is the hardware poll loop (or the simulator feeder); the
//! consumer side is the strategy thread, which never blocks.

pub mod decode;
pub mod nic;
pub mod ring;

pub use decode::{decode, validate_header, BookUpdateMsg, Message, MsgHeader, QuoteMsg, TradeMsg};
pub use nic::NicDriver;
pub use ring::SpscRing;
