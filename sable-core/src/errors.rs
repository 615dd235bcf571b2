//! Domain-specific error types for the trading core
//!
//! Expected non-fatal outcomes (ring full/empty, rejected book update,
//! no-quote) are ordinary return values and do not appear here. These
//! types cover the cases a caller must classify: invalid configuration,
//! undecodable wire bytes, and pre-trade rejections.

use std::fmt;

use crate::types::Side;

/// Invalid parameters rejected at construction time.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A parameter that must be strictly positive was not
    NonPositive {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// A capacity that must be a power of two was not
    NotPowerOfTwo {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: usize,
    },

    /// A value fell outside its documented range
    OutOfRange {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f64,
        /// Human-readable bound description
        bound: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositive { name, value } => {
                write!(f, "{} must be > 0 (got {})", name, value)
            }
            ConfigError::NotPowerOfTwo { name, value } => {
                write!(f, "{} must be a power of two (got {})", name, value)
            }
            ConfigError::OutOfRange { name, value, bound } => {
                write!(f, "{} out of range: {} (expected {})", name, value, bound)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Header validation or length-mismatch failures in the wire decoder.
///
/// Decode failures are dropped with a counter bump by the caller; they
/// never propagate into the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer shorter than the message header
    Truncated {
        /// Bytes available
        have: usize,
        /// Bytes required
        need: usize,
    },

    /// Declared message length exceeds the buffer
    LengthMismatch {
        /// Declared length
        declared: usize,
        /// Bytes available
        have: usize,
    },

    /// Message type id not in the recognized set
    UnknownType {
        /// The offending type id
        msg_type: u16,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated { have, need } => {
                write!(f, "truncated message: {} bytes, need {}", have, need)
            }
            DecodeError::LengthMismatch { declared, have } => {
                write!(
                    f,
                    "declared length {} exceeds buffer of {} bytes",
                    declared, have
                )
            }
            DecodeError::UnknownType { msg_type } => {
                write!(f, "unknown message type {}", msg_type)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Pre-trade rejection, tagged with the first failing constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskReject {
    /// Resulting position magnitude would exceed the limit
    PositionLimit {
        /// Position the order would produce
        projected: i64,
        /// Configured magnitude limit
        limit: i64,
    },

    /// Single-order notional above the per-order cap
    NotionalLimit {
        /// Order notional
        notional: f64,
        /// Configured cap
        limit: f64,
    },

    /// Cumulative daily notional above the daily cap
    DailyNotionalLimit {
        /// Daily notional including this order
        accrued: f64,
        /// Configured cap
        limit: f64,
    },

    /// Order size above the per-order size cap
    OrderTooLarge {
        /// Order quantity
        quantity: u64,
        /// Configured cap
        limit: u64,
    },

    /// Sell that would open a short position while shorting is disabled
    ShortProhibited {
        /// The rejected side (always Sell in practice)
        side: Side,
        /// Position the order would produce
        projected: i64,
    },
}

impl RiskReject {
    /// Stable short tag for logs and counters
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskReject::PositionLimit { .. } => "position_limit",
            RiskReject::NotionalLimit { .. } => "notional_limit",
            RiskReject::DailyNotionalLimit { .. } => "daily_notional_limit",
            RiskReject::OrderTooLarge { .. } => "order_too_large",
            RiskReject::ShortProhibited { .. } => "short_prohibited",
        }
    }
}

impl fmt::Display for RiskReject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskReject::PositionLimit { projected, limit } => {
                write!(
                    f,
                    "position limit: projected {} exceeds |{}|",
                    projected, limit
                )
            }
            RiskReject::NotionalLimit { notional, limit } => {
                write!(f, "order notional {:.2} exceeds {:.2}", notional, limit)
            }
            RiskReject::DailyNotionalLimit { accrued, limit } => {
                write!(f, "daily notional {:.2} exceeds {:.2}", accrued, limit)
            }
            RiskReject::OrderTooLarge { quantity, limit } => {
                write!(f, "order size {} exceeds {}", quantity, limit)
            }
            RiskReject::ShortProhibited { side, projected } => {
                write!(
                    f,
                    "{} would open short position {} with shorting disabled",
                    side, projected
                )
            }
        }
    }
}

impl std::error::Error for RiskReject {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NonPositive {
            name: "gamma",
            value: -0.5,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("gamma"));
        assert!(msg.contains("-0.5"));
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::Truncated { have: 4, need: 16 };
        assert!(format!("{}", err).contains("truncated"));

        let err = DecodeError::UnknownType { msg_type: 99 };
        assert!(format!("{}", err).contains("99"));
    }

    #[test]
    fn test_risk_reject_tags() {
        let reject = RiskReject::PositionLimit {
            projected: 1500,
            limit: 1000,
        };
        assert_eq!(reject.as_str(), "position_limit");

        let reject = RiskReject::ShortProhibited {
            side: Side::Sell,
            projected: -10,
        };
        assert_eq!(reject.as_str(), "short_prohibited");
        assert!(format!("{}", reject).contains("short"));
    }
}
