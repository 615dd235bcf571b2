//! Pre-trade risk gate
//!
//! Every order passes through one check before submission. A rejection
//! names the first failing constraint, in fixed order: position limit,
//! per-order notional, daily notional, order size, short prohibition.
//! Rejections are counted per class; counters surface at the component
//! boundary, nothing throws on the hot path.

use crate::errors::{ConfigError, RiskReject};
use crate::types::{Order, Side};

/// Risk limits; validated at construction.
#[derive(Debug, Clone, Copy)]
pub struct RiskLimits {
    /// Position magnitude limit
    pub max_position: i64,
    /// Per-order notional cap
    pub max_order_notional: f64,
    /// Cumulative daily notional cap
    pub max_daily_notional: f64,
    /// Per-order size cap in units
    pub max_order_size: u64,
    /// Whether sells may open a net short position
    pub allow_short: bool,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position: 1000,
            max_order_notional: 50_000.0,
            max_daily_notional: 100_000.0,
            max_order_size: 500,
            allow_short: true,
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_position <= 0 {
            return Err(ConfigError::NonPositive {
                name: "max_position",
                value: self.max_position as f64,
            });
        }
        if self.max_order_notional <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "max_order_notional",
                value: self.max_order_notional,
            });
        }
        if self.max_daily_notional <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "max_daily_notional",
                value: self.max_daily_notional,
            });
        }
        if self.max_order_size == 0 {
            return Err(ConfigError::NonPositive {
                name: "max_order_size",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// Per-class rejection counters plus the accept count.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskStats {
    pub accepted: u64,
    pub position_limit: u64,
    pub notional_limit: u64,
    pub daily_notional_limit: u64,
    pub order_too_large: u64,
    pub short_prohibited: u64,
}

impl RiskStats {
    pub fn total_rejected(&self) -> u64 {
        self.position_limit
            + self.notional_limit
            + self.daily_notional_limit
            + self.order_too_large
            + self.short_prohibited
    }
}

/// Stateful pre-trade gate: limits plus the daily notional accrual.
#[derive(Debug, Clone)]
pub struct RiskGate {
    limits: RiskLimits,
    daily_notional: f64,
    stats: RiskStats,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Result<Self, ConfigError> {
        limits.validate()?;
        Ok(Self {
            limits,
            daily_notional: 0.0,
            stats: RiskStats::default(),
        })
    }

    /// Check one order against the limits given the current position.
    /// Accepts only when every constraint holds; the error names the
    /// first violated one.
    pub fn check(&mut self, order: &Order, current_position: i64) -> Result<(), RiskReject> {
        let result = self.evaluate(order, current_position);
        match &result {
            Ok(()) => self.stats.accepted += 1,
            Err(reject) => match reject {
                RiskReject::PositionLimit { .. } => self.stats.position_limit += 1,
                RiskReject::NotionalLimit { .. } => self.stats.notional_limit += 1,
                RiskReject::DailyNotionalLimit { .. } => self.stats.daily_notional_limit += 1,
                RiskReject::OrderTooLarge { .. } => self.stats.order_too_large += 1,
                RiskReject::ShortProhibited { .. } => self.stats.short_prohibited += 1,
            },
        }
        result
    }

    fn evaluate(&self, order: &Order, current_position: i64) -> Result<(), RiskReject> {
        let projected = current_position.saturating_add(order.position_delta());

        if projected.abs() > self.limits.max_position {
            return Err(RiskReject::PositionLimit {
                projected,
                limit: self.limits.max_position,
            });
        }

        let notional = order.notional();
        if notional > self.limits.max_order_notional {
            return Err(RiskReject::NotionalLimit {
                notional,
                limit: self.limits.max_order_notional,
            });
        }

        if self.daily_notional + notional > self.limits.max_daily_notional {
            return Err(RiskReject::DailyNotionalLimit {
                accrued: self.daily_notional + notional,
                limit: self.limits.max_daily_notional,
            });
        }

        if order.quantity > self.limits.max_order_size {
            return Err(RiskReject::OrderTooLarge {
                quantity: order.quantity,
                limit: self.limits.max_order_size,
            });
        }

        if !self.limits.allow_short && order.side == Side::Sell && projected < 0 {
            return Err(RiskReject::ShortProhibited {
                side: order.side,
                projected,
            });
        }

        Ok(())
    }

    /// Accrue a filled order's notional against the daily cap.
    pub fn record_fill(&mut self, notional: f64) {
        self.daily_notional += notional;
    }

    /// Start-of-day reset of the accrual.
    pub fn reset_daily(&mut self) {
        self.daily_notional = 0.0;
    }

    pub fn daily_notional(&self) -> f64 {
        self.daily_notional
    }

    pub fn stats(&self) -> RiskStats {
        self.stats
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }
}
