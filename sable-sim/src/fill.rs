//! Empirical fill-probability and slippage model
//!
//! Resolves whether a resting simulated order fills at its eligibility
//! check. An order priced at or through the opposite top is marketable
//! and fills with certainty - that branch short-circuits before any
//! decay term. Everything else starts from an empirical base rate and
//! decays with queue position, quoted spread, volatility and latency,
//! with a 0.1 factor for orders outside their own top and a penalty
//! multiplier when the mid has moved adversely since submit:
//!
//! ```text
//! p = 1                                          (marketable)
//! p = base · e^(-decay·queue) · e^(-sens·spread_bps) · e^(-vol·σ)
//!          · e^(-penalty·latency_us) · adverse_multiplier   (otherwise)
//! ```

use sable_core::types::{Order, Side, Tick};

/// Fill model parameters (calibrated constants).
#[derive(Debug, Clone, Copy)]
pub struct FillParams {
    pub base_fill_probability: f64,
    pub queue_position_decay: f64,
    pub spread_sensitivity: f64,
    pub volatility_impact: f64,
    pub adverse_selection_penalty: f64,
    pub latency_penalty_per_us: f64,
}

impl Default for FillParams {
    fn default() -> Self {
        Self {
            base_fill_probability: 0.70,
            queue_position_decay: 0.15,
            spread_sensitivity: 0.05,
            volatility_impact: 0.10,
            adverse_selection_penalty: 0.20,
            latency_penalty_per_us: 0.001,
        }
    }
}

/// Stateless fill resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct FillModel {
    params: FillParams,
}

impl FillModel {
    pub fn new(params: FillParams) -> Self {
        Self { params }
    }

    /// Probability in `[0, 1]` that `order` fills against the current
    /// market state.
    ///
    /// `queue_position` is the estimated shares ahead at the order's
    /// price; `latency_us` is the order's age at the check.
    pub fn fill_probability(
        &self,
        order: &Order,
        tick: &Tick,
        queue_position: f64,
        volatility: f64,
        latency_us: i64,
        adverse_enabled: bool,
    ) -> f64 {
        let p = &self.params;

        // Marketable orders short-circuit: at or through the opposite
        // top the order trades immediately and none of the decay terms
        // apply.
        let marketable = match order.side {
            Side::Buy => order.price >= tick.ask_price,
            Side::Sell => order.price <= tick.bid_price,
        };
        if marketable {
            return 1.0;
        }

        let mut prob = p.base_fill_probability;

        // Queue position: front of queue fills first
        prob *= (-p.queue_position_decay * queue_position).exp();

        // Wide spread: less crossing flow
        let spread_bps = if tick.mid_price > 0.0 {
            (tick.ask_price - tick.bid_price) / tick.mid_price * 10_000.0
        } else {
            0.0
        };
        prob *= (-p.spread_sensitivity * spread_bps).exp();

        // Volatility: more informed flow on the other side
        prob *= (-p.volatility_impact * volatility).exp();

        // Outside our own top: far from the market
        let far_from_market = match order.side {
            Side::Buy => order.price < tick.bid_price,
            Side::Sell => order.price > tick.ask_price,
        };
        if far_from_market {
            prob *= 0.1;
        }

        // Stale information penalty
        prob *= (-p.latency_penalty_per_us * latency_us as f64).exp();

        // Adverse move since submit: the mid has traded through us
        if adverse_enabled {
            let adverse_move = match order.side {
                Side::Buy => tick.mid_price > order.price,
                Side::Sell => tick.mid_price < order.price,
            };
            if adverse_move {
                prob *= 1.0 - p.adverse_selection_penalty;
            }
        }

        prob.clamp(0.0, 1.0)
    }

    /// Square-root market impact: `0.5 · sqrt(size_fraction)` bps of mid.
    pub fn slippage(&self, tick: &Tick, order_size_fraction: f64) -> f64 {
        let base_impact_bps = 0.5;
        let impact_bps = base_impact_bps * order_size_fraction.max(0.0).sqrt();
        impact_bps / 10_000.0 * tick.mid_price
    }

    pub fn params(&self) -> &FillParams {
        &self.params
    }
}
