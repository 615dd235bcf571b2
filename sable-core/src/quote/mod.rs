//! Avellaneda-Stoikov quote computation
//!
//! Closed-form market-making quotes under a geometric-Brownian mid with
//! inventory penalty, extended with a latency-awareness term:
//!
//! ```text
//! r       = mid - q·γ·σ²·(T-t)                     (reservation price)
//! δ       = γ·σ²·(T-t) + (2/γ)·ln(1 + γ/k)         (optimal spread)
//! bid/ask = r ∓ half-spread, skewed by tanh(2q/q_max)
//! ```
//!
//! If the latency cost exceeds the expected half-spread profit the spread
//! widens to compensate; `should_quote` refuses to quote at all unless
//! the half-spread clears the latency cost with a 10% margin.

use crate::errors::ConfigError;
use crate::types::QuoteSet;

/// Seconds of trading per year: 252 sessions x 6.5 hours
const TRADING_SECONDS_PER_YEAR: f64 = 252.0 * 6.5 * 3600.0;

/// Calibrated quote-engine parameters; validated at construction.
#[derive(Debug, Clone, Copy)]
pub struct QuoteParams {
    /// Risk aversion γ
    pub gamma: f64,
    /// Annualized volatility σ
    pub sigma_annual: f64,
    /// Market order arrival rate k
    pub k: f64,
    /// Minimum price increment
    pub tick_size: f64,
    /// Inventory magnitude the skew saturates against
    pub max_inventory: i64,
    /// Base quote size in units
    pub base_size: u64,
    /// Round-trip system latency used for the latency-cost term
    pub latency_ns: i64,
}

impl Default for QuoteParams {
    fn default() -> Self {
        Self {
            gamma: 0.01,
            sigma_annual: 0.20,
            k: 10.0,
            tick_size: 0.01,
            max_inventory: 1000,
            base_size: 100,
            latency_ns: 850,
        }
    }
}

impl QuoteParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gamma <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "gamma",
                value: self.gamma,
            });
        }
        if self.k <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "k",
                value: self.k,
            });
        }
        if self.sigma_annual <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "sigma_annual",
                value: self.sigma_annual,
            });
        }
        if self.tick_size <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "tick_size",
                value: self.tick_size,
            });
        }
        if self.max_inventory <= 0 {
            return Err(ConfigError::NonPositive {
                name: "max_inventory",
                value: self.max_inventory as f64,
            });
        }
        Ok(())
    }
}

/// Avellaneda-Stoikov quote engine with inventory skew and latency-aware
/// spread widening.
#[derive(Debug, Clone)]
pub struct QuoteEngine {
    params: QuoteParams,
    /// Per-second variance, precomputed from the annualized σ
    sigma_sq_per_s: f64,
    /// Spread floor: two ticks
    min_spread: f64,
}

impl QuoteEngine {
    pub fn new(params: QuoteParams) -> Result<Self, ConfigError> {
        params.validate()?;

        let sigma_per_s = params.sigma_annual / TRADING_SECONDS_PER_YEAR.sqrt();
        Ok(Self {
            sigma_sq_per_s: sigma_per_s * sigma_per_s,
            min_spread: params.tick_size * 2.0,
            params,
        })
    }

    /// Compute skewed two-sided quotes.
    ///
    /// `mid <= 0` or `time_remaining_s <= 0` produce the no-quote result
    /// with zero prices.
    pub fn calculate(
        &self,
        mid: f64,
        inventory: i64,
        time_remaining_s: f64,
        latency_cost: f64,
    ) -> QuoteSet {
        if mid <= 0.0 || time_remaining_s <= 0.0 {
            return QuoteSet::none();
        }

        // Reservation price: mid shifted against inventory
        let inventory_penalty =
            inventory as f64 * self.params.gamma * self.sigma_sq_per_s * time_remaining_s;
        let reservation = mid - inventory_penalty;

        // Optimal spread, floored at two ticks
        let time_component = self.params.gamma * self.sigma_sq_per_s * time_remaining_s;
        let arrival_component =
            (2.0 / self.params.gamma) * (1.0 + self.params.gamma / self.params.k).ln();
        let mut spread = (time_component + arrival_component).max(self.min_spread);

        // Latency widening: expected profit per fill is the half-spread
        let mut half_spread = spread / 2.0;
        if latency_cost > half_spread {
            spread += 2.0 * (latency_cost - half_spread);
            half_spread = spread / 2.0;
        }

        // Inventory skew in (-1, 1): long widens the bid side away,
        // short widens the ask side away
        let skew = (2.0 * inventory as f64 / self.params.max_inventory as f64).tanh();
        let bid_half = half_spread * (1.0 - skew);
        let ask_half = half_spread * (1.0 + skew);

        let mut bid_price = self.round_to_tick(reservation - bid_half);
        let ask_price = self.round_to_tick(reservation + ask_half);
        if bid_price >= ask_price {
            bid_price = ask_price - self.params.tick_size;
        }

        QuoteSet {
            bid_price,
            ask_price,
            bid_size: self.quote_size(true, inventory),
            ask_size: self.quote_size(false, inventory),
            spread: ask_price - bid_price,
            mid_price: mid,
        }
    }

    /// Expected adverse price movement over the system latency:
    /// `σ_now · sqrt(latency_s) · mid`.
    pub fn latency_cost(&self, sigma_now: f64, mid: f64) -> f64 {
        let latency_s = self.params.latency_ns as f64 * 1e-9;
        sigma_now * latency_s.sqrt() * mid
    }

    /// Quote only when the half-spread clears the latency cost with a
    /// 10% safety margin.
    #[inline]
    pub fn should_quote(&self, spread: f64, latency_cost: f64) -> bool {
        spread / 2.0 > latency_cost * 1.1
    }

    pub fn set_volatility(&mut self, sigma_annual: f64) {
        self.params.sigma_annual = sigma_annual;
        let sigma_per_s = sigma_annual / TRADING_SECONDS_PER_YEAR.sqrt();
        self.sigma_sq_per_s = sigma_per_s * sigma_per_s;
    }

    pub fn set_risk_aversion(&mut self, gamma: f64) {
        self.params.gamma = gamma;
    }

    pub fn set_latency_ns(&mut self, latency_ns: i64) {
        self.params.latency_ns = latency_ns;
    }

    pub fn params(&self) -> &QuoteParams {
        &self.params
    }

    /// Base size, boosted on the inventory-reducing side
    fn quote_size(&self, is_bid: bool, inventory: i64) -> u64 {
        let base = self.params.base_size as f64;
        let reducing = (is_bid && inventory < 0) || (!is_bid && inventory > 0);
        if reducing {
            let ratio = inventory.unsigned_abs() as f64 / self.params.max_inventory as f64;
            (base * (1.0 + ratio)) as u64
        } else {
            base as u64
        }
    }

    #[inline(always)]
    fn round_to_tick(&self, price: f64) -> f64 {
        (price / self.params.tick_size).round() * self.params.tick_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> QuoteEngine {
        QuoteEngine::new(QuoteParams::default()).unwrap()
    }

    fn assert_on_tick(price: f64, tick: f64) {
        let ratio = price / tick;
        assert!(
            (ratio - ratio.round()).abs() < 1e-6,
            "{} not a multiple of {}",
            price,
            tick
        );
    }

    #[test]
    fn test_invalid_params_rejected() {
        let bad = QuoteParams {
            gamma: 0.0,
            ..QuoteParams::default()
        };
        assert!(QuoteEngine::new(bad).is_err());

        let bad = QuoteParams {
            k: -1.0,
            ..QuoteParams::default()
        };
        assert!(QuoteEngine::new(bad).is_err());
    }

    #[test]
    fn test_invalid_inputs_produce_no_quote() {
        let e = engine();
        assert_eq!(e.calculate(0.0, 0, 600.0, 0.0), QuoteSet::none());
        assert_eq!(e.calculate(-5.0, 0, 600.0, 0.0), QuoteSet::none());
        assert_eq!(e.calculate(100.0, 0, 0.0, 0.0), QuoteSet::none());
        assert_eq!(e.calculate(100.0, 0, -1.0, 0.0), QuoteSet::none());
    }

    #[test]
    fn test_bid_below_ask_and_on_tick() {
        let e = engine();
        for inventory in [-900, -100, 0, 100, 900] {
            let q = e.calculate(100.0, inventory, 600.0, 0.0);
            assert!(q.bid_price < q.ask_price, "inventory {}", inventory);
            assert_on_tick(q.bid_price, 0.01);
            assert_on_tick(q.ask_price, 0.01);
        }
    }

    #[test]
    fn test_flat_inventory_is_symmetric() {
        let e = engine();
        let q = e.calculate(100.0, 0, 600.0, 0.0);

        let bid_dist = 100.0 - q.bid_price;
        let ask_dist = q.ask_price - 100.0;
        assert!((bid_dist - ask_dist).abs() < 0.011, "skew without inventory");
        assert_eq!(q.bid_size, 100);
        assert_eq!(q.ask_size, 100);
    }

    #[test]
    fn test_long_inventory_skews_quotes() {
        let e = engine();
        let flat = e.calculate(100.0, 0, 600.0, 0.0);
        let long = e.calculate(100.0, 800, 600.0, 0.0);

        // Positive skew: the bid half-spread shrinks, the ask half-spread
        // grows, and both quotes sit above their flat counterparts
        assert!(long.bid_price > flat.bid_price);
        assert!(long.ask_price > flat.ask_price);
        assert!(long.bid_price < long.ask_price);

        // Inventory-reducing side (ask) gets the size boost
        assert_eq!(long.bid_size, 100);
        assert!(long.ask_size > 100);
    }

    #[test]
    fn test_short_inventory_boosts_bid() {
        let e = engine();
        let short = e.calculate(100.0, -500, 600.0, 0.0);
        assert!(short.bid_size > 100);
        assert_eq!(short.ask_size, 100);
        assert!(short.bid_price < short.ask_price);
    }

    #[test]
    fn test_spread_floor_two_ticks() {
        // Tiny gamma/vol: optimal spread would collapse below the floor
        let e = QuoteEngine::new(QuoteParams {
            gamma: 0.0001,
            sigma_annual: 0.01,
            k: 1000.0,
            ..QuoteParams::default()
        })
        .unwrap();

        let q = e.calculate(100.0, 0, 1.0, 0.0);
        assert!(q.spread >= 2.0 * 0.01 - 1e-9);
    }

    #[test]
    fn test_latency_cost_widens_spread() {
        let e = engine();
        let cheap = e.calculate(100.0, 0, 600.0, 0.0);

        // A latency cost above the half-spread forces widening
        let cost = cheap.spread; // 2x the half-spread
        let wide = e.calculate(100.0, 0, 600.0, cost);
        assert!(wide.spread > cheap.spread);
    }

    #[test]
    fn test_latency_cost_formula() {
        let e = engine(); // 850 ns
        let cost = e.latency_cost(0.20, 100.0);
        let expected = 0.20 * (850e-9_f64).sqrt() * 100.0;
        assert!((cost - expected).abs() < 1e-12);
    }

    #[test]
    fn test_should_quote_margin() {
        let e = engine();
        assert!(e.should_quote(1.0, 0.40));
        // Half-spread 0.5 does not clear 1.1 x 0.46
        assert!(!e.should_quote(1.0, 0.46));
    }

    #[test]
    fn test_sweep_rebuild_changes_latency() {
        let mut e = engine();
        let before = e.latency_cost(0.20, 100.0);
        e.set_latency_ns(2_000);
        let after = e.latency_cost(0.20, 100.0);
        assert!(after > before);
    }
}
