//! Multivariate Hawkes intensity estimation with a power-law kernel
//!
//! Models buy/sell order arrivals as self- and cross-exciting point
//! processes:
//!
//! ```text
//! λ_s(t) = μ_s + Σ_{k same side} α_self  · (β + Δt_k)^(-γ)
//!              + Σ_{k other side} α_cross · (β + Δt_k)^(-γ)
//! ```
//!
//! with `Δt_k` in seconds over the retained event history. Both
//! intensities are recomputed in full on every update; history is bounded
//! at `max_history` events per side, oldest evicted first.

use std::collections::VecDeque;

use crate::types::{ArrivalEvent, Side};

/// Intensity floor preventing a zero/negative λ
const MIN_INTENSITY: f64 = 1e-10;

/// Hawkes engine parameters.
///
/// `gamma <= 1` is coerced to 1.5 (kernel must decay summably) and
/// `beta <= 0` to 1e-6 (kernel offset must not hit the singularity).
#[derive(Debug, Clone, Copy)]
pub struct HawkesParams {
    /// Baseline buy intensity μ_b
    pub mu_buy: f64,
    /// Baseline sell intensity μ_s
    pub mu_sell: f64,
    /// Same-side excitation α_self
    pub alpha_self: f64,
    /// Opposite-side excitation α_cross
    pub alpha_cross: f64,
    /// Power-law kernel offset β
    pub beta: f64,
    /// Power-law decay exponent γ
    pub gamma: f64,
    /// Events retained per side
    pub max_history: usize,
}

impl Default for HawkesParams {
    fn default() -> Self {
        Self {
            mu_buy: 0.5,
            mu_sell: 0.5,
            alpha_self: 0.3,
            alpha_cross: 0.1,
            beta: 1e-6,
            gamma: 1.5,
            max_history: 1000,
        }
    }
}

/// Self-/cross-exciting intensity estimator over buy/sell arrivals.
pub struct HawkesEngine {
    params: HawkesParams,
    buy_events: VecDeque<ArrivalEvent>,
    sell_events: VecDeque<ArrivalEvent>,
    current_time_ns: i64,
    intensity_buy: f64,
    intensity_sell: f64,
}

impl HawkesEngine {
    pub fn new(mut params: HawkesParams) -> Self {
        if params.gamma <= 1.0 {
            tracing::warn!(
                "hawkes gamma {} <= 1 does not converge, coercing to 1.5",
                params.gamma
            );
            params.gamma = 1.5;
        }
        if params.beta <= 0.0 {
            params.beta = 1e-6;
        }

        Self {
            intensity_buy: params.mu_buy,
            intensity_sell: params.mu_sell,
            buy_events: VecDeque::with_capacity(params.max_history),
            sell_events: VecDeque::with_capacity(params.max_history),
            current_time_ns: 0,
            params,
        }
    }

    /// Ingest one arrival and recompute both intensities at its time.
    pub fn update(&mut self, event: ArrivalEvent) {
        self.current_time_ns = event.arrival_time_ns;

        let queue = match event.side {
            Side::Buy => &mut self.buy_events,
            Side::Sell => &mut self.sell_events,
        };
        queue.push_back(event);
        if queue.len() > self.params.max_history {
            queue.pop_front();
        }

        self.intensity_buy = self.compute_intensity(Side::Buy, self.current_time_ns);
        self.intensity_sell = self.compute_intensity(Side::Sell, self.current_time_ns);
    }

    /// Current λ_buy
    #[inline(always)]
    pub fn buy_intensity(&self) -> f64 {
        self.intensity_buy
    }

    /// Current λ_sell
    #[inline(always)]
    pub fn sell_intensity(&self) -> f64 {
        self.intensity_sell
    }

    /// `(λ_b - λ_s) / (λ_b + λ_s)`, 0 when the total is negligible.
    /// Positive means buy pressure.
    #[inline]
    pub fn intensity_imbalance(&self) -> f64 {
        let total = self.intensity_buy + self.intensity_sell;
        if total < MIN_INTENSITY {
            return 0.0;
        }
        (self.intensity_buy - self.intensity_sell) / total
    }

    /// Evaluate λ_buy at `horizon_ns` past the last event, same history.
    pub fn predict_buy_intensity(&self, horizon_ns: i64) -> f64 {
        self.compute_intensity(Side::Buy, self.current_time_ns + horizon_ns)
    }

    /// Evaluate λ_sell at `horizon_ns` past the last event, same history.
    pub fn predict_sell_intensity(&self, horizon_ns: i64) -> f64 {
        self.compute_intensity(Side::Sell, self.current_time_ns + horizon_ns)
    }

    /// Clear history and return to the baselines.
    pub fn reset(&mut self) {
        self.buy_events.clear();
        self.sell_events.clear();
        self.intensity_buy = self.params.mu_buy;
        self.intensity_sell = self.params.mu_sell;
        self.current_time_ns = 0;
        tracing::debug!("hawkes engine reset");
    }

    pub fn buy_event_count(&self) -> usize {
        self.buy_events.len()
    }

    pub fn sell_event_count(&self) -> usize {
        self.sell_events.len()
    }

    pub fn params(&self) -> &HawkesParams {
        &self.params
    }

    /// `K(τ) = (β + τ)^(-γ)`
    #[inline(always)]
    fn kernel(&self, tau_seconds: f64) -> f64 {
        if tau_seconds < 0.0 {
            return 0.0;
        }
        (self.params.beta + tau_seconds).powf(-self.params.gamma)
    }

    fn compute_intensity(&self, side: Side, eval_time_ns: i64) -> f64 {
        let mut intensity = match side {
            Side::Buy => self.params.mu_buy,
            Side::Sell => self.params.mu_sell,
        };

        let (same, cross) = match side {
            Side::Buy => (&self.buy_events, &self.sell_events),
            Side::Sell => (&self.sell_events, &self.buy_events),
        };

        for event in same {
            if event.arrival_time_ns < eval_time_ns {
                let tau = (eval_time_ns - event.arrival_time_ns) as f64 * 1e-9;
                intensity += self.params.alpha_self * self.kernel(tau);
            }
        }
        for event in cross {
            if event.arrival_time_ns < eval_time_ns {
                let tau = (eval_time_ns - event.arrival_time_ns) as f64 * 1e-9;
                intensity += self.params.alpha_cross * self.kernel(tau);
            }
        }

        intensity.max(MIN_INTENSITY)
    }
}
