//! Deterministic backtest engine
//!
//! Single-threaded historical replay of the full decision pipeline.
//! Per event, in order: advance the clock, feed the intensity engine,
//! run the persistence filter, quote and risk-check, submit, resolve
//! fills for every order past the latency floor, recompute PnL, record
//! state and sample the replay log.
//!
//! Determinism: the engine owns every component (no globals), the only
//! randomness is the seeded LCG driving fill draws, and no wall-clock
//! call happens during replay. An order that is not filled on its first
//! eligibility check is cancelled; there is no resting and no retry.

use std::collections::BTreeMap;

use anyhow::{Context, Result};

use sable_core::quote::{QuoteEngine, QuoteParams};
use sable_core::risk::{RiskGate, RiskLimits, RiskStats};
use sable_core::signal::hawkes::{HawkesEngine, HawkesParams};
use sable_core::signal::temporal::TemporalFilter;
use sable_core::types::{ArrivalEvent, Order, Side, Tick};

use crate::config::SimConfig;
use crate::event::{load_events_csv, HistoricalEvent};
use crate::fill::FillModel;
use crate::metrics::{PerformanceMetrics, TradeRecord};
use crate::replay_log::ReplayLogger;
use crate::rng::Lcg;

/// Session horizon handed to the quote computation, seconds
const TIME_HORIZON_S: f64 = 600.0;
/// Volatility input for the latency-cost term
const LATENCY_COST_SIGMA: f64 = 0.20;
/// Fallback volatility before the equity curve has depth
const DEFAULT_VOLATILITY: f64 = 0.20;

/// A simulated order from submit to fill-or-cancel.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedOrder {
    pub order: Order,
    pub submit_time_ns: i64,
    pub fill_time_ns: i64,
    pub fill_price: f64,
    pub filled_quantity: u64,
    pub is_filled: bool,
    pub is_cancelled: bool,
    /// Estimated shares ahead at the order's price at submit
    pub queue_position: f64,
}

impl SimulatedOrder {
    fn new(order: Order, submit_time_ns: i64, queue_position: f64) -> Self {
        Self {
            order,
            submit_time_ns,
            fill_time_ns: 0,
            fill_price: 0.0,
            filled_quantity: 0,
            is_filled: false,
            is_cancelled: false,
            queue_position,
        }
    }
}

/// Per-run counters surfaced next to the metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunCounters {
    pub events_replayed: u64,
    pub signals_generated: u64,
    pub orders_submitted: u64,
    pub orders_filled: u64,
    pub orders_cancelled: u64,
}

/// The deterministic replay engine. Owns every component it drives.
pub struct Backtester {
    config: SimConfig,

    hawkes: HawkesEngine,
    filter: TemporalFilter,
    quote_engine: QuoteEngine,
    risk: RiskGate,
    fill_model: FillModel,
    rng: Lcg,

    events: Vec<HistoricalEvent>,
    input_sha256: String,
    replay: Option<ReplayLogger>,

    // Replay state
    current_time_ns: i64,
    current_position: i64,
    current_capital: f64,
    realized_pnl: f64,
    unrealized_pnl: f64,
    order_id_counter: u64,
    active_orders: Vec<SimulatedOrder>,
    filled_orders: Vec<SimulatedOrder>,

    // Recorded series
    pnl_history: Vec<f64>,
    timestamps: Vec<i64>,
    quoted_spreads_bps: Vec<f64>,

    counters: RunCounters,
}

impl Backtester {
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate().context("simulator configuration")?;

        let hawkes = HawkesEngine::new(HawkesParams::default());
        let quote_engine = QuoteEngine::new(QuoteParams {
            max_inventory: config.max_position,
            latency_ns: config.simulated_latency_ns,
            ..QuoteParams::default()
        })
        .context("quote engine parameters")?;
        let risk = RiskGate::new(RiskLimits {
            max_position: config.max_position,
            max_order_notional: 50_000.0,
            max_daily_notional: 10_000_000.0,
            max_order_size: 500,
            allow_short: true,
        })
        .context("risk limits")?;

        Ok(Self {
            rng: Lcg::new(config.random_seed),
            hawkes,
            filter: TemporalFilter::new(),
            quote_engine,
            risk,
            fill_model: FillModel::default(),
            events: Vec::new(),
            input_sha256: String::new(),
            replay: None,
            current_time_ns: 0,
            current_position: 0,
            current_capital: config.initial_capital,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            order_id_counter: 1,
            active_orders: Vec::new(),
            filled_orders: Vec::new(),
            pnl_history: Vec::new(),
            timestamps: Vec::new(),
            quoted_spreads_bps: Vec::new(),
            counters: RunCounters::default(),
            config,
        })
    }

    /// Load and sort the historical event CSV; remembers its SHA-256.
    pub fn load_events(&mut self, path: &str) -> Result<()> {
        let loaded = load_events_csv(path)?;
        self.events = loaded.events;
        self.input_sha256 = loaded.input_sha256;
        Ok(())
    }

    /// Supply events directly (tests, synthetic runs).
    pub fn set_events(&mut self, events: Vec<HistoricalEvent>, input_sha256: String) {
        self.events = events;
        self.input_sha256 = input_sha256;
    }

    /// Attach a replay log to the next run.
    pub fn with_replay_log(&mut self, path: &str) -> Result<()> {
        self.replay = Some(ReplayLogger::create(path)?);
        Ok(())
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn risk_stats(&self) -> RiskStats {
        self.risk.stats()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Run the full replay and compute metrics.
    pub fn run(&mut self) -> Result<PerformanceMetrics> {
        anyhow::ensure!(!self.events.is_empty(), "no historical events loaded");

        self.reset_run_state();

        tracing::info!(
            "starting deterministic replay: {} events, latency {} ns (effective {} ns), seed {}",
            self.events.len(),
            self.config.simulated_latency_ns,
            self.config.effective_latency_ns(),
            self.config.random_seed
        );

        if let Some(log) = &mut self.replay {
            let config_json =
                serde_json::to_string(&self.config).context("serialize configuration")?;
            log.log_config(&config_json, self.config.random_seed, &self.input_sha256);
        }

        let events = std::mem::take(&mut self.events);
        let progress_interval = (events.len() / 10).max(1);
        let mut final_mid = 0.0;

        for (i, event) in events.iter().enumerate() {
            self.current_time_ns = event.timestamp_ns;
            let tick = event.to_tick();
            final_mid = tick.mid_price;

            // The first event only establishes market state
            if i == 0 {
                continue;
            }
            self.counters.events_replayed += 1;

            self.step(&tick);

            if let Some(log) = &mut self.replay {
                if i % 100 == 0 {
                    log.log_market_tick(
                        self.current_time_ns,
                        tick.bid_price,
                        tick.ask_price,
                        tick.bid_size,
                        tick.ask_size,
                    );
                }
                if i % 1000 == 0 {
                    log.log_pnl(
                        self.current_time_ns,
                        self.realized_pnl,
                        self.unrealized_pnl,
                        self.current_position,
                    );
                }
            }

            if i % progress_interval == 0 {
                tracing::debug!(
                    "replay {:.0}%: pnl {:.2}",
                    i as f64 / events.len() as f64 * 100.0,
                    self.realized_pnl + self.unrealized_pnl
                );
            }
        }

        self.events = events;

        if let Some(log) = &mut self.replay {
            log.flush()?;
        }

        tracing::info!(
            "replay complete: {} signals, {} submitted, {} filled, {} cancelled, {} risk-rejected",
            self.counters.signals_generated,
            self.counters.orders_submitted,
            self.counters.orders_filled,
            self.counters.orders_cancelled,
            self.risk.stats().total_rejected()
        );
        tracing::info!(
            "capital after commissions: {:.2} (started {:.2})",
            self.current_capital,
            self.config.initial_capital
        );

        let metrics = PerformanceMetrics::compute(
            &self.pnl_history,
            &self.timestamps,
            &self.quoted_spreads_bps,
            &self.trade_records(),
            self.counters.orders_submitted,
            self.config.initial_capital,
            final_mid,
        );
        Ok(metrics)
    }

    /// Rerun the full simulation for each latency in the sweep list,
    /// rebuilding the quote engine each time.
    pub fn run_latency_sweep(&mut self) -> Result<BTreeMap<i64, PerformanceMetrics>> {
        let sweep = self.config.latency_sweep_ns.clone();
        let mut results = BTreeMap::new();

        tracing::info!("latency sensitivity sweep: {:?} ns", sweep);
        for latency_ns in sweep {
            self.config.simulated_latency_ns = latency_ns;
            self.quote_engine.set_latency_ns(latency_ns);

            let metrics = self.run()?;
            tracing::info!(
                "latency {} ns -> pnl {:.2}, sharpe {:.3}, fill rate {:.1}%",
                latency_ns,
                metrics.total_pnl,
                metrics.sharpe_ratio,
                metrics.fill_rate * 100.0
            );
            results.insert(latency_ns, metrics);
        }

        Ok(results)
    }

    // ===== one event =====

    fn step(&mut self, tick: &Tick) {
        // 1. Intensity update: trade aggressor side, BUY when no trade
        let side = if tick.trade_volume > 0 {
            tick.trade_side
        } else {
            Side::Buy
        };
        self.hawkes
            .update(ArrivalEvent::new(self.current_time_ns, side));

        // 2. Decision
        self.generate_and_submit(tick);

        // 3. Resolve every order past the latency floor
        self.process_fill_check(tick);

        // 4. Mark PnL and record state
        self.update_pnl(tick);
        self.record_state(tick);
    }

    fn generate_and_submit(&mut self, tick: &Tick) {
        let obi = self.hawkes.intensity_imbalance();
        let decision = self.filter.observe(self.current_time_ns, obi);
        if !decision.persistent {
            return;
        }

        let latency_cost = self
            .quote_engine
            .latency_cost(LATENCY_COST_SIGMA, tick.mid_price);
        let quotes = self.quote_engine.calculate(
            tick.mid_price,
            self.current_position,
            TIME_HORIZON_S,
            latency_cost,
        );
        if !quotes.is_quotable() || quotes.bid_price >= quotes.ask_price {
            return;
        }
        if !self.quote_engine.should_quote(quotes.spread, latency_cost) && quotes.spread <= 1e-4 {
            return;
        }

        self.counters.signals_generated += 1;
        if let Some(log) = &mut self.replay {
            let side_str = if decision.direction > 0 { "BUY" } else { "SELL" };
            log.log_signal(
                self.current_time_ns,
                true,
                side_str,
                decision.strength(),
                decision.confirmation_ticks,
                decision.obi,
            );
        }

        self.submit_order(Side::Buy, quotes.bid_price, quotes.bid_size, tick);
        self.submit_order(Side::Sell, quotes.ask_price, quotes.ask_size, tick);
    }

    fn submit_order(&mut self, side: Side, price: f64, quantity: u64, tick: &Tick) {
        if price <= 0.0 || quantity == 0 {
            return;
        }

        let mut order = Order::new(self.order_id_counter, tick.asset_id, side, price, quantity);
        order.submit_time_ns = self.current_time_ns;

        // Pre-trade gate; a rejection is counted, not an error
        if self.risk.check(&order, self.current_position).is_err() {
            return;
        }
        self.order_id_counter += 1;
        self.counters.orders_submitted += 1;

        // Queue estimate: half the visible size on our side
        let queue_position = match side {
            Side::Buy => tick.bid_size as f64 / 2.0,
            Side::Sell => tick.ask_size as f64 / 2.0,
        };

        self.active_orders
            .push(SimulatedOrder::new(order, self.current_time_ns, queue_position));

        if let Some(log) = &mut self.replay {
            log.log_order_submit(
                self.current_time_ns,
                order.order_id,
                &side.to_string(),
                price,
                quantity,
            );
        }
    }

    /// One fill decision per order, at its first check past the enforced
    /// latency. Not filled means cancelled; nothing rests.
    fn process_fill_check(&mut self, tick: &Tick) {
        let effective_latency = self.config.effective_latency_ns();
        let volatility = self.estimate_volatility();

        let mut i = 0;
        while i < self.active_orders.len() {
            let age_ns = self.current_time_ns - self.active_orders[i].submit_time_ns;
            if age_ns < effective_latency {
                i += 1;
                continue;
            }

            // Submission order is resolution order
            let mut sim = self.active_orders.remove(i);
            let latency_us = age_ns / 1_000;

            let fill_prob = self.fill_model.fill_probability(
                &sim.order,
                tick,
                sim.queue_position,
                volatility,
                latency_us,
                self.config.enable_adverse_selection,
            );

            let draw = self.rng.next_f64();
            if draw < fill_prob {
                sim.is_filled = true;
                sim.fill_time_ns = self.current_time_ns;
                sim.fill_price = sim.order.price;
                sim.filled_quantity = sim.order.quantity;

                if self.config.enable_slippage {
                    let visible = (tick.bid_size + tick.ask_size).max(1);
                    let fraction = sim.order.quantity as f64 / visible as f64;
                    let slip = self.fill_model.slippage(tick, fraction);
                    match sim.order.side {
                        Side::Buy => sim.fill_price += slip,
                        Side::Sell => sim.fill_price -= slip,
                    }
                }

                match sim.order.side {
                    Side::Buy => self.current_position += sim.filled_quantity as i64,
                    Side::Sell => self.current_position -= sim.filled_quantity as i64,
                }

                let commission = self.config.commission_per_share * sim.filled_quantity as f64;
                self.current_capital -= commission;
                self.risk
                    .record_fill(sim.fill_price * sim.filled_quantity as f64);

                self.counters.orders_filled += 1;
                if let Some(log) = &mut self.replay {
                    log.log_order_fill(
                        self.current_time_ns,
                        sim.order.order_id,
                        sim.fill_price,
                        sim.filled_quantity,
                        age_ns as u64,
                    );
                }

                self.filled_orders.push(sim);
            } else {
                sim.is_cancelled = true;
                self.counters.orders_cancelled += 1;
                if let Some(log) = &mut self.replay {
                    log.log_order_cancel(self.current_time_ns, sim.order.order_id, "not_filled");
                }
            }
        }
    }

    /// Realized marks every fill against the current mid; unrealized is
    /// the position's notional at the current mid. A realized-equity
    /// curve, kept as-is for reproducibility.
    fn update_pnl(&mut self, tick: &Tick) {
        self.unrealized_pnl = self.current_position as f64 * tick.mid_price;

        let mut realized = 0.0;
        for filled in &self.filled_orders {
            let qty = filled.filled_quantity as f64;
            realized += match filled.order.side {
                Side::Buy => (tick.mid_price - filled.fill_price) * qty,
                Side::Sell => (filled.fill_price - tick.mid_price) * qty,
            };
        }
        self.realized_pnl = realized;
    }

    fn record_state(&mut self, tick: &Tick) {
        self.pnl_history.push(self.realized_pnl + self.unrealized_pnl);
        self.timestamps.push(self.current_time_ns);
        self.quoted_spreads_bps.push(tick.spread_bps());
    }

    /// Annualized volatility of the recorded equity changes; the default
    /// until the curve has depth.
    fn estimate_volatility(&self) -> f64 {
        if self.pnl_history.len() < 10 {
            return DEFAULT_VOLATILITY;
        }

        let n = self.pnl_history.len().min(100);
        let mut returns = Vec::with_capacity(n - 1);
        for i in 1..n {
            let prev = self.pnl_history[i - 1];
            returns.push((self.pnl_history[i] - prev) / (prev.abs() + 1e-10));
        }

        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance =
            returns.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / returns.len() as f64;
        (variance * 252.0 * 6.5 * 3600.0).sqrt()
    }

    fn trade_records(&self) -> Vec<TradeRecord> {
        self.filled_orders
            .iter()
            .map(|f| TradeRecord {
                side: f.order.side,
                fill_price: f.fill_price,
                quantity: f.filled_quantity,
            })
            .collect()
    }

    fn reset_run_state(&mut self) {
        self.current_time_ns = 0;
        self.current_position = 0;
        self.current_capital = self.config.initial_capital;
        self.realized_pnl = 0.0;
        self.unrealized_pnl = 0.0;
        self.order_id_counter = 1;
        self.active_orders.clear();
        self.filled_orders.clear();
        self.pnl_history.clear();
        self.timestamps.clear();
        self.quoted_spreads_bps.clear();
        self.counters = RunCounters::default();

        self.rng = Lcg::new(self.config.random_seed);
        self.hawkes.reset();
        self.filter.reset();
        self.risk.reset_daily();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Buy-heavy trade flow: intensity imbalance turns persistently
    /// positive within a few ticks.
    fn buy_flow_events(count: usize, spacing_ns: i64) -> Vec<HistoricalEvent> {
        (0..count)
            .map(|i| {
                let price = 100.0 + (i % 50) as f64 * 0.001;
                let half = price * 0.0001;
                HistoricalEvent {
                    timestamp_ns: 1_000_000 + i as i64 * spacing_ns,
                    asset_id: 1,
                    bid_price: price - half,
                    ask_price: price + half,
                    bid_size: 100,
                    ask_size: 100,
                    trade_volume: 50,
                    trade_side: Side::Buy,
                }
            })
            .collect()
    }

    fn backtester(config: SimConfig, events: Vec<HistoricalEvent>) -> Backtester {
        let mut bt = Backtester::new(config).unwrap();
        bt.set_events(events, "test".to_string());
        bt
    }

    #[test]
    fn test_empty_events_rejected() {
        let mut bt = Backtester::new(SimConfig::default()).unwrap();
        assert!(bt.run().is_err());
    }

    #[test]
    fn test_persistent_buy_flow_generates_signals() {
        let mut bt = backtester(SimConfig::default(), buy_flow_events(200, 1_000));
        bt.run().unwrap();

        let counters = bt.counters();
        assert!(counters.signals_generated > 0, "buy flow must trade");
        // Two-sided quoting: two orders per accepted signal
        assert!(counters.orders_submitted >= counters.signals_generated);
        // Every submitted order resolves exactly once (bar the tail
        // still inside the latency window)
        assert_eq!(
            counters.orders_submitted,
            counters.orders_filled
                + counters.orders_cancelled
                + bt.active_orders.len() as u64
        );
    }

    #[test]
    fn test_same_seed_identical_runs() {
        let events = buy_flow_events(500, 1_000);

        let mut a = backtester(SimConfig::default(), events.clone());
        let mut b = backtester(SimConfig::default(), events);

        let ma = a.run().unwrap();
        let mb = b.run().unwrap();

        assert_eq!(ma.total_pnl, mb.total_pnl);
        assert_eq!(ma.equity_curve, mb.equity_curve);
        assert_eq!(a.counters().orders_filled, b.counters().orders_filled);
        assert_eq!(a.counters().orders_cancelled, b.counters().orders_cancelled);
    }

    #[test]
    fn test_rerun_is_reproducible() {
        let mut bt = backtester(SimConfig::default(), buy_flow_events(300, 1_000));
        let first = bt.run().unwrap();
        let second = bt.run().unwrap();
        assert_eq!(first.total_pnl, second.total_pnl);
        assert_eq!(first.equity_curve, second.equity_curve);
    }

    #[test]
    fn test_latency_floor_enforced_in_resolution() {
        // 100 ns spacing, 100 ns requested latency: without the floor
        // orders would resolve on the next event
        let mut config = SimConfig::default();
        config.simulated_latency_ns = 100;
        let mut bt = backtester(config, buy_flow_events(400, 100));
        bt.run().unwrap();

        for filled in &bt.filled_orders {
            assert!(filled.fill_time_ns - filled.submit_time_ns >= 550);
        }
        // Fills or cancels happened; either way nothing resolved early
        let resolved = bt.counters().orders_filled + bt.counters().orders_cancelled;
        assert!(resolved > 0);
    }

    #[test]
    fn test_no_retry_after_cancellation() {
        let mut bt = backtester(SimConfig::default(), buy_flow_events(300, 1_000));
        bt.run().unwrap();

        // Each order id appears at most once among resolutions
        let mut seen = std::collections::HashSet::new();
        for f in &bt.filled_orders {
            assert!(seen.insert(f.order.order_id));
        }
    }

    #[test]
    fn test_position_consistent_with_fills() {
        let mut bt = backtester(SimConfig::default(), buy_flow_events(500, 1_000));
        bt.run().unwrap();

        let net: i64 = bt
            .filled_orders
            .iter()
            .map(|f| match f.order.side {
                Side::Buy => f.filled_quantity as i64,
                Side::Sell => -(f.filled_quantity as i64),
            })
            .sum();
        assert_eq!(net, bt.current_position);
    }

    #[test]
    fn test_latency_sweep_covers_all_values() {
        let mut config = SimConfig::default();
        config.latency_sweep_ns = vec![100, 1_000];
        let mut bt = backtester(config, buy_flow_events(200, 1_000));

        let results = bt.run_latency_sweep().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.contains_key(&100));
        assert!(results.contains_key(&1_000));
    }
}
