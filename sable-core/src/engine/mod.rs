//! Live trading engine - compile-time dispatch, zero dynamic calls
//!
//! `Engine<S, E>` wires the pipeline together on the strategy core:
//! ticks in (from the ingress ring or any feed closure), decisions from
//! the strategy, orders out through the executor. Strategy and executor
//! are generic parameters resolved at compile time; there is no `dyn` on
//! the hot path and the whole tick handler inlines.
//!
//! The canonical strategy is [`MarketMakingStrategy`]: Hawkes intensity
//! imbalance, temporal persistence filtering, and Avellaneda-Stoikov
//! quotes. The canonical executor is [`NicExecutor`]: pre-trade risk
//! gate plus order frames onto the NIC TX ring.
//!
//! The backtest harness does not use this loop - it iterates historical
//! events in-memory - but it drives the same components.

use anyhow::Result;
use zerocopy::AsBytes;

use crate::ingress::nic::NicDriver;
use crate::quote::QuoteEngine;
use crate::risk::RiskGate;
use crate::signal::hawkes::HawkesEngine;
use crate::signal::temporal::TemporalFilter;
use crate::types::{ArrivalEvent, Order, QuoteSet, Side, Tick};

/// Strategy seam: one tick in, optionally one two-sided quote out.
///
/// The hot path; implementations should be branch-light and inline.
pub trait Strategy {
    fn on_tick(&mut self, tick: &Tick, position: i64) -> Option<QuoteSet>;

    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Reset state (start of session)
    fn reset(&mut self) {}
}

/// Executor seam: submit quotes, track position.
pub trait Executor {
    fn execute(&mut self, quotes: &QuoteSet, tick: &Tick) -> Result<()>;

    /// Cancel all outstanding orders
    fn cancel_all(&mut self) -> Result<()>;

    /// Current signed position
    fn position(&self) -> i64;

    /// Executor name for logging
    fn name(&self) -> &'static str;
}

/// Data touched on every tick, on its own cache line.
#[repr(C, align(64))]
struct HotData {
    tick_count: u64,
    signal_count: u64,
    invalid_ticks: u64,
    last_bid: f64,
    last_ask: f64,
}

impl HotData {
    const fn new() -> Self {
        Self {
            tick_count: 0,
            signal_count: 0,
            invalid_ticks: 0,
            last_bid: 0.0,
            last_ask: 0.0,
        }
    }

    /// Early-exit change detector: skip the strategy when the top of
    /// book did not move.
    #[inline(always)]
    fn market_changed(&mut self, bid: f64, ask: f64) -> bool {
        let changed = self.last_bid != bid || self.last_ask != ask;
        self.last_bid = bid;
        self.last_ask = ask;
        changed
    }
}

/// Engine statistics at shutdown
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    pub ticks_processed: u64,
    pub signals_generated: u64,
    pub invalid_ticks: u64,
    pub final_position: i64,
}

/// The live pipeline: `Engine<Strategy, Executor>` with full
/// monomorphization.
pub struct Engine<S: Strategy, E: Executor> {
    strategy: S,
    executor: E,
    hot: HotData,
}

impl<S: Strategy, E: Executor> Engine<S, E> {
    pub fn new(strategy: S, executor: E) -> Self {
        tracing::info!(
            "initializing engine: {} + {}",
            strategy.name(),
            executor.name()
        );
        Self {
            strategy,
            executor,
            hot: HotData::new(),
        }
    }

    /// Process one tick end to end.
    #[inline(always)]
    pub fn process_tick(&mut self, tick: &Tick) -> Result<()> {
        self.hot.tick_count += 1;

        // NaN/negative/crossed ticks are dropped with a counter bump
        if !tick.is_valid() {
            self.hot.invalid_ticks += 1;
            return Ok(());
        }

        // Unchanged top of book: nothing for the strategy to do
        if !self.hot.market_changed(tick.bid_price, tick.ask_price) {
            return Ok(());
        }

        let position = self.executor.position();
        if let Some(quotes) = self.strategy.on_tick(tick, position) {
            if quotes.is_quotable() {
                self.hot.signal_count += 1;
                self.executor.execute(&quotes, tick)?;
            }
        }

        Ok(())
    }

    /// Drive the engine from a feed closure until it is exhausted.
    pub fn run<F>(&mut self, mut feed_fn: F) -> Result<EngineStats>
    where
        F: FnMut() -> Result<Option<Tick>>,
    {
        tracing::info!("engine main loop started");

        while let Some(tick) = feed_fn()? {
            self.process_tick(&tick)?;
        }

        self.executor.cancel_all()?;
        let stats = self.stats();
        tracing::info!("engine stopped: {:?}", stats);
        Ok(stats)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            ticks_processed: self.hot.tick_count,
            signals_generated: self.hot.signal_count,
            invalid_ticks: self.hot.invalid_ticks,
            final_position: self.executor.position(),
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }
}

// ===== canonical strategy =====

/// Hawkes + temporal filter + Avellaneda-Stoikov, assembled.
pub struct MarketMakingStrategy {
    hawkes: HawkesEngine,
    filter: TemporalFilter,
    quote_engine: QuoteEngine,
    /// Session horizon handed to the quote computation
    time_horizon_s: f64,
    /// Current volatility estimate for the latency-cost term
    sigma_now: f64,
}

impl MarketMakingStrategy {
    pub fn new(hawkes: HawkesEngine, quote_engine: QuoteEngine, time_horizon_s: f64) -> Self {
        Self {
            hawkes,
            filter: TemporalFilter::new(),
            quote_engine,
            time_horizon_s,
            sigma_now: 0.20,
        }
    }

    pub fn set_volatility(&mut self, sigma_now: f64) {
        self.sigma_now = sigma_now;
    }

    pub fn hawkes(&self) -> &HawkesEngine {
        &self.hawkes
    }
}

impl Strategy for MarketMakingStrategy {
    #[inline]
    fn on_tick(&mut self, tick: &Tick, position: i64) -> Option<QuoteSet> {
        // Feed the intensity estimator: trade aggressor side, BUY when
        // the tick carried no trade
        let side = if tick.trade_volume > 0 {
            tick.trade_side
        } else {
            Side::Buy
        };
        self.hawkes
            .update(ArrivalEvent::new(tick.recv_time_ns, side));

        let obi = self.hawkes.intensity_imbalance();
        let decision = self.filter.observe(tick.recv_time_ns, obi);
        if !decision.persistent {
            return None;
        }

        let latency_cost = self.quote_engine.latency_cost(self.sigma_now, tick.mid_price);
        let quotes = self
            .quote_engine
            .calculate(tick.mid_price, position, self.time_horizon_s, latency_cost);
        if !quotes.is_quotable() {
            return None;
        }
        if !self.quote_engine.should_quote(quotes.spread, latency_cost) && quotes.spread <= 1e-4 {
            return None;
        }

        Some(quotes)
    }

    fn name(&self) -> &'static str {
        "MarketMakingStrategy"
    }

    fn reset(&mut self) {
        self.hawkes.reset();
        self.filter.reset();
    }
}

// ===== canonical executor =====

/// Outbound order frame written onto the NIC TX ring.
#[derive(Clone, Copy, AsBytes)]
#[repr(C, packed)]
pub struct OrderFrame {
    pub order_id: u64,
    pub asset_id: u32,
    /// 0 = buy, 1 = sell
    pub side: u8,
    pub _pad: [u8; 3],
    pub price: f64,
    pub quantity: u64,
    pub submit_time_ns: i64,
}

impl OrderFrame {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.order_id,
            asset_id: order.asset_id,
            side: order.side as u8,
            _pad: [0; 3],
            price: order.price,
            quantity: order.quantity,
            submit_time_ns: order.submit_time_ns,
        }
    }
}

/// Executor that risk-checks and encodes orders onto the NIC TX ring.
pub struct NicExecutor {
    nic: NicDriver,
    risk: RiskGate,
    next_order_id: u64,
    position: i64,
    submitted: u64,
    tx_dropped: u64,
}

impl NicExecutor {
    pub fn new(nic: NicDriver, risk: RiskGate) -> Self {
        Self {
            nic,
            risk,
            next_order_id: 1,
            position: 0,
            submitted: 0,
            tx_dropped: 0,
        }
    }

    pub fn risk_gate(&self) -> &RiskGate {
        &self.risk
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn nic_mut(&mut self) -> &mut NicDriver {
        &mut self.nic
    }

    fn submit(&mut self, side: Side, price: f64, quantity: u64, tick: &Tick) -> Result<()> {
        let mut order = Order::new(self.next_order_id, tick.asset_id, side, price, quantity);
        order.submit_time_ns = tick.recv_time_ns;

        // Rejection is an expected outcome, not an error
        if self.risk.check(&order, self.position).is_err() {
            return Ok(());
        }
        self.next_order_id += 1;

        let frame = OrderFrame::from_order(&order);
        if !self.nic.submit_tx(frame.as_bytes()) {
            self.tx_dropped += 1;
            tracing::warn!("tx ring full, dropped order {}", order.order_id);
            return Ok(());
        }
        self.submitted += 1;
        Ok(())
    }
}

impl Executor for NicExecutor {
    fn execute(&mut self, quotes: &QuoteSet, tick: &Tick) -> Result<()> {
        if quotes.bid_price > 0.0 && quotes.bid_size > 0 {
            self.submit(Side::Buy, quotes.bid_price, quotes.bid_size, tick)?;
        }
        if quotes.ask_price > 0.0 && quotes.ask_size > 0 {
            self.submit(Side::Sell, quotes.ask_price, quotes.ask_size, tick)?;
        }
        Ok(())
    }

    fn cancel_all(&mut self) -> Result<()> {
        // Resting-order management lives venue-side; nothing held here
        Ok(())
    }

    fn position(&self) -> i64 {
        self.position
    }

    fn name(&self) -> &'static str {
        "NicExecutor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::QuoteParams;
    use crate::risk::RiskLimits;
    use crate::signal::hawkes::HawkesParams;

    struct MockStrategy {
        calls: u64,
    }

    impl Strategy for MockStrategy {
        fn on_tick(&mut self, tick: &Tick, _position: i64) -> Option<QuoteSet> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                Some(QuoteSet {
                    bid_price: tick.bid_price,
                    ask_price: tick.ask_price,
                    bid_size: 100,
                    ask_size: 100,
                    spread: tick.ask_price - tick.bid_price,
                    mid_price: tick.mid_price,
                })
            } else {
                None
            }
        }

        fn name(&self) -> &'static str {
            "MockStrategy"
        }
    }

    struct MockExecutor {
        executions: u64,
    }

    impl Executor for MockExecutor {
        fn execute(&mut self, _quotes: &QuoteSet, _tick: &Tick) -> Result<()> {
            self.executions += 1;
            Ok(())
        }

        fn cancel_all(&mut self) -> Result<()> {
            Ok(())
        }

        fn position(&self) -> i64 {
            0
        }

        fn name(&self) -> &'static str {
            "MockExecutor"
        }
    }

    #[test]
    fn test_engine_processes_ticks() {
        let mut engine = Engine::new(MockStrategy { calls: 0 }, MockExecutor { executions: 0 });

        // Distinct prices so change detection never short-circuits
        for i in 0..4 {
            let tick = Tick::from_bbo(i * 100, 1, 99.99 + i as f64 * 0.01, 100, 100.01 + i as f64 * 0.01, 100);
            engine.process_tick(&tick).unwrap();
        }

        let stats = engine.stats();
        assert_eq!(stats.ticks_processed, 4);
        // Mock signals on even calls only
        assert_eq!(stats.signals_generated, 2);
        assert_eq!(engine.executor().executions, 2);
    }

    #[test]
    fn test_unchanged_market_skips_strategy() {
        let mut engine = Engine::new(MockStrategy { calls: 0 }, MockExecutor { executions: 0 });
        let tick = Tick::from_bbo(100, 1, 99.99, 100, 100.01, 100);

        engine.process_tick(&tick).unwrap();
        engine.process_tick(&tick).unwrap();

        assert_eq!(engine.stats().ticks_processed, 2);
        assert_eq!(engine.strategy().calls, 1);
    }

    #[test]
    fn test_invalid_ticks_counted_and_dropped() {
        let mut engine = Engine::new(MockStrategy { calls: 0 }, MockExecutor { executions: 0 });

        let bad = Tick::from_bbo(100, 1, f64::NAN, 100, 100.01, 100);
        engine.process_tick(&bad).unwrap();

        let crossed = Tick::from_bbo(200, 1, 100.05, 100, 100.01, 100);
        engine.process_tick(&crossed).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.invalid_ticks, 2);
        assert_eq!(engine.strategy().calls, 0);
    }

    #[test]
    fn test_run_drains_feed() {
        let mut engine = Engine::new(MockStrategy { calls: 0 }, MockExecutor { executions: 0 });

        let mut remaining = 10;
        let stats = engine
            .run(move || {
                if remaining == 0 {
                    return Ok(None);
                }
                remaining -= 1;
                let p = 100.0 + remaining as f64 * 0.01;
                Ok(Some(Tick::from_bbo(remaining * 100, 1, p - 0.01, 100, p + 0.01, 100)))
            })
            .unwrap();

        assert_eq!(stats.ticks_processed, 10);
    }

    #[test]
    fn test_market_making_strategy_needs_persistence() {
        let hawkes = HawkesEngine::new(HawkesParams::default());
        let quote_engine = QuoteEngine::new(QuoteParams::default()).unwrap();
        let mut strategy = MarketMakingStrategy::new(hawkes, quote_engine, 600.0);

        // A handful of balanced ticks: imbalance never persists
        for i in 0..20 {
            let mut tick = Tick::from_bbo(i * 100, 1, 99.99, 100, 100.01, 100);
            tick.trade_volume = 10;
            tick.trade_side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
            assert!(strategy.on_tick(&tick, 0).is_none(), "tick {}", i);
        }
    }

    #[test]
    fn test_nic_executor_writes_order_frames() {
        let nic = NicDriver::mock();
        let risk = RiskGate::new(RiskLimits::default()).unwrap();
        let mut executor = NicExecutor::new(nic, risk);

        let tick = Tick::from_bbo(1_000, 1, 99.99, 100, 100.01, 100);
        let quotes = QuoteSet {
            bid_price: 99.98,
            ask_price: 100.02,
            bid_size: 100,
            ask_size: 100,
            spread: 0.04,
            mid_price: 100.0,
        };

        executor.execute(&quotes, &tick).unwrap();
        assert_eq!(executor.submitted(), 2);

        // Both frames visible on the TX ring
        let bid_frame = executor.nic_mut().drain_tx().unwrap();
        assert_eq!(bid_frame.len(), std::mem::size_of::<OrderFrame>());
        assert!(executor.nic_mut().drain_tx().is_some());
        assert!(executor.nic_mut().drain_tx().is_none());
    }

    #[test]
    fn test_nic_executor_respects_risk() {
        let nic = NicDriver::mock();
        let risk = RiskGate::new(RiskLimits {
            max_order_size: 50,
            ..RiskLimits::default()
        })
        .unwrap();
        let mut executor = NicExecutor::new(nic, risk);

        let tick = Tick::from_bbo(1_000, 1, 99.99, 100, 100.01, 100);
        let quotes = QuoteSet {
            bid_price: 99.98,
            ask_price: 100.02,
            bid_size: 100,
            ask_size: 100,
            spread: 0.04,
            mid_price: 100.0,
        };

        executor.execute(&quotes, &tick).unwrap();
        assert_eq!(executor.submitted(), 0);
        assert_eq!(executor.risk_gate().stats().order_too_large, 2);
    }

    #[test]
    fn test_order_frame_size() {
        assert_eq!(std::mem::size_of::<OrderFrame>(), 40);
    }
}
