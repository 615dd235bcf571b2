//! Tick-to-trade latency benchmark
//!
//! Drives synthetic ticks through the full instrumented pipeline - NIC
//! poll, wire decode, book update, feature extraction, signal, strategy,
//! risk, order encode, TX - and reports per-stage and end-to-end latency
//! distributions as three CSVs:
//!
//! - `<prefix>_total.csv`       aggregate statistics
//! - `<prefix>_components.csv`  one row per stage
//! - `<prefix>_raw_samples.csv` one row per measurement

use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zerocopy::AsBytes;

use sable_bins::common::{init_logging, setup_performance};
use sable_core::book::{BookUpdate, OrderBook, UpdateKind};
use sable_core::engine::OrderFrame;
use sable_core::ingress::decode::{self, msg_type, update_kind, BookUpdateMsg, Message, MsgHeader};
use sable_core::ingress::nic::NicDriver;
use sable_core::perf::latency::{
    export_components_csv, export_raw_samples_csv, LatencyStats, StageTimings,
};
use sable_core::quote::{QuoteEngine, QuoteParams};
use sable_core::risk::{RiskGate, RiskLimits};
use sable_core::signal::hawkes::{HawkesEngine, HawkesParams};
use sable_core::signal::temporal::TemporalFilter;
use sable_core::types::{ArrivalEvent, Order, Side};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of measured samples
    #[arg(short, long, default_value = "100000")]
    samples: usize,

    /// Warmup iterations before measurement
    #[arg(long, default_value = "10000")]
    warmup: usize,

    /// Output file prefix
    #[arg(short, long, default_value = "benchmark")]
    output: String,

    /// CPU core to pin to
    #[arg(short = 'c', long)]
    cpu_core: Option<usize>,

    /// Enable SCHED_FIFO real-time priority
    #[arg(long)]
    realtime: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// The measured system: every pipeline component, wired exactly as the
/// live engine wires them.
struct BenchPipeline {
    nic: NicDriver,
    book: OrderBook,
    hawkes: HawkesEngine,
    filter: TemporalFilter,
    quote_engine: QuoteEngine,
    risk: RiskGate,
    sequence: u32,
    clock_ns: i64,
}

impl BenchPipeline {
    fn new() -> Result<Self> {
        let mut book = OrderBook::new(1);
        book.initialize_from_snapshot(&Default::default());

        Ok(Self {
            nic: NicDriver::mock(),
            book,
            hawkes: HawkesEngine::new(HawkesParams::default()),
            filter: TemporalFilter::new(),
            quote_engine: QuoteEngine::new(QuoteParams::default())?,
            risk: RiskGate::new(RiskLimits {
                max_daily_notional: f64::MAX / 4.0,
                ..RiskLimits::default()
            })?,
            sequence: 0,
            clock_ns: 0,
        })
    }

    /// One instrumented tick-to-trade pass.
    fn process_instrumented(&mut self, frame: &BookUpdateMsg) -> StageTimings {
        let mut timings = StageTimings::default();
        self.clock_ns += 100;

        // Phase 1: RX through the descriptor ring
        let start = Instant::now();
        self.nic.inject_rx(frame.as_bytes());
        let rx_bytes: Vec<u8> = self.nic.poll_rx().map(|b| b.to_vec()).unwrap_or_default();
        timings.rx_dma_ns = start.elapsed().as_nanos() as f64;

        // Phase 2: zero-copy decode
        let start = Instant::now();
        let update = match decode::decode(&rx_bytes) {
            Ok(Message::BookUpdate(m)) => BookUpdate {
                kind: UpdateKind::from_wire(m.kind()).unwrap_or(UpdateKind::Add),
                order_id: m.order_id(),
                price: m.price(),
                quantity: m.quantity(),
                is_bid: m.is_bid(),
                sequence: self.sequence as u64,
                timestamp_ns: self.clock_ns,
            },
            _ => return timings,
        };
        timings.parse_ns = start.elapsed().as_nanos() as f64;

        // Phase 3: book update
        let start = Instant::now();
        self.book.process_update(&update);
        timings.book_update_ns = start.elapsed().as_nanos() as f64;

        // Phase 4: feature read
        let start = Instant::now();
        let ofi = *self.book.current_ofi();
        timings.feature_extract_ns = start.elapsed().as_nanos() as f64;

        // Phase 5: intensity + persistence
        let start = Instant::now();
        let side = if update.is_bid { Side::Buy } else { Side::Sell };
        self.hawkes.update(ArrivalEvent::new(self.clock_ns, side));
        let obi = self.hawkes.intensity_imbalance();
        let _decision = self.filter.observe(self.clock_ns, obi);
        timings.signal_ns = start.elapsed().as_nanos() as f64;

        // Phase 6: quote computation
        let mid = if ofi.mid_price > 0.0 { ofi.mid_price } else { 100.0 };
        let start = Instant::now();
        let latency_cost = self.quote_engine.latency_cost(0.20, mid);
        let quotes = self.quote_engine.calculate(mid, 0, 600.0, latency_cost);
        timings.strategy_ns = start.elapsed().as_nanos() as f64;

        // Phase 7: pre-trade risk
        let mut order = Order::new(1, 1, Side::Buy, quotes.bid_price.max(0.01), 100);
        order.submit_time_ns = self.clock_ns;
        let start = Instant::now();
        let risk_ok = self.risk.check(&order, 0).is_ok();
        timings.risk_ns = start.elapsed().as_nanos() as f64;

        // Phase 8: order encode
        let start = Instant::now();
        let tx_frame = OrderFrame::from_order(&order);
        timings.order_encode_ns = start.elapsed().as_nanos() as f64;

        // Phase 9: TX kick
        let start = Instant::now();
        if risk_ok {
            self.nic.submit_tx(tx_frame.as_bytes());
            self.nic.drain_tx();
        }
        timings.tx_dma_ns = start.elapsed().as_nanos() as f64;

        timings
    }

    fn next_frame(&mut self, rng: &mut StdRng) -> BookUpdateMsg {
        self.sequence += 1;
        BookUpdateMsg {
            header: MsgHeader {
                sequence: self.sequence,
                msg_type: msg_type::BOOK_UPDATE,
                msg_len: std::mem::size_of::<BookUpdateMsg>() as u16,
                timestamp_ns: self.clock_ns as u64,
            },
            order_id: self.sequence as u64,
            symbol_id: 1,
            side: if rng.gen_bool(0.5) { 0 } else { 1 },
            kind: update_kind::ADD,
            _pad: 0,
            price: 100.0 + rng.gen_range(-100..100) as f64 * 0.01,
            quantity: rng.gen_range(1..200) as f64,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;
    setup_performance(args.cpu_core, args.realtime)?;

    tracing::info!(
        "tick-to-trade benchmark: {} samples ({} warmup)",
        args.samples,
        args.warmup
    );

    let mut pipeline = BenchPipeline::new()?;
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..args.warmup {
        let frame = pipeline.next_frame(&mut rng);
        pipeline.process_instrumented(&frame);
    }

    let mut samples = Vec::with_capacity(args.samples);
    for i in 0..args.samples {
        let frame = pipeline.next_frame(&mut rng);
        samples.push(pipeline.process_instrumented(&frame));

        if args.samples >= 10 && i % (args.samples / 10) == 0 {
            tracing::debug!("progress {}%", i * 100 / args.samples);
        }
    }

    // Aggregate report
    let totals: Vec<f64> = samples.iter().map(|s| s.total_ns()).collect();
    let stats = LatencyStats::from_samples_ns(&totals);
    tracing::info!("=== tick-to-trade latency ===");
    tracing::info!("mean   {:>10.1} ns", stats.mean_ns);
    tracing::info!("median {:>10.1} ns", stats.median_ns);
    tracing::info!("p90    {:>10.1} ns", stats.p90_ns);
    tracing::info!("p99    {:>10.1} ns", stats.p99_ns);
    tracing::info!("p99.9  {:>10.1} ns", stats.p999_ns);
    tracing::info!("max    {:>10.1} ns", stats.max_ns);
    tracing::info!("jitter {:>10.1} ns", stats.jitter_ns);

    let total_path = format!("{}_total.csv", args.output);
    let components_path = format!("{}_components.csv", args.output);
    let raw_path = format!("{}_raw_samples.csv", args.output);

    stats.export_csv(&total_path)?;
    export_components_csv(&components_path, &samples)?;
    export_raw_samples_csv(&raw_path, &samples)?;

    tracing::info!("results: {} {} {}", total_path, components_path, raw_path);
    Ok(())
}
