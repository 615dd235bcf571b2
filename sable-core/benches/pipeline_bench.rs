//! Tick-to-trade pipeline benchmarks
//!
//! Measures the full strategy-core path: tick in, book update, intensity
//! update, filter, quotes, risk, order frame out.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sable_core::book::{BookUpdate, OrderBook, UpdateKind};
use sable_core::engine::{Engine, MarketMakingStrategy, NicExecutor};
use sable_core::ingress::nic::NicDriver;
use sable_core::quote::{QuoteEngine, QuoteParams};
use sable_core::risk::{RiskGate, RiskLimits};
use sable_core::signal::hawkes::{HawkesEngine, HawkesParams};
use sable_core::types::{Side, Tick};

fn synthetic_ticks(count: usize) -> Vec<Tick> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut price = 100.0;

    (0..count)
        .map(|i| {
            price += (rng.gen::<f64>() - 0.5) * 0.02;
            let mut tick = Tick::from_bbo(
                i as i64 * 100,
                1,
                price - 0.01,
                100 + rng.gen_range(0..900),
                price + 0.01,
                100 + rng.gen_range(0..900),
            );
            tick.trade_volume = rng.gen_range(0..100);
            tick.trade_side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            tick
        })
        .collect()
}

fn bench_full_pipeline(c: &mut Criterion) {
    let ticks = synthetic_ticks(4096);

    let hawkes = HawkesEngine::new(HawkesParams::default());
    let quotes = QuoteEngine::new(QuoteParams::default()).unwrap();
    let strategy = MarketMakingStrategy::new(hawkes, quotes, 600.0);
    let executor = NicExecutor::new(NicDriver::mock(), RiskGate::new(RiskLimits::default()).unwrap());
    let mut engine = Engine::new(strategy, executor);

    let mut idx = 0usize;
    c.bench_function("tick_to_trade", |b| {
        b.iter(|| {
            engine.process_tick(black_box(&ticks[idx & 4095])).unwrap();
            idx += 1;
        })
    });
}

fn bench_book_update(c: &mut Criterion) {
    let mut book = OrderBook::new(1);
    book.initialize_from_snapshot(&Default::default());

    let mut rng = StdRng::seed_from_u64(11);
    let mut seq = 0u64;
    let mut order_id = 0u64;

    c.bench_function("book_add_update", |b| {
        b.iter(|| {
            seq += 1;
            order_id += 1;
            let update = BookUpdate {
                kind: UpdateKind::Add,
                order_id,
                price: 100.0 + rng.gen_range(-50..50) as f64 * 0.01,
                quantity: rng.gen_range(1..100) as f64,
                is_bid: rng.gen_bool(0.5),
                sequence: seq,
                timestamp_ns: seq as i64 * 100,
            };
            black_box(book.process_update(&update));
        })
    });
}

criterion_group!(benches, bench_full_pipeline, bench_book_update);
criterion_main!(benches);
