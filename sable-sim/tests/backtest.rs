//! End-to-end backtest scenarios: determinism, the latency floor as
//! observed in the replay log, and record-format conformance.

use std::collections::HashMap;
use std::io::Write;

use sha2::{Digest, Sha256};

use sable_sim::{Backtester, SimConfig};

/// Synthetic buy-heavy session: a persistent imbalance develops within a
/// few ticks and the engine quotes both sides from then on.
fn write_session_csv(rows: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "ts_us,event_type,side,price,size,order_id,level").unwrap();
    for i in 0..rows {
        let price = 100.0 + ((i % 200) as f64) * 0.0005;
        writeln!(
            file,
            "{},trade,B,{:.4},100,{},0",
            1_000 + i as u64,
            price,
            i + 1
        )
        .unwrap();
    }
    file.flush().unwrap();
    file
}

fn run_once(csv_path: &str, log_path: &str, config: SimConfig) -> sable_sim::PerformanceMetrics {
    let mut bt = Backtester::new(config).unwrap();
    bt.load_events(csv_path).unwrap();
    bt.with_replay_log(log_path).unwrap();
    bt.run().unwrap()
}

fn sha256_of(path: &std::path::Path) -> String {
    let bytes = std::fs::read(path).unwrap();
    format!("{:x}", Sha256::digest(&bytes))
}

#[test]
fn determinism_byte_identical_outputs() {
    let csv = write_session_csv(3_000);
    let dir = tempfile::tempdir().unwrap();

    let log_a = dir.path().join("a_replay.log");
    let log_b = dir.path().join("b_replay.log");
    let metrics_a = dir.path().join("a_total.csv");
    let metrics_b = dir.path().join("b_total.csv");

    let ma = run_once(
        csv.path().to_str().unwrap(),
        log_a.to_str().unwrap(),
        SimConfig::default(),
    );
    ma.export_csv(&metrics_a).unwrap();

    let mb = run_once(
        csv.path().to_str().unwrap(),
        log_b.to_str().unwrap(),
        SimConfig::default(),
    );
    mb.export_csv(&metrics_b).unwrap();

    // Same input bytes, seed and configuration: byte-identical outputs
    assert_eq!(sha256_of(&log_a), sha256_of(&log_b));
    assert_eq!(
        std::fs::read(&metrics_a).unwrap(),
        std::fs::read(&metrics_b).unwrap()
    );

    // And the run actually traded
    let log = std::fs::read_to_string(&log_a).unwrap();
    assert!(log.lines().any(|l| l.starts_with("ORDER_SUBMIT ")));
}

#[test]
fn latency_floor_visible_in_replay_log() {
    let csv = write_session_csv(2_000);
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("replay.log");

    // Request a latency well below the floor
    let mut config = SimConfig::default();
    config.simulated_latency_ns = 100;

    run_once(
        csv.path().to_str().unwrap(),
        log_path.to_str().unwrap(),
        config,
    );

    let log = std::fs::read_to_string(&log_path).unwrap();

    let mut submit_ts: HashMap<u64, i64> = HashMap::new();
    let mut resolutions = 0u64;

    for line in log.lines() {
        let fields: HashMap<&str, &str> = line
            .split_whitespace()
            .skip(1)
            .filter_map(|kv| kv.split_once('='))
            .collect();

        if line.starts_with("ORDER_SUBMIT ") {
            let id: u64 = fields["id"].parse().unwrap();
            let ts: i64 = fields["ts"].parse().unwrap();
            submit_ts.insert(id, ts);
        } else if line.starts_with("ORDER_FILL ") || line.starts_with("ORDER_CANCEL ") {
            let id: u64 = fields["id"].parse().unwrap();
            let ts: i64 = fields["ts"].parse().unwrap();
            let submitted = submit_ts[&id];
            assert!(
                ts - submitted >= 550,
                "order {} resolved after {} ns despite the 100 ns configuration",
                id,
                ts - submitted
            );
            resolutions += 1;
        }
    }

    assert!(resolutions > 0, "the session must resolve orders");
}

#[test]
fn config_record_carries_provenance() {
    let csv = write_session_csv(500);
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("replay.log");

    run_once(
        csv.path().to_str().unwrap(),
        log_path.to_str().unwrap(),
        SimConfig::default(),
    );

    let log = std::fs::read_to_string(&log_path).unwrap();
    let first = log.lines().next().unwrap();

    assert!(first.starts_with("CONFIG json={"));
    assert!(first.contains("seed=42"));

    // The logged hash is the hash of the input file bytes
    let expected = sha256_of(csv.path());
    assert!(first.ends_with(&format!("input_sha256={}", expected)));
}

#[test]
fn signal_records_carry_persistence() {
    let csv = write_session_csv(1_000);
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("replay.log");

    run_once(
        csv.path().to_str().unwrap(),
        log_path.to_str().unwrap(),
        SimConfig::default(),
    );

    let log = std::fs::read_to_string(&log_path).unwrap();
    let signals: Vec<&str> = log
        .lines()
        .filter(|l| l.starts_with("SIGNAL "))
        .collect();
    assert!(!signals.is_empty());

    for line in &signals {
        let fields: HashMap<&str, &str> = line
            .split_whitespace()
            .skip(1)
            .filter_map(|kv| kv.split_once('='))
            .collect();

        // Only persistent decisions produce SIGNAL records
        assert_eq!(fields["should_trade"], "true");
        let conf: u32 = fields["conf_ticks"].parse().unwrap();
        assert!(conf >= 12, "conf_ticks {} below the persistence gate", conf);
        assert_eq!(fields["side"], "BUY");
    }
}

#[test]
fn different_seeds_still_deterministic_per_seed() {
    let csv = write_session_csv(1_500);
    let dir = tempfile::tempdir().unwrap();

    let mut hashes = Vec::new();
    for seed in [7u32, 7, 99, 99] {
        let log_path = dir.path().join(format!("replay_{}_{}.log", seed, hashes.len()));
        let mut config = SimConfig::default();
        config.random_seed = seed;
        run_once(
            csv.path().to_str().unwrap(),
            log_path.to_str().unwrap(),
            config,
        );
        hashes.push(sha256_of(&log_path));
    }

    // Same seed agrees with itself
    assert_eq!(hashes[0], hashes[1]);
    assert_eq!(hashes[2], hashes[3]);
}

#[test]
fn pnl_records_sampled_every_thousand_ticks() {
    let csv = write_session_csv(3_500);
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("replay.log");

    run_once(
        csv.path().to_str().unwrap(),
        log_path.to_str().unwrap(),
        SimConfig::default(),
    );

    let log = std::fs::read_to_string(&log_path).unwrap();
    let pnl_count = log.lines().filter(|l| l.starts_with("PNL ")).count();
    let tick_count = log.lines().filter(|l| l.starts_with("MARKET_TICK ")).count();

    // 3500 events: PNL at 1000/2000/3000, MARKET_TICK every 100 events
    assert_eq!(pnl_count, 3);
    assert_eq!(tick_count, 34);
}
