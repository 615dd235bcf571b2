//! Append-only replay log
//!
//! Line-oriented records, one `TAG key=value ...` line each, written in
//! event order. Field order and float formatting are fixed so two runs
//! with the same input, seed and configuration produce byte-identical
//! logs. Record set:
//!
//! ```text
//! CONFIG json=<...> seed=<u32> input_sha256=<hex>
//! MARKET_TICK ts=<ns> bid=<f> ask=<f> bidq=<u64> askq=<u64>
//! SIGNAL ts=<ns> should_trade=<bool> side=<BUY|SELL> strength=<f> conf_ticks=<u32> obi=<f>
//! ORDER_SUBMIT ts=<ns> id=<u64> side=<BUY|SELL> price=<f> qty=<u64>
//! ORDER_FILL ts=<ns> id=<u64> price=<f> qty=<u64> latency_ns=<u64>
//! ORDER_CANCEL ts=<ns> id=<u64> reason=<str>
//! PNL ts=<ns> realized=<f> unrealized=<f> position=<i64>
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

/// Replay record writer. Owned by one simulator; flushed on drop.
pub struct ReplayLogger {
    writer: BufWriter<File>,
    records: u64,
}

impl ReplayLogger {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("create replay log {}", path.as_ref().display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            records: 0,
        })
    }

    /// Run provenance, once at start.
    pub fn log_config(&mut self, config_json: &str, seed: u32, input_sha256: &str) {
        self.write_line(format_args!(
            "CONFIG json={} seed={} input_sha256={}",
            config_json, seed, input_sha256
        ));
    }

    /// Sampled market state (1 in 100 applied ticks).
    pub fn log_market_tick(&mut self, ts_ns: i64, bid: f64, ask: f64, bid_qty: u64, ask_qty: u64) {
        self.write_line(format_args!(
            "MARKET_TICK ts={} bid={:.4} ask={:.4} bidq={} askq={}",
            ts_ns, bid, ask, bid_qty, ask_qty
        ));
    }

    /// Every produced trading decision.
    pub fn log_signal(
        &mut self,
        ts_ns: i64,
        should_trade: bool,
        side: &str,
        strength: f64,
        confirmation_ticks: u32,
        obi: f64,
    ) {
        self.write_line(format_args!(
            "SIGNAL ts={} should_trade={} side={} strength={:.6} conf_ticks={} obi={:.6}",
            ts_ns, should_trade, side, strength, confirmation_ticks, obi
        ));
    }

    pub fn log_order_submit(&mut self, ts_ns: i64, id: u64, side: &str, price: f64, qty: u64) {
        self.write_line(format_args!(
            "ORDER_SUBMIT ts={} id={} side={} price={:.4} qty={}",
            ts_ns, id, side, price, qty
        ));
    }

    pub fn log_order_fill(&mut self, ts_ns: i64, id: u64, price: f64, qty: u64, latency_ns: u64) {
        self.write_line(format_args!(
            "ORDER_FILL ts={} id={} price={:.4} qty={} latency_ns={}",
            ts_ns, id, price, qty, latency_ns
        ));
    }

    pub fn log_order_cancel(&mut self, ts_ns: i64, id: u64, reason: &str) {
        self.write_line(format_args!(
            "ORDER_CANCEL ts={} id={} reason={}",
            ts_ns, id, reason
        ));
    }

    /// Periodic PnL mark (every 1000 ticks).
    pub fn log_pnl(&mut self, ts_ns: i64, realized: f64, unrealized: f64, position: i64) {
        self.write_line(format_args!(
            "PNL ts={} realized={:.6} unrealized={:.6} position={}",
            ts_ns, realized, unrealized, position
        ));
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("flush replay log")
    }

    pub fn record_count(&self) -> u64 {
        self.records
    }

    fn write_line(&mut self, args: std::fmt::Arguments<'_>) {
        // A failed log write must not abort the replay
        if writeln!(self.writer, "{}", args).is_err() {
            tracing::error!("replay log write failed");
        }
        self.records += 1;
    }
}

impl Drop for ReplayLogger {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_formats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.log");

        {
            let mut log = ReplayLogger::create(&path).unwrap();
            log.log_config("{\"seed\":42}", 42, "abc123");
            log.log_market_tick(1_000, 99.99, 100.01, 500, 400);
            log.log_signal(2_000, true, "BUY", 0.125, 12, 0.11);
            log.log_order_submit(2_000, 7, "BUY", 99.98, 100);
            log.log_order_fill(3_000, 7, 99.98, 100, 550);
            log.log_order_cancel(3_000, 8, "not_filled");
            log.log_pnl(4_000, 1.5, -0.25, 100);
            log.flush().unwrap();
            assert_eq!(log.record_count(), 7);
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 7);

        assert_eq!(lines[0], "CONFIG json={\"seed\":42} seed=42 input_sha256=abc123");
        assert_eq!(lines[1], "MARKET_TICK ts=1000 bid=99.9900 ask=100.0100 bidq=500 askq=400");
        assert_eq!(
            lines[2],
            "SIGNAL ts=2000 should_trade=true side=BUY strength=0.125000 conf_ticks=12 obi=0.110000"
        );
        assert_eq!(lines[3], "ORDER_SUBMIT ts=2000 id=7 side=BUY price=99.9800 qty=100");
        assert_eq!(lines[4], "ORDER_FILL ts=3000 id=7 price=99.9800 qty=100 latency_ns=550");
        assert_eq!(lines[5], "ORDER_CANCEL ts=3000 id=8 reason=not_filled");
        assert_eq!(lines[6], "PNL ts=4000 realized=1.500000 unrealized=-0.250000 position=100");
    }

    #[test]
    fn test_identical_sequences_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.log");
        let b_path = dir.path().join("b.log");

        for path in [&a_path, &b_path] {
            let mut log = ReplayLogger::create(path).unwrap();
            log.log_config("{}", 1, "deadbeef");
            log.log_order_submit(100, 1, "SELL", 100.02, 50);
            log.log_order_cancel(700, 1, "not_filled");
            log.flush().unwrap();
        }

        let a = std::fs::read(&a_path).unwrap();
        let b = std::fs::read(&b_path).unwrap();
        assert_eq!(a, b);
    }
}
