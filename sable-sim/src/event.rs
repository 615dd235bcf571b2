//! Historical event loading
//!
//! Accepts the compact trade/order CSV format:
//!
//! ```text
//! ts_us,event_type,side,price,size,order_id,level
//! ```
//!
//! `ts_us` is microseconds since an epoch (scaled to nanoseconds
//! internally), `event_type` is one of `snapshot,add,modify,cancel,trade`,
//! `side` is `B`/`S` or empty, and missing fields take defaults. Explicit
//! top-of-book is not present in this format, so a synthetic 2 bps spread
//! is constructed around `price`. Records are sorted by timestamp before
//! replay; unparseable rows are dropped with a counter.
//!
//! The loader also hashes the raw input bytes (SHA-256) so the replay log
//! can prove which file a run consumed.

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use sable_core::types::{Side, Tick};

/// Synthetic spread applied around the record price, in fraction of price
const SYNTHETIC_SPREAD_FRACTION: f64 = 0.0002;

/// One historical market-data event.
#[derive(Debug, Clone, Copy)]
pub struct HistoricalEvent {
    pub timestamp_ns: i64,
    pub asset_id: u32,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: u64,
    pub ask_size: u64,
    pub trade_volume: u64,
    pub trade_side: Side,
}

impl HistoricalEvent {
    /// Convert to the pipeline tick shape.
    pub fn to_tick(&self) -> Tick {
        let mut tick = Tick::from_bbo(
            self.timestamp_ns,
            self.asset_id,
            self.bid_price,
            self.bid_size,
            self.ask_price,
            self.ask_size,
        );
        tick.trade_volume = self.trade_volume;
        tick.trade_side = self.trade_side;
        tick
    }
}

/// Load result: sorted events plus input provenance.
#[derive(Debug, Clone)]
pub struct LoadedEvents {
    pub events: Vec<HistoricalEvent>,
    /// SHA-256 of the raw file bytes, lowercase hex
    pub input_sha256: String,
    pub rows_dropped: u64,
}

/// Load, parse and sort a historical event CSV.
pub fn load_events_csv<P: AsRef<Path>>(path: P) -> Result<LoadedEvents> {
    let bytes = std::fs::read(path.as_ref())
        .with_context(|| format!("read {}", path.as_ref().display()))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let input_sha256 = hex_string(&hasher.finalize());

    let text = String::from_utf8_lossy(&bytes);
    let mut events = Vec::new();
    let mut rows_dropped = 0u64;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("ts_us") || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some(event) => events.push(event),
            None => rows_dropped += 1,
        }
    }

    // Chronological replay order
    events.sort_by_key(|e| e.timestamp_ns);

    if let (Some(first), Some(last)) = (events.first(), events.last()) {
        tracing::info!(
            "loaded {} events ({} dropped), {:.3}s span, sha256={}",
            events.len(),
            rows_dropped,
            (last.timestamp_ns - first.timestamp_ns) as f64 / 1e9,
            &input_sha256[..16],
        );
    } else {
        tracing::warn!("no events parsed from {}", path.as_ref().display());
    }

    Ok(LoadedEvents {
        events,
        input_sha256,
        rows_dropped,
    })
}

/// Parse one compact-format record; `None` drops the row.
fn parse_line(line: &str) -> Option<HistoricalEvent> {
    let mut fields = line.split(',');

    let ts_us: i64 = fields.next()?.trim().parse().ok()?;
    let event_type = fields.next().unwrap_or("").trim();
    let side_field = fields.next().unwrap_or("").trim();
    let price_field = fields.next().unwrap_or("").trim();
    let size_field = fields.next().unwrap_or("").trim();
    // order_id and level are carried by the format but unused here

    let price: f64 = if price_field.is_empty() {
        100.0
    } else {
        price_field.parse().ok()?
    };
    if !price.is_finite() || price <= 0.0 {
        return None;
    }

    let size: u64 = if size_field.is_empty() {
        100
    } else {
        size_field.parse().ok()?
    };

    let side = match side_field {
        "S" | "s" => Side::Sell,
        _ => Side::Buy,
    };

    // No explicit book in this format: surround the price with a 2 bps
    // synthetic spread
    let half_spread = price * SYNTHETIC_SPREAD_FRACTION / 2.0;

    Some(HistoricalEvent {
        timestamp_ns: ts_us * 1_000,
        asset_id: 1,
        bid_price: price - half_spread,
        ask_price: price + half_spread,
        bid_size: size,
        ask_size: size,
        trade_volume: if event_type == "trade" { size } else { 0 },
        trade_side: side,
    })
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_basic_load() {
        let file = write_csv(
            "ts_us,event_type,side,price,size,order_id,level\n\
             1000,add,B,100.0,50,1,0\n\
             2000,trade,S,100.5,25,2,0\n",
        );

        let loaded = load_events_csv(file.path()).unwrap();
        assert_eq!(loaded.events.len(), 2);
        assert_eq!(loaded.rows_dropped, 0);

        let first = &loaded.events[0];
        assert_eq!(first.timestamp_ns, 1_000_000);
        assert_eq!(first.trade_volume, 0);
        assert_eq!(first.bid_size, 50);

        // 2 bps synthetic spread around the price
        let spread = first.ask_price - first.bid_price;
        assert!((spread - 100.0 * 0.0002).abs() < 1e-9);
        assert!((((first.bid_price + first.ask_price) / 2.0) - 100.0).abs() < 1e-9);

        let second = &loaded.events[1];
        assert_eq!(second.trade_volume, 25);
        assert_eq!(second.trade_side, Side::Sell);
    }

    #[test]
    fn test_sorted_by_timestamp() {
        let file = write_csv(
            "ts_us,event_type,side,price,size,order_id,level\n\
             3000,add,B,101.0,10,1,0\n\
             1000,add,B,100.0,10,2,0\n\
             2000,add,S,100.5,10,3,0\n",
        );

        let loaded = load_events_csv(file.path()).unwrap();
        let stamps: Vec<i64> = loaded.events.iter().map(|e| e.timestamp_ns).collect();
        assert_eq!(stamps, vec![1_000_000, 2_000_000, 3_000_000]);
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let file = write_csv("ts_us,event_type,side,price,size,order_id,level\n5000,add,,,,,\n");

        let loaded = load_events_csv(file.path()).unwrap();
        let event = &loaded.events[0];
        assert_eq!(event.trade_side, Side::Buy);
        assert_eq!(event.bid_size, 100);
        assert!((((event.bid_price + event.ask_price) / 2.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_bad_rows_dropped() {
        let file = write_csv(
            "ts_us,event_type,side,price,size,order_id,level\n\
             not_a_number,add,B,100.0,50,1,0\n\
             1000,add,B,-5.0,50,1,0\n\
             2000,add,B,100.0,50,1,0\n",
        );

        let loaded = load_events_csv(file.path()).unwrap();
        assert_eq!(loaded.events.len(), 1);
        assert_eq!(loaded.rows_dropped, 2);
    }

    #[test]
    fn test_sha256_tracks_bytes() {
        let a = write_csv("ts_us,event_type,side,price,size,order_id,level\n1000,add,B,100.0,50,1,0\n");
        let b = write_csv("ts_us,event_type,side,price,size,order_id,level\n1000,add,B,100.0,50,1,0\n");
        let c = write_csv("ts_us,event_type,side,price,size,order_id,level\n1000,add,B,100.1,50,1,0\n");

        let ha = load_events_csv(a.path()).unwrap().input_sha256;
        let hb = load_events_csv(b.path()).unwrap().input_sha256;
        let hc = load_events_csv(c.path()).unwrap().input_sha256;

        assert_eq!(ha, hb);
        assert_ne!(ha, hc);
        assert_eq!(ha.len(), 64);
    }

    #[test]
    fn test_to_tick() {
        let event = HistoricalEvent {
            timestamp_ns: 1_000,
            asset_id: 1,
            bid_price: 99.99,
            ask_price: 100.01,
            bid_size: 10,
            ask_size: 20,
            trade_volume: 5,
            trade_side: Side::Sell,
        };
        let tick = event.to_tick();
        assert_eq!(tick.mid_price, 100.0);
        assert_eq!(tick.trade_volume, 5);
        assert_eq!(tick.trade_side, Side::Sell);
    }
}
