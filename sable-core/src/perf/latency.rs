//! Latency sample statistics and pipeline stage timings
//!
//! Backs the measurement harness's three outputs:
//! - `total.csv` - one row of aggregate statistics over all samples
//! - `components.csv` - one row per pipeline stage
//! - `raw_samples.csv` - one row per measurement with all stage timings

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

/// Pipeline stages measured per tick, in order.
pub const STAGE_NAMES: [&str; 9] = [
    "rx_dma",
    "parse",
    "book_update",
    "feature_extract",
    "signal",
    "strategy",
    "risk",
    "order_encode",
    "tx_dma",
];

/// Per-tick stage timing breakdown, nanoseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub rx_dma_ns: f64,
    pub parse_ns: f64,
    pub book_update_ns: f64,
    pub feature_extract_ns: f64,
    pub signal_ns: f64,
    pub strategy_ns: f64,
    pub risk_ns: f64,
    pub order_encode_ns: f64,
    pub tx_dma_ns: f64,
}

impl StageTimings {
    /// Stage values in [`STAGE_NAMES`] order
    pub fn as_array(&self) -> [f64; 9] {
        [
            self.rx_dma_ns,
            self.parse_ns,
            self.book_update_ns,
            self.feature_extract_ns,
            self.signal_ns,
            self.strategy_ns,
            self.risk_ns,
            self.order_encode_ns,
            self.tx_dma_ns,
        ]
    }

    /// End-to-end tick-to-trade time
    pub fn total_ns(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

/// Aggregate statistics over a latency sample set.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyStats {
    pub mean_ns: f64,
    pub median_ns: f64,
    pub p90_ns: f64,
    pub p99_ns: f64,
    pub p999_ns: f64,
    pub p9999_ns: f64,
    pub stddev_ns: f64,
    /// Run-to-run variability; reported as the standard deviation
    pub jitter_ns: f64,
    pub min_ns: f64,
    pub max_ns: f64,
    pub sample_count: u64,
}

impl LatencyStats {
    /// Compute statistics over a sample set (nanoseconds). Empty input
    /// yields the zero struct.
    pub fn from_samples_ns(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let variance = sorted.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n as f64;
        let stddev = variance.sqrt();

        Self {
            mean_ns: mean,
            median_ns: percentile(&sorted, 0.50),
            p90_ns: percentile(&sorted, 0.90),
            p99_ns: percentile(&sorted, 0.99),
            p999_ns: percentile(&sorted, 0.999),
            p9999_ns: percentile(&sorted, 0.9999),
            stddev_ns: stddev,
            jitter_ns: stddev,
            min_ns: sorted[0],
            max_ns: sorted[n - 1],
            sample_count: n as u64,
        }
    }

    /// Write the single-row `total.csv` schema.
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("create {}", path.as_ref().display()))?;
        let mut w = BufWriter::new(file);

        writeln!(
            w,
            "mean_ns,median_ns,p90_ns,p99_ns,p999_ns,p9999_ns,stddev_ns,jitter_ns,min_ns,max_ns,sample_count"
        )?;
        writeln!(
            w,
            "{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{}",
            self.mean_ns,
            self.median_ns,
            self.p90_ns,
            self.p99_ns,
            self.p999_ns,
            self.p9999_ns,
            self.stddev_ns,
            self.jitter_ns,
            self.min_ns,
            self.max_ns,
            self.sample_count
        )?;
        Ok(())
    }
}

/// Nearest-rank percentile over a pre-sorted sample set
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let idx = ((sorted.len() as f64 * q) as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Write `components.csv`: one row per stage with mean/p99/max and share
/// of the total mean.
pub fn export_components_csv<P: AsRef<Path>>(path: P, samples: &[StageTimings]) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("create {}", path.as_ref().display()))?;
    let mut w = BufWriter::new(file);

    writeln!(w, "component,mean_ns,p99_ns,max_ns,percent")?;

    let totals: Vec<f64> = samples.iter().map(|s| s.total_ns()).collect();
    let total_mean = LatencyStats::from_samples_ns(&totals).mean_ns;

    for (stage_idx, name) in STAGE_NAMES.iter().enumerate() {
        let series: Vec<f64> = samples.iter().map(|s| s.as_array()[stage_idx]).collect();
        let stats = LatencyStats::from_samples_ns(&series);
        let percent = if total_mean > 0.0 {
            stats.mean_ns / total_mean * 100.0
        } else {
            0.0
        };
        writeln!(
            w,
            "{},{:.2},{:.2},{:.2},{:.2}",
            name, stats.mean_ns, stats.p99_ns, stats.max_ns, percent
        )?;
    }
    Ok(())
}

/// Write `raw_samples.csv`: one row per measurement with every stage.
pub fn export_raw_samples_csv<P: AsRef<Path>>(path: P, samples: &[StageTimings]) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("create {}", path.as_ref().display()))?;
    let mut w = BufWriter::new(file);

    write!(w, "sample_id,total_ns")?;
    for name in STAGE_NAMES {
        write!(w, ",{}_ns", name)?;
    }
    writeln!(w)?;

    for (i, sample) in samples.iter().enumerate() {
        write!(w, "{},{:.2}", i, sample.total_ns())?;
        for value in sample.as_array() {
            write!(w, ",{:.2}", value)?;
        }
        writeln!(w)?;
    }
    Ok(())
}
