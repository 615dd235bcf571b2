//! Deterministic backtest runner
//!
//! Replays a historical event CSV through the full pipeline, writes the
//! replay log and a one-row metrics CSV, and optionally sweeps the
//! simulated latency.

use anyhow::Result;
use clap::Parser;

use sable_bins::common::init_logging;
use sable_sim::{Backtester, SimConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Historical event CSV (ts_us,event_type,side,price,size,order_id,level)
    #[arg(short, long)]
    input: String,

    /// Replay log output path
    #[arg(long, default_value = "backtest_replay.log")]
    replay_log: String,

    /// Metrics CSV output path
    #[arg(long, default_value = "backtest_metrics.csv")]
    metrics_csv: String,

    /// Requested submit-to-eligible latency in ns (floored at 550)
    #[arg(long, default_value = "500")]
    latency_ns: i64,

    /// Starting equity
    #[arg(long, default_value = "100000.0")]
    initial_capital: f64,

    /// Commission per filled share
    #[arg(long, default_value = "0.0005")]
    commission: f64,

    /// Position limit magnitude
    #[arg(long, default_value = "1000")]
    max_position: i64,

    /// Fill-draw seed
    #[arg(long, default_value = "42")]
    seed: u32,

    /// Disable square-root slippage at fill
    #[arg(long)]
    no_slippage: bool,

    /// Disable the adverse-selection fill multiplier
    #[arg(long)]
    no_adverse_selection: bool,

    /// Rerun across the latency sweep list instead of a single run
    #[arg(long)]
    sweep: bool,

    /// Latency sweep values in ns
    #[arg(long, value_delimiter = ',', default_value = "100,250,500,1000,2000")]
    sweep_ns: Vec<i64>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = SimConfig {
        simulated_latency_ns: args.latency_ns,
        initial_capital: args.initial_capital,
        commission_per_share: args.commission,
        max_position: args.max_position,
        enable_slippage: !args.no_slippage,
        enable_adverse_selection: !args.no_adverse_selection,
        random_seed: args.seed,
        run_latency_sweep: args.sweep,
        latency_sweep_ns: args.sweep_ns.clone(),
    };

    let mut backtester = Backtester::new(config)?;
    backtester.load_events(&args.input)?;
    backtester.with_replay_log(&args.replay_log)?;

    if args.sweep {
        let results = backtester.run_latency_sweep()?;

        tracing::info!("=== latency sensitivity ===");
        for (latency_ns, metrics) in &results {
            tracing::info!(
                "{:>8} ns | pnl {:>12.2} | sharpe {:>7.3} | fill rate {:>5.1}% | adv.sel {:.4}",
                latency_ns,
                metrics.total_pnl,
                metrics.sharpe_ratio,
                metrics.fill_rate * 100.0,
                metrics.adverse_selection_ratio
            );
        }

        // PnL cost of each additional 100 ns, from the first two points
        let mut iter = results.iter();
        if let (Some((l1, m1)), Some((l2, m2))) = (iter.next(), iter.next()) {
            let pnl_per_100ns = (m2.total_pnl - m1.total_pnl) / ((l2 - l1) as f64 / 100.0);
            tracing::info!("degradation: {:.2} per 100 ns of latency", pnl_per_100ns.abs());
        }

        if let Some(metrics) = results.values().next_back() {
            metrics.export_csv(&args.metrics_csv)?;
        }
    } else {
        let metrics = backtester.run()?;
        metrics.log_summary();
        metrics.export_csv(&args.metrics_csv)?;
        tracing::info!("replay log: {}", args.replay_log);
        tracing::info!("metrics csv: {}", args.metrics_csv);
    }

    Ok(())
}
