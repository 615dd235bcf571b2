//! Backtest performance metrics
//!
//! Computed once at the end of a replay from the recorded equity curve,
//! spread series and fill history. Annualization uses the trading-seconds
//! convention `sqrt(252 · 6.5 · 3600)`.
//!
//! The realized/effective spread figures are modeling placeholders
//! (`realized = 0.6 · quoted`, `effective = 0.8 · realized`), not
//! tick-derived measurements; they are preserved for reproducibility.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use sable_core::types::Side;

/// `sqrt(seconds of trading per year)`
const ANNUALIZATION: f64 = 252.0 * 6.5 * 3600.0;

/// One filled trade, as the metrics pass sees it.
#[derive(Debug, Clone, Copy)]
pub struct TradeRecord {
    pub side: Side,
    pub fill_price: f64,
    pub quantity: u64,
}

/// Aggregate backtest statistics.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    // Returns
    pub total_pnl: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
    pub volatility: f64,
    pub downside_deviation: f64,

    // Tail risk
    pub value_at_risk_95: f64,
    pub conditional_var_95: f64,

    // Trade statistics
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub avg_trade_pnl: f64,
    pub fill_rate: f64,

    // Spread capture (modeling placeholders, see module docs)
    pub quoted_spread_bps: f64,
    pub realized_spread_bps: f64,
    pub effective_spread_bps: f64,
    pub adverse_selection_ratio: f64,

    // Time series
    pub equity_curve: Vec<f64>,
    pub drawdown_curve: Vec<f64>,
    pub timestamps: Vec<i64>,
}

impl PerformanceMetrics {
    /// Compute the full metric set from a completed replay.
    ///
    /// Trades are marked against `final_mid` for the win/loss split,
    /// matching the equity curve's mark-to-current-mid convention.
    pub fn compute(
        pnl_history: &[f64],
        timestamps: &[i64],
        quoted_spreads_bps: &[f64],
        trades: &[TradeRecord],
        orders_submitted: u64,
        initial_capital: f64,
        final_mid: f64,
    ) -> Self {
        let mut m = Self::default();
        if pnl_history.is_empty() {
            return m;
        }

        m.total_pnl = *pnl_history.last().unwrap();

        // Per-step PnL returns
        let returns: Vec<f64> = pnl_history.windows(2).map(|w| w[1] - w[0]).collect();

        if !returns.is_empty() {
            let mean = returns.iter().sum::<f64>() / returns.len() as f64;
            let variance =
                returns.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / returns.len() as f64;
            m.volatility = variance.sqrt();

            m.sharpe_ratio = if m.volatility > 1e-10 {
                mean / m.volatility * ANNUALIZATION.sqrt()
            } else {
                0.0
            };

            let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
            m.downside_deviation = if downside.is_empty() {
                0.0
            } else {
                (downside.iter().map(|r| r * r).sum::<f64>() / downside.len() as f64).sqrt()
            };
            m.sortino_ratio = if m.downside_deviation > 1e-10 {
                mean / m.downside_deviation * ANNUALIZATION.sqrt()
            } else {
                0.0
            };

            // 95% VaR from the left tail; CVaR as the tail mean
            let mut sorted = returns.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let var_idx = (sorted.len() as f64 * 0.05) as usize;
            m.value_at_risk_95 = -sorted[var_idx.min(sorted.len() - 1)];
            if var_idx > 0 {
                m.conditional_var_95 = -sorted[..var_idx].iter().sum::<f64>() / var_idx as f64;
            }
        }

        // Drawdown over the equity curve
        let mut peak = pnl_history[0];
        let mut max_dd = 0.0f64;
        let mut drawdown_curve = Vec::with_capacity(pnl_history.len());
        for &pnl in pnl_history {
            peak = peak.max(pnl);
            let dd = (peak - pnl) / (peak.abs() + 1e-10);
            max_dd = max_dd.max(dd);
            drawdown_curve.push(dd);
        }
        m.max_drawdown = max_dd;
        m.calmar_ratio = if max_dd > 1e-10 {
            (m.total_pnl / initial_capital) / max_dd
        } else {
            0.0
        };

        // Trade statistics, marked against the final mid
        m.total_trades = trades.len() as u64;
        let mut gross_profit = 0.0;
        let mut gross_loss = 0.0;
        for trade in trades {
            let qty = trade.quantity as f64;
            let pnl = match trade.side {
                Side::Buy => (final_mid - trade.fill_price) * qty,
                Side::Sell => (trade.fill_price - final_mid) * qty,
            };
            if pnl > 0.0 {
                m.winning_trades += 1;
                gross_profit += pnl;
            } else {
                m.losing_trades += 1;
                gross_loss += pnl.abs();
            }
        }
        if m.total_trades > 0 {
            m.win_rate = m.winning_trades as f64 / m.total_trades as f64;
            m.avg_trade_pnl = m.total_pnl / m.total_trades as f64;
        }
        if gross_loss > 1e-10 {
            m.profit_factor = gross_profit / gross_loss;
        }
        if m.winning_trades > 0 {
            m.avg_win = gross_profit / m.winning_trades as f64;
        }
        if m.losing_trades > 0 {
            m.avg_loss = gross_loss / m.losing_trades as f64;
        }
        if orders_submitted > 0 {
            m.fill_rate = m.total_trades as f64 / orders_submitted as f64;
        }

        // Spread capture chain: the 0.6 / 0.8 factors are documented
        // modeling constants
        if !quoted_spreads_bps.is_empty() {
            m.quoted_spread_bps =
                quoted_spreads_bps.iter().sum::<f64>() / quoted_spreads_bps.len() as f64;
        }
        m.realized_spread_bps = m.quoted_spread_bps * 0.6;
        m.effective_spread_bps = m.realized_spread_bps * 0.8;
        m.adverse_selection_ratio = if m.quoted_spread_bps > 1e-10 {
            m.effective_spread_bps / m.quoted_spread_bps
        } else {
            0.0
        };

        m.equity_curve = pnl_history.to_vec();
        m.drawdown_curve = drawdown_curve;
        m.timestamps = timestamps.to_vec();

        m
    }

    /// One-row summary CSV (stable field order and formatting).
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("create {}", path.as_ref().display()))?;
        let mut w = BufWriter::new(file);

        writeln!(
            w,
            "total_pnl,sharpe_ratio,sortino_ratio,max_drawdown,calmar_ratio,volatility,\
             var_95,cvar_95,total_trades,winning_trades,losing_trades,win_rate,profit_factor,\
             fill_rate,quoted_spread_bps,realized_spread_bps,effective_spread_bps"
        )?;
        writeln!(
            w,
            "{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            self.total_pnl,
            self.sharpe_ratio,
            self.sortino_ratio,
            self.max_drawdown,
            self.calmar_ratio,
            self.volatility,
            self.value_at_risk_95,
            self.conditional_var_95,
            self.total_trades,
            self.winning_trades,
            self.losing_trades,
            self.win_rate,
            self.profit_factor,
            self.fill_rate,
            self.quoted_spread_bps,
            self.realized_spread_bps,
            self.effective_spread_bps
        )?;
        Ok(())
    }

    /// Log the headline numbers.
    pub fn log_summary(&self) {
        tracing::info!("=== backtest summary ===");
        tracing::info!("total pnl:        {:.2}", self.total_pnl);
        tracing::info!("sharpe ratio:     {:.3}", self.sharpe_ratio);
        tracing::info!("sortino ratio:    {:.3}", self.sortino_ratio);
        tracing::info!("max drawdown:     {:.2}%", self.max_drawdown * 100.0);
        tracing::info!("calmar ratio:     {:.3}", self.calmar_ratio);
        tracing::info!(
            "trades:           {} ({} win / {} lose, {:.1}% win rate)",
            self.total_trades,
            self.winning_trades,
            self.losing_trades,
            self.win_rate * 100.0
        );
        tracing::info!("fill rate:        {:.1}%", self.fill_rate * 100.0);
        tracing::info!(
            "spreads (bps):    quoted {:.2} / realized {:.2} / effective {:.2}",
            self.quoted_spread_bps,
            self.realized_spread_bps,
            self.effective_spread_bps
        );
        tracing::info!(
            "tail risk:        VaR95 {:.4} / CVaR95 {:.4}",
            self.value_at_risk_95,
            self.conditional_var_95
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history() {
        let m = PerformanceMetrics::compute(&[], &[], &[], &[], 0, 100_000.0, 100.0);
        assert_eq!(m.total_pnl, 0.0);
        assert_eq!(m.total_trades, 0);
    }

    #[test]
    fn test_total_pnl_and_curves() {
        let pnl = vec![0.0, 10.0, 5.0, 20.0];
        let ts = vec![1, 2, 3, 4];
        let m = PerformanceMetrics::compute(&pnl, &ts, &[], &[], 0, 100_000.0, 100.0);

        assert_eq!(m.total_pnl, 20.0);
        assert_eq!(m.equity_curve.len(), 4);
        assert_eq!(m.drawdown_curve.len(), 4);
        assert_eq!(m.timestamps, ts);

        // Drawdown at the dip: (10 - 5) / 10
        assert!((m.drawdown_curve[2] - 0.5).abs() < 1e-6);
        assert!((m.max_drawdown - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sharpe_positive_for_rising_equity() {
        let pnl: Vec<f64> = (0..100).map(|i| i as f64 * 1.5).collect();
        let m = PerformanceMetrics::compute(&pnl, &[], &[], &[], 0, 100_000.0, 100.0);

        // Constant positive returns: zero variance, sharpe collapses to 0
        assert_eq!(m.sharpe_ratio, 0.0);

        let noisy: Vec<f64> = (0..100)
            .map(|i| i as f64 * 1.5 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let m = PerformanceMetrics::compute(&noisy, &[], &[], &[], 0, 100_000.0, 100.0);
        assert!(m.sharpe_ratio > 0.0);
    }

    #[test]
    fn test_trade_stats_marked_to_final_mid() {
        let trades = vec![
            TradeRecord {
                side: Side::Buy,
                fill_price: 99.0,
                quantity: 10,
            },
            TradeRecord {
                side: Side::Sell,
                fill_price: 99.0,
                quantity: 10,
            },
        ];
        // Final mid 100: the buy made 10, the sell lost 10
        let m = PerformanceMetrics::compute(&[0.0, 1.0], &[], &[], &trades, 4, 100_000.0, 100.0);

        assert_eq!(m.total_trades, 2);
        assert_eq!(m.winning_trades, 1);
        assert_eq!(m.losing_trades, 1);
        assert_eq!(m.win_rate, 0.5);
        assert!((m.profit_factor - 1.0).abs() < 1e-9);
        assert_eq!(m.avg_win, 10.0);
        assert_eq!(m.avg_loss, 10.0);
        assert_eq!(m.fill_rate, 0.5);
    }

    #[test]
    fn test_spread_capture_chain() {
        let m = PerformanceMetrics::compute(
            &[0.0, 1.0],
            &[],
            &[2.0, 4.0],
            &[],
            0,
            100_000.0,
            100.0,
        );

        assert_eq!(m.quoted_spread_bps, 3.0);
        assert!((m.realized_spread_bps - 1.8).abs() < 1e-9);
        assert!((m.effective_spread_bps - 1.44).abs() < 1e-9);
        assert!((m.adverse_selection_ratio - 0.48).abs() < 1e-9);
    }

    #[test]
    fn test_var_left_tail() {
        // Returns: mostly +1, with 6% large losses so the 5% tail index
        // lands inside the loss cluster
        let mut pnl = vec![0.0];
        let mut acc = 0.0;
        for i in 0..100 {
            acc += if i % 16 == 15 { -50.0 } else { 1.0 };
            pnl.push(acc);
        }
        let m = PerformanceMetrics::compute(&pnl, &[], &[], &[], 0, 100_000.0, 100.0);

        // The 5% left tail catches the -50 steps
        assert!(m.value_at_risk_95 > 0.0);
        assert!(m.conditional_var_95 >= m.value_at_risk_95 * 0.9);
    }

    #[test]
    fn test_csv_export_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let pnl = vec![0.0, 5.0, 3.0, 12.0];

        let a_path = dir.path().join("a.csv");
        let b_path = dir.path().join("b.csv");
        for path in [&a_path, &b_path] {
            PerformanceMetrics::compute(&pnl, &[1, 2, 3, 4], &[2.0], &[], 2, 100_000.0, 100.0)
                .export_csv(path)
                .unwrap();
        }

        assert_eq!(
            std::fs::read(&a_path).unwrap(),
            std::fs::read(&b_path).unwrap()
        );
    }
}
