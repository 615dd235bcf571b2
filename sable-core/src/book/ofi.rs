//! Deep Order-Flow Imbalance features
//!
//! Emitted by the book engine after every applied update: per-level
//! quantity deltas against the prior book state plus the aggregate
//! microstructure features downstream signal code consumes.

use std::collections::VecDeque;

use crate::types::DEPTH_LEVELS;

/// One Deep-OFI observation.
///
/// Level deltas are signed changes in displayed quantity per price level
/// between two successive applied updates; positive bid OFI means bids
/// grew at that level.
#[derive(Debug, Clone, Copy)]
pub struct DeepOfiSnapshot {
    /// Per-level bid quantity deltas (best level first)
    pub bid_ofi: [f64; DEPTH_LEVELS],
    /// Per-level ask quantity deltas (best level first)
    pub ask_ofi: [f64; DEPTH_LEVELS],

    /// Σ over levels of `bid_ofi - ask_ofi`
    pub total_ofi: f64,
    /// OFI over the top five levels
    pub top5_ofi: f64,
    /// OFI at the best bid/ask only
    pub top1_ofi: f64,
    /// OFI weighted by current level quantities, normalized by total
    /// displayed volume
    pub weighted_ofi: f64,

    /// `(Σbid - Σask) / (Σbid + Σask)` over displayed quantity
    pub volume_imbalance: f64,
    /// Imbalance of distinct level counts per side
    pub depth_imbalance: f64,

    /// Best ask minus best bid
    pub spread: f64,
    /// `(bid + ask) / 2`
    pub mid_price: f64,
    /// `(bid·ask_qty + ask·bid_qty) / (bid_qty + ask_qty)`
    pub weighted_mid_price: f64,

    /// Trailing aggressive buy volume (last 1000 executions)
    pub buy_pressure: f64,
    /// Trailing aggressive sell volume (last 1000 executions)
    pub sell_pressure: f64,
    /// `buy_pressure - sell_pressure`
    pub net_pressure: f64,

    /// Timestamp of the update that produced this snapshot
    pub timestamp_ns: i64,
}

impl DeepOfiSnapshot {
    pub const fn zeroed() -> Self {
        Self {
            bid_ofi: [0.0; DEPTH_LEVELS],
            ask_ofi: [0.0; DEPTH_LEVELS],
            total_ofi: 0.0,
            top5_ofi: 0.0,
            top1_ofi: 0.0,
            weighted_ofi: 0.0,
            volume_imbalance: 0.0,
            depth_imbalance: 0.0,
            spread: 0.0,
            mid_price: 0.0,
            weighted_mid_price: 0.0,
            buy_pressure: 0.0,
            sell_pressure: 0.0,
            net_pressure: 0.0,
            timestamp_ns: 0,
        }
    }
}

impl Default for DeepOfiSnapshot {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Trailing window of aggressive executions, bucketed by aggressor side.
/// Bounded at `window` entries per side; sums maintained incrementally.
#[derive(Debug, Clone)]
pub struct PressureWindow {
    window: usize,
    buy_volumes: VecDeque<f64>,
    sell_volumes: VecDeque<f64>,
    buy_sum: f64,
    sell_sum: f64,
}

impl PressureWindow {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            buy_volumes: VecDeque::with_capacity(window),
            sell_volumes: VecDeque::with_capacity(window),
            buy_sum: 0.0,
            sell_sum: 0.0,
        }
    }

    /// Record one aggressive execution
    #[inline]
    pub fn record(&mut self, is_buy: bool, volume: f64) {
        let (volumes, sum) = if is_buy {
            (&mut self.buy_volumes, &mut self.buy_sum)
        } else {
            (&mut self.sell_volumes, &mut self.sell_sum)
        };

        volumes.push_back(volume);
        *sum += volume;
        if volumes.len() > self.window {
            if let Some(old) = volumes.pop_front() {
                *sum -= old;
            }
        }
    }

    #[inline(always)]
    pub fn buy_pressure(&self) -> f64 {
        self.buy_sum
    }

    #[inline(always)]
    pub fn sell_pressure(&self) -> f64 {
        self.sell_sum
    }

    pub fn clear(&mut self) {
        self.buy_volumes.clear();
        self.sell_volumes.clear();
        self.buy_sum = 0.0;
        self.sell_sum = 0.0;
    }
}
