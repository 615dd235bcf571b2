//! Tick-by-tick limit order book reconstruction
//!
//! Rebuilds per-symbol book state from ADD/MODIFY/DELETE/EXECUTE updates
//! under gap-detected sequence numbers, and emits a Deep-OFI feature
//! snapshot to registered listeners after every applied update.
//!
//! Two flat mappings hold the state: `level_by_price` per side (sorted,
//! bids iterated high-to-low, asks low-to-high) and `order_by_id` for
//! per-order modify/delete/execute. Level aggregates are maintained
//! incrementally; every tracked order contributes to exactly one level,
//! and a level whose count or quantity reaches zero is removed together
//! with its last order.
//!
//! Prices are compared with exact equality on the raw `f64` key as
//! supplied - upstream is expected to have rounded to tick. Time priority
//! within a level is not modeled.
//!
//! The book is single-threaded and owned by its engine; listeners run
//! synchronously in registration order on the same core.

pub mod ofi;

use std::collections::{BTreeMap, HashMap};

use ordered_float::OrderedFloat;

pub use ofi::{DeepOfiSnapshot, PressureWindow};

use crate::types::DEPTH_LEVELS;

/// Executions retained in the trailing pressure window
const PRESSURE_WINDOW: usize = 1000;

/// One price level: aggregate over all tracked orders at that price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
    pub order_count: u64,
    pub last_update_ns: i64,
}

impl PriceLevel {
    pub fn new(price: f64, quantity: f64, order_count: u64) -> Self {
        Self {
            price,
            quantity,
            order_count,
            last_update_ns: 0,
        }
    }
}

/// Per-order state backing MODIFY/DELETE/EXECUTE
#[derive(Debug, Clone, Copy)]
struct TrackedOrder {
    price: f64,
    quantity: f64,
    is_bid: bool,
}

/// Book update kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UpdateKind {
    Add = 0,
    Modify = 1,
    Delete = 2,
    Execute = 3,
}

impl UpdateKind {
    /// Map a wire kind byte; unknown values are dropped upstream
    pub fn from_wire(kind: u8) -> Option<Self> {
        match kind {
            0 => Some(UpdateKind::Add),
            1 => Some(UpdateKind::Modify),
            2 => Some(UpdateKind::Delete),
            3 => Some(UpdateKind::Execute),
            _ => None,
        }
    }
}

/// One decoded book update
#[derive(Debug, Clone, Copy)]
pub struct BookUpdate {
    pub kind: UpdateKind,
    pub order_id: u64,
    pub price: f64,
    pub quantity: f64,
    pub is_bid: bool,
    pub sequence: u64,
    pub timestamp_ns: i64,
}

/// Full book snapshot for initialization and gap recovery.
/// Bids sorted descending, asks ascending.
#[derive(Debug, Clone, Default)]
pub struct BookSnapshot {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub sequence: u64,
    pub timestamp_ns: i64,
}

/// Listener invoked synchronously with each Deep-OFI snapshot
pub type DeepStateListener = Box<dyn FnMut(&DeepOfiSnapshot)>;

/// Book statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct BookStats {
    pub total_updates: u64,
    pub missed_updates: u64,
    pub snapshot_requests: u64,
    pub bid_levels: u64,
    pub ask_levels: u64,
    pub last_mid_price: f64,
    pub last_spread: f64,
}

/// Tick-by-tick order book reconstructor with Deep-OFI production.
pub struct OrderBook {
    symbol_id: u32,

    /// Price -> level; iterate `.rev()` for best-first bids
    bids: BTreeMap<OrderedFloat<f64>, PriceLevel>,
    /// Price -> level; natural order is best-first for asks
    asks: BTreeMap<OrderedFloat<f64>, PriceLevel>,
    /// Order id -> (price, quantity, side)
    orders: HashMap<u64, TrackedOrder>,

    last_sequence: u64,
    gap_detected: bool,
    is_initialized: bool,

    total_updates: u64,
    missed_updates: u64,
    snapshot_requests: u64,
    invalid_updates: u64,

    /// Top-of-window quantities from the previous applied update,
    /// zero-padded beyond current depth
    prev_bid_quantities: [f64; DEPTH_LEVELS],
    prev_ask_quantities: [f64; DEPTH_LEVELS],

    pressure: PressureWindow,
    current_ofi: DeepOfiSnapshot,
    listeners: Vec<DeepStateListener>,
}

impl OrderBook {
    pub fn new(symbol_id: u32) -> Self {
        Self {
            symbol_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
            last_sequence: 0,
            gap_detected: false,
            is_initialized: false,
            total_updates: 0,
            missed_updates: 0,
            snapshot_requests: 0,
            invalid_updates: 0,
            prev_bid_quantities: [0.0; DEPTH_LEVELS],
            prev_ask_quantities: [0.0; DEPTH_LEVELS],
            pressure: PressureWindow::new(PRESSURE_WINDOW),
            current_ofi: DeepOfiSnapshot::zeroed(),
            listeners: Vec::new(),
        }
    }

    pub fn symbol_id(&self) -> u32 {
        self.symbol_id
    }

    /// Initialize (or re-initialize after a gap) from a full snapshot.
    /// Clears all prior state; the snapshot's sequence becomes the base.
    pub fn initialize_from_snapshot(&mut self, snapshot: &BookSnapshot) {
        self.bids.clear();
        self.asks.clear();
        self.orders.clear();

        for level in &snapshot.bids {
            self.bids.insert(OrderedFloat(level.price), *level);
        }
        for level in &snapshot.asks {
            self.asks.insert(OrderedFloat(level.price), *level);
        }

        self.last_sequence = snapshot.sequence;
        self.gap_detected = false;
        self.is_initialized = true;

        // Baseline for the next OFI delta
        self.store_previous_state();

        tracing::debug!(
            "book {} initialized from snapshot: seq={} bids={} asks={}",
            self.symbol_id,
            snapshot.sequence,
            snapshot.bids.len(),
            snapshot.asks.len()
        );
    }

    /// Apply one update. Returns whether it was applied; an update is
    /// never partially applied. Rejections: sequence gap (until a
    /// snapshot arrives), DELETE of an unknown order id, NaN/negative
    /// price or size.
    pub fn process_update(&mut self, update: &BookUpdate) -> bool {
        // Refuse everything while gapped; recovery goes through
        // initialize_from_snapshot.
        if self.gap_detected {
            return false;
        }

        if !update.price.is_finite()
            || update.price < 0.0
            || !update.quantity.is_finite()
            || update.quantity < 0.0
        {
            self.invalid_updates += 1;
            return false;
        }

        if self.is_initialized
            && self.last_sequence != 0
            && update.sequence != self.last_sequence + 1
        {
            let missed = update
                .sequence
                .saturating_sub(self.last_sequence + 1)
                .max(1);
            self.gap_detected = true;
            self.missed_updates += missed;
            self.snapshot_requests += 1;
            tracing::warn!(
                "book {} sequence gap: {} -> {} ({} missed), awaiting snapshot",
                self.symbol_id,
                self.last_sequence,
                update.sequence,
                missed
            );
            return false;
        }

        self.store_previous_state();

        let applied = match update.kind {
            UpdateKind::Add => self.handle_add(update),
            UpdateKind::Modify => self.handle_modify(update),
            UpdateKind::Delete => self.handle_delete(update),
            UpdateKind::Execute => self.handle_execute(update),
        };

        if applied {
            self.last_sequence = update.sequence;
            self.total_updates += 1;

            let features = self.compute_deep_ofi(update.timestamp_ns);
            self.current_ofi = features;
            for listener in &mut self.listeners {
                listener(&features);
            }
        }

        applied
    }

    /// Register a listener for Deep-OFI snapshots. Listeners fire
    /// synchronously after every applied update, in registration order.
    pub fn register_deep_state_callback(&mut self, listener: DeepStateListener) {
        self.listeners.push(listener);
    }

    /// Current best bid and ask with aggregate sizes; `None` per side
    /// when that side is empty.
    pub fn top_of_book(&self) -> (Option<PriceLevel>, Option<PriceLevel>) {
        let best_bid = self.bids.iter().next_back().map(|(_, l)| *l);
        let best_ask = self.asks.iter().next().map(|(_, l)| *l);
        (best_bid, best_ask)
    }

    /// Top `n` levels per side in price-sorted order (bids descending,
    /// asks ascending), `n` capped at book depth window.
    pub fn depth(&self, n: usize) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        let n = n.min(DEPTH_LEVELS);
        let bids = self.bids.values().rev().take(n).copied().collect();
        let asks = self.asks.values().take(n).copied().collect();
        (bids, asks)
    }

    /// True when a gap has been detected and updates are refused until
    /// [`initialize_from_snapshot`](Self::initialize_from_snapshot).
    pub fn needs_snapshot_recovery(&self) -> bool {
        self.gap_detected
    }

    /// Last applied (or snapshot) sequence number
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// The most recent Deep-OFI snapshot
    pub fn current_ofi(&self) -> &DeepOfiSnapshot {
        &self.current_ofi
    }

    pub fn stats(&self) -> BookStats {
        let (best_bid, best_ask) = self.top_of_book();
        let (mid, spread) = match (best_bid, best_ask) {
            (Some(b), Some(a)) => ((b.price + a.price) / 2.0, a.price - b.price),
            _ => (0.0, 0.0),
        };

        BookStats {
            total_updates: self.total_updates,
            missed_updates: self.missed_updates,
            snapshot_requests: self.snapshot_requests,
            bid_levels: self.bids.len() as u64,
            ask_levels: self.asks.len() as u64,
            last_mid_price: mid,
            last_spread: spread,
        }
    }

    /// Dropped NaN/negative updates
    pub fn invalid_updates(&self) -> u64 {
        self.invalid_updates
    }

    // ===== update handlers =====

    fn handle_add(&mut self, update: &BookUpdate) -> bool {
        self.orders.insert(
            update.order_id,
            TrackedOrder {
                price: update.price,
                quantity: update.quantity,
                is_bid: update.is_bid,
            },
        );

        let book = if update.is_bid {
            &mut self.bids
        } else {
            &mut self.asks
        };

        let level = book
            .entry(OrderedFloat(update.price))
            .or_insert_with(|| PriceLevel::new(update.price, 0.0, 0));
        level.quantity += update.quantity;
        level.order_count += 1;
        level.last_update_ns = update.timestamp_ns;

        true
    }

    fn handle_modify(&mut self, update: &BookUpdate) -> bool {
        let Some(old) = self.orders.get(&update.order_id).copied() else {
            // Unknown order id behaves as ADD
            return self.handle_add(update);
        };

        // DELETE of the old placement...
        let book = if old.is_bid {
            &mut self.bids
        } else {
            &mut self.asks
        };
        if let Some(level) = book.get_mut(&OrderedFloat(old.price)) {
            level.quantity -= old.quantity;
            level.order_count -= 1;
            if level.quantity <= 0.0 || level.order_count == 0 {
                book.remove(&OrderedFloat(old.price));
            }
        }

        // ...followed by ADD at the new price/quantity, same order id
        self.orders.insert(
            update.order_id,
            TrackedOrder {
                price: update.price,
                quantity: update.quantity,
                is_bid: old.is_bid,
            },
        );

        let book = if old.is_bid {
            &mut self.bids
        } else {
            &mut self.asks
        };
        let level = book
            .entry(OrderedFloat(update.price))
            .or_insert_with(|| PriceLevel::new(update.price, 0.0, 0));
        level.quantity += update.quantity;
        level.order_count += 1;
        level.last_update_ns = update.timestamp_ns;

        true
    }

    fn handle_delete(&mut self, update: &BookUpdate) -> bool {
        let Some(order) = self.orders.remove(&update.order_id) else {
            return false;
        };

        let book = if order.is_bid {
            &mut self.bids
        } else {
            &mut self.asks
        };
        if let Some(level) = book.get_mut(&OrderedFloat(order.price)) {
            level.quantity -= order.quantity;
            level.order_count = level.order_count.saturating_sub(1);
            if level.quantity <= 0.0 || level.order_count == 0 {
                book.remove(&OrderedFloat(order.price));
            }
        }

        true
    }

    fn handle_execute(&mut self, update: &BookUpdate) -> bool {
        let Some(order) = self.orders.get(&update.order_id).copied() else {
            // Aggressive trade against an untracked order: only the
            // pressure window moves.
            self.pressure.record(update.is_bid, update.quantity);
            return true;
        };

        let book = if order.is_bid {
            &mut self.bids
        } else {
            &mut self.asks
        };

        if let Some(level) = book.get_mut(&OrderedFloat(order.price)) {
            level.quantity -= update.quantity;
            level.last_update_ns = update.timestamp_ns;

            if update.quantity >= order.quantity {
                // Fully executed: order and its level count go together
                level.order_count = level.order_count.saturating_sub(1);
                self.orders.remove(&update.order_id);
            } else if let Some(tracked) = self.orders.get_mut(&update.order_id) {
                tracked.quantity -= update.quantity;
            }

            if level.quantity <= 0.0 || level.order_count == 0 {
                book.remove(&OrderedFloat(order.price));
            }
        } else {
            // Level vanished from under the order; drop the order too
            self.orders.remove(&update.order_id);
        }

        self.pressure.record(order.is_bid, update.quantity);
        true
    }

    // ===== Deep-OFI production =====

    fn store_previous_state(&mut self) {
        self.prev_bid_quantities = [0.0; DEPTH_LEVELS];
        self.prev_ask_quantities = [0.0; DEPTH_LEVELS];

        for (i, level) in self.bids.values().rev().take(DEPTH_LEVELS).enumerate() {
            self.prev_bid_quantities[i] = level.quantity;
        }
        for (i, level) in self.asks.values().take(DEPTH_LEVELS).enumerate() {
            self.prev_ask_quantities[i] = level.quantity;
        }
    }

    fn compute_deep_ofi(&self, timestamp_ns: i64) -> DeepOfiSnapshot {
        let mut features = DeepOfiSnapshot::zeroed();
        features.timestamp_ns = timestamp_ns;

        // Per-level deltas against the stored prior quantities
        for (i, level) in self.bids.values().rev().take(DEPTH_LEVELS).enumerate() {
            features.bid_ofi[i] = level.quantity - self.prev_bid_quantities[i];
        }
        for (i, level) in self.asks.values().take(DEPTH_LEVELS).enumerate() {
            features.ask_ofi[i] = level.quantity - self.prev_ask_quantities[i];
        }

        // Aggregates
        for i in 0..DEPTH_LEVELS {
            let level_ofi = features.bid_ofi[i] - features.ask_ofi[i];
            features.total_ofi += level_ofi;
            if i < 5 {
                features.top5_ofi += level_ofi;
            }
        }
        features.top1_ofi = features.bid_ofi[0] - features.ask_ofi[0];

        // Volume-weighted OFI over displayed volume
        let mut total_volume = 0.0;
        for (i, level) in self.bids.values().rev().take(DEPTH_LEVELS).enumerate() {
            features.weighted_ofi += features.bid_ofi[i] * level.quantity;
            total_volume += level.quantity;
        }
        for (i, level) in self.asks.values().take(DEPTH_LEVELS).enumerate() {
            features.weighted_ofi -= features.ask_ofi[i] * level.quantity;
            total_volume += level.quantity;
        }
        if total_volume > 0.0 {
            features.weighted_ofi /= total_volume;
        }

        // Volume and depth imbalance over the full book
        let bid_volume: f64 = self.bids.values().map(|l| l.quantity).sum();
        let ask_volume: f64 = self.asks.values().map(|l| l.quantity).sum();
        if bid_volume + ask_volume > 0.0 {
            features.volume_imbalance = (bid_volume - ask_volume) / (bid_volume + ask_volume);
        }

        let bid_depth = self.bids.len() as f64;
        let ask_depth = self.asks.len() as f64;
        if bid_depth + ask_depth > 0.0 {
            features.depth_imbalance = (bid_depth - ask_depth) / (bid_depth + ask_depth);
        }

        // Spread, mid, volume-weighted mid
        if let (Some((_, bid)), Some((_, ask))) =
            (self.bids.iter().next_back(), self.asks.iter().next())
        {
            features.spread = ask.price - bid.price;
            features.mid_price = (bid.price + ask.price) / 2.0;

            let qty_total = bid.quantity + ask.quantity;
            features.weighted_mid_price = if qty_total > 0.0 {
                (bid.price * ask.quantity + ask.price * bid.quantity) / qty_total
            } else {
                features.mid_price
            };
        }

        features.buy_pressure = self.pressure.buy_pressure();
        features.sell_pressure = self.pressure.sell_pressure();
        features.net_pressure = features.buy_pressure - features.sell_pressure;

        features
    }
}
