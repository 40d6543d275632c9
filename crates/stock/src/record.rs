use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agroerp_core::{ItemId, ValueObject, WarehouseId};

/// Ledger row key: one item in one warehouse.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct StockKey {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
}

impl StockKey {
    pub fn new(item_id: ItemId, warehouse_id: WarehouseId) -> Self {
        Self {
            item_id,
            warehouse_id,
        }
    }
}

impl ValueObject for StockKey {}

/// Aggregate quantity record for one (item, warehouse) key.
///
/// `available` is derived, never stored: every committed mutation leaves
/// `on_hand − reserved − frozen − damaged ≥ 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub key: StockKey,
    pub on_hand: i64,
    pub reserved: i64,
    pub frozen: i64,
    pub damaged: i64,
    pub safety_stock: i64,
    pub reorder_point: i64,
    pub max_stock: i64,
    /// Unit cost in the smallest currency unit.
    pub unit_cost: u64,
    pub last_movement_at: Option<DateTime<Utc>>,
}

impl StockRecord {
    /// Zeroed record for a key (first receipt creates rows this way).
    pub fn new(key: StockKey) -> Self {
        Self {
            key,
            on_hand: 0,
            reserved: 0,
            frozen: 0,
            damaged: 0,
            safety_stock: 0,
            reorder_point: 0,
            max_stock: 0,
            unit_cost: 0,
            last_movement_at: None,
        }
    }

    pub fn with_on_hand(mut self, on_hand: i64) -> Self {
        self.on_hand = on_hand;
        self
    }

    pub fn with_levels(mut self, safety_stock: i64, reorder_point: i64, max_stock: i64) -> Self {
        self.safety_stock = safety_stock;
        self.reorder_point = reorder_point;
        self.max_stock = max_stock;
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: u64) -> Self {
        self.unit_cost = unit_cost;
        self
    }

    /// Quantity free to promise right now.
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved - self.frozen - self.damaged
    }

    /// On-hand at or below safety stock.
    pub fn is_low_stock(&self) -> bool {
        self.on_hand <= self.safety_stock
    }
}
