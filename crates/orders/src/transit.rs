//! Incoming-transfer feed contract.

use std::collections::HashMap;

use agroerp_core::{ItemId, WarehouseId};

/// Source of in-transit quantities (incoming transfers not yet received).
pub trait TransitFeed: Send + Sync {
    fn in_transit_quantity(&self, item_id: ItemId, warehouse_id: WarehouseId) -> i64;
}

impl<F> TransitFeed for std::sync::Arc<F>
where
    F: TransitFeed + ?Sized,
{
    fn in_transit_quantity(&self, item_id: ItemId, warehouse_id: WarehouseId) -> i64 {
        (**self).in_transit_quantity(item_id, warehouse_id)
    }
}

/// Feed reporting nothing in transit.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransit;

impl TransitFeed for NoTransit {
    fn in_transit_quantity(&self, _item_id: ItemId, _warehouse_id: WarehouseId) -> i64 {
        0
    }
}

/// Fixed per-key quantities, for wiring and tests.
#[derive(Debug, Default)]
pub struct StaticTransit {
    quantities: HashMap<(ItemId, WarehouseId), i64>,
}

impl StaticTransit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, item_id: ItemId, warehouse_id: WarehouseId, quantity: i64) {
        self.quantities.insert((item_id, warehouse_id), quantity);
    }
}

impl TransitFeed for StaticTransit {
    fn in_transit_quantity(&self, item_id: ItemId, warehouse_id: WarehouseId) -> i64 {
        self.quantities
            .get(&(item_id, warehouse_id))
            .copied()
            .unwrap_or(0)
    }
}
