//! The integration-facing domain events.
//!
//! These are the facts the inventory core shares with the rest of the
//! system. Payloads carry ids and quantities, never entity snapshots;
//! subscribers that need full state query the owning ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agroerp_core::{ItemId, OrderId, ReservationId, WarehouseId};

use crate::event::Event;

/// Severity attached to alert events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Event: stock was reserved against a reference document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub reservation_id: ReservationId,
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a reservation was released and its quantity returned to available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReleased {
    pub reservation_id: ReservationId,
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: on-hand quantity fell to or below safety stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStock {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub current_qty: i64,
    pub safety_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: an alert condition was raised (low stock impact, batch expiry, …).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTriggered {
    pub source: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: every line of an order got its reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAllocated {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a batch allocation run finished with the given per-order tallies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAllocationCompleted {
    pub allocated: usize,
    pub partial: usize,
    pub failed: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Event: replenishment should be considered for a low item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerReplenishment {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub current_qty: i64,
    pub suggested_qty: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    StockReserved(StockReserved),
    ReservationReleased(ReservationReleased),
    LowStock(LowStock),
    AlertTriggered(AlertTriggered),
    InventoryAllocated(InventoryAllocated),
    BatchAllocationCompleted(BatchAllocationCompleted),
    TriggerReplenishment(TriggerReplenishment),
}

impl Event for DomainEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::StockReserved(_) => "inventory.stock.reserved",
            DomainEvent::ReservationReleased(_) => "inventory.reservation.released",
            DomainEvent::LowStock(_) => "inventory.stock.low",
            DomainEvent::AlertTriggered(_) => "inventory.alert.triggered",
            DomainEvent::InventoryAllocated(_) => "integration.inventory.allocated",
            DomainEvent::BatchAllocationCompleted(_) => "integration.batch_allocation.completed",
            DomainEvent::TriggerReplenishment(_) => "integration.replenishment.triggered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::StockReserved(e) => e.occurred_at,
            DomainEvent::ReservationReleased(e) => e.occurred_at,
            DomainEvent::LowStock(e) => e.occurred_at,
            DomainEvent::AlertTriggered(e) => e.occurred_at,
            DomainEvent::InventoryAllocated(e) => e.occurred_at,
            DomainEvent::BatchAllocationCompleted(e) => e.occurred_at,
            DomainEvent::TriggerReplenishment(e) => e.occurred_at,
        }
    }
}
