//! Order lifecycle hooks and planning queries.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use agroerp_core::{DomainError, ItemId, OrderId, ReservationId, WarehouseId};
use agroerp_events::{DomainEvent, EventBus, InventoryAllocated};
use agroerp_observability::MetricsRegistry;
use agroerp_orders::{Alert, Notifier, OrderDirectory, OrderStatus, TransitFeed};
use agroerp_stock::{Reference, ReferenceType, StockKey, StockLedger};

/// Integration-level failure.
///
/// `PartialRelease` carries the collect-and-continue result of a release
/// sweep: the holds that did come off stayed off; the failures are listed.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("allocation rolled back for order {order_id}: {source}")]
    AllocationFailed {
        order_id: OrderId,
        source: DomainError,
    },

    #[error("released {released} reservations, {failed} failed", failed = .failures.len())]
    PartialRelease {
        released: usize,
        failures: Vec<(ReservationId, DomainError)>,
    },
}

/// Planning figure combining the stock ledger with collaborator feeds.
///
/// Distinct from the ledger's own `available`: this one nets out incoming
/// transfers and open unconfirmed demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableInventory {
    pub physical: i64,
    pub available: i64,
    pub reserved: i64,
    pub in_transit: i64,
    pub pending_orders: i64,
}

/// One demand line to check for feasibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeasibilityRequest {
    pub item_id: ItemId,
    pub warehouse_id: Option<WarehouseId>,
    pub quantity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentType {
    Stock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    PartialFulfillment,
    Backorder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeasibleLine {
    pub item_id: ItemId,
    pub quantity: i64,
    pub available: i64,
    pub fulfillment_type: FulfillmentType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfeasibleLine {
    pub item_id: ItemId,
    pub quantity: i64,
    pub available: i64,
    pub shortage: i64,
    pub suggested_action: SuggestedAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeasibilityReport {
    pub is_feasible: bool,
    pub feasible: Vec<FeasibleLine>,
    pub infeasible: Vec<InfeasibleLine>,
}

/// Orchestrates order lifecycle events against the stock ledger.
pub struct OrderInventoryService<B, O, N, T>
where
    B: EventBus<DomainEvent>,
    O: OrderDirectory,
    N: Notifier,
    T: TransitFeed,
{
    pub(crate) ledger: Arc<StockLedger<B>>,
    pub(crate) orders: O,
    pub(crate) notifier: N,
    pub(crate) transit: T,
    pub(crate) bus: B,
    pub(crate) metrics: Arc<MetricsRegistry>,
}

impl<B, O, N, T> OrderInventoryService<B, O, N, T>
where
    B: EventBus<DomainEvent>,
    O: OrderDirectory,
    N: Notifier,
    T: TransitFeed,
{
    pub fn new(
        ledger: Arc<StockLedger<B>>,
        orders: O,
        notifier: N,
        transit: T,
        bus: B,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            ledger,
            orders,
            notifier,
            transit,
            bus,
            metrics,
        }
    }

    pub fn ledger(&self) -> &StockLedger<B> {
        &self.ledger
    }

    /// React to an order status transition.
    ///
    /// - → `Confirmed`: reserve every line; one failing line rolls the
    ///   whole allocation back (created holds are released again) and an
    ///   alert is raised.
    /// - → `Cancelled`: release every hold referencing the order,
    ///   collect-and-continue.
    /// - → `Completed`: release the order's holds, then deduct each line.
    pub fn handle_order_status_change(
        &self,
        order_id: OrderId,
        old_status: OrderStatus,
        new_status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), IntegrationError> {
        let result = match (old_status, new_status) {
            (OrderStatus::Pending, OrderStatus::Confirmed) => {
                self.allocate_for_order(order_id, now)
            }
            (_, OrderStatus::Cancelled) => self.release_for_order(order_id, now),
            (_, OrderStatus::Completed) => self.fulfill_order(order_id, now),
            _ => Ok(()),
        };

        self.metrics.increment_counter("integration.order_status_change");
        if let Err(err) = &result {
            tracing::error!(
                order_id = %order_id,
                from = ?old_status,
                to = ?new_status,
                %err,
                "order-inventory integration failed"
            );
        }
        result
    }

    /// Planning availability for an item, optionally narrowed to one
    /// warehouse.
    pub fn get_available_inventory(
        &self,
        item_id: ItemId,
        warehouse_id: Option<WarehouseId>,
        consider_reservations: bool,
    ) -> AvailableInventory {
        let records = match warehouse_id {
            Some(warehouse_id) => self
                .ledger
                .record(StockKey::new(item_id, warehouse_id))
                .into_iter()
                .collect(),
            None => self.ledger.records_for_item(item_id),
        };

        let physical: i64 = records.iter().map(|r| r.on_hand).sum();
        let reserved: i64 = records.iter().map(|r| r.reserved).sum();
        let in_transit: i64 = records
            .iter()
            .map(|r| self.transit.in_transit_quantity(item_id, r.key.warehouse_id))
            .sum();
        let pending_orders: i64 = records
            .iter()
            .map(|r| self.orders.pending_order_quantity(item_id, r.key.warehouse_id))
            .sum();

        let available = if consider_reservations {
            (physical - reserved + in_transit - pending_orders).max(0)
        } else {
            physical
        };

        AvailableInventory {
            physical,
            available,
            reserved,
            in_transit,
            pending_orders,
        }
    }

    /// Partition demand lines into feasible and infeasible, with a
    /// fulfillment suggestion per infeasible line.
    pub fn check_order_feasibility(&self, lines: &[FeasibilityRequest]) -> FeasibilityReport {
        let mut feasible = Vec::new();
        let mut infeasible = Vec::new();

        for line in lines {
            let availability =
                self.get_available_inventory(line.item_id, line.warehouse_id, true);
            if availability.available >= line.quantity {
                feasible.push(FeasibleLine {
                    item_id: line.item_id,
                    quantity: line.quantity,
                    available: availability.available,
                    fulfillment_type: FulfillmentType::Stock,
                });
            } else {
                let suggested_action = if availability.available > 0 {
                    SuggestedAction::PartialFulfillment
                } else {
                    SuggestedAction::Backorder
                };
                infeasible.push(InfeasibleLine {
                    item_id: line.item_id,
                    quantity: line.quantity,
                    available: availability.available,
                    shortage: line.quantity - availability.available,
                    suggested_action,
                });
            }
        }

        FeasibilityReport {
            is_feasible: infeasible.is_empty(),
            feasible,
            infeasible,
        }
    }

    fn allocate_for_order(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<(), IntegrationError> {
        let order = self.orders.get_order_detail(order_id)?;
        let expires_at = order.delivery_date.map(|d| d + Duration::days(1));

        let mut created: Vec<ReservationId> = Vec::new();
        for line in &order.items {
            let key = StockKey::new(line.item_id, order.warehouse_id);
            match self.ledger.reserve_stock(
                key,
                line.quantity,
                Reference::order(order_id),
                expires_at,
                now,
            ) {
                Ok(reservation) => created.push(reservation.id),
                Err(source) => {
                    // Roll back: no partial reservations persist.
                    for id in created {
                        if let Err(release_err) = self.ledger.release_reservation(id, now) {
                            tracing::warn!(
                                reservation_id = %id,
                                ?release_err,
                                "rollback release failed"
                            );
                        }
                    }
                    self.notifier.send_alert(Alert {
                        severity: "high".to_string(),
                        message: format!("order allocation failed for {order_id}: {source}"),
                    });
                    self.metrics.increment_counter("integration.allocation_failed");
                    return Err(IntegrationError::AllocationFailed { order_id, source });
                }
            }
        }

        self.metrics.increment_counter("integration.allocation_succeeded");
        self.publish(DomainEvent::InventoryAllocated(InventoryAllocated {
            order_id,
            occurred_at: now,
        }));
        Ok(())
    }

    fn release_for_order(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<(), IntegrationError> {
        let reservations = self
            .ledger
            .reservations_by_reference(ReferenceType::Order, &order_id.to_string());

        let mut released = 0usize;
        let mut failures = Vec::new();
        for reservation in reservations {
            match self.ledger.release_reservation(reservation.id, now) {
                Ok(_) => released += 1,
                Err(err) => failures.push((reservation.id, err)),
            }
        }

        tracing::info!(order_id = %order_id, released, failed = failures.len(), "order holds released");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(IntegrationError::PartialRelease { released, failures })
        }
    }

    fn fulfill_order(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<(), IntegrationError> {
        let order = self.orders.get_order_detail(order_id)?;

        // Release the holds first so the deduction never drives the derived
        // availability negative.
        match self.release_for_order(order_id, now) {
            Ok(()) => {}
            Err(IntegrationError::PartialRelease { released, failures }) => {
                tracing::warn!(
                    order_id = %order_id,
                    released,
                    failed = failures.len(),
                    "some holds could not be released before fulfillment"
                );
            }
            Err(err) => return Err(err),
        }

        for line in &order.items {
            let key = StockKey::new(line.item_id, order.warehouse_id);
            self.ledger.deduct_stock(
                key,
                line.quantity,
                Reference::order(order_id),
                "order fulfillment",
                now,
            )?;
        }
        Ok(())
    }

    pub(crate) fn publish(&self, event: DomainEvent) {
        if let Err(err) = self.bus.publish(event) {
            tracing::warn!(?err, "failed to publish domain event");
        }
    }
}
