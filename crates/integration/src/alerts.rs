//! Alert bridge: cascades low-stock and expiry conditions to the orders
//! and people that depend on the affected stock.

use chrono::{DateTime, Utc};

use agroerp_batch::BatchRegistry;
use agroerp_core::{ItemId, OrderId, WarehouseId};
use agroerp_events::{
    AlertSeverity, AlertTriggered, DomainEvent, EventBus, TriggerReplenishment,
};
use agroerp_orders::{Alert, Notification, Notifier, OrderDirectory, TransitFeed};
use agroerp_stock::StockKey;

use crate::service::OrderInventoryService;

/// What a low-stock condition touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowStockImpact {
    pub affected_orders: Vec<OrderId>,
    pub suggested_replenishment: i64,
}

impl<B, O, N, T> OrderInventoryService<B, O, N, T>
where
    B: EventBus<DomainEvent>,
    O: OrderDirectory,
    N: Notifier,
    T: TransitFeed,
{
    /// React to a low-stock condition: find orders whose demand for the
    /// item exceeds what is left, notify stakeholders, bump those orders'
    /// priority, and signal replenishment to purchasing.
    pub fn handle_low_stock(
        &self,
        item_id: ItemId,
        warehouse_id: WarehouseId,
        current_qty: i64,
        now: DateTime<Utc>,
    ) -> LowStockImpact {
        let affected: Vec<_> = self
            .orders
            .open_orders_for_item(item_id)
            .into_iter()
            .filter(|order| order.demand_for(item_id) > current_qty)
            .collect();

        if !affected.is_empty() {
            self.notifier.send_alert(Alert {
                severity: "high".to_string(),
                message: format!(
                    "low stock on {item_id}: {} open orders exceed remaining quantity {current_qty}",
                    affected.len()
                ),
            });
            for order in &affected {
                self.notifier.send(Notification::OrderAtRisk {
                    reference_no: order.id.to_string(),
                    item_id,
                    shortage: order.demand_for(item_id) - current_qty,
                });
                if let Err(err) = self.orders.raise_priority(order.id) {
                    tracing::warn!(order_id = %order.id, ?err, "could not raise order priority");
                }
            }
            self.publish(DomainEvent::AlertTriggered(AlertTriggered {
                source: "low_stock".to_string(),
                severity: AlertSeverity::Critical,
                message: format!("{} orders at risk for item {item_id}", affected.len()),
                occurred_at: now,
            }));
        }

        let suggested_replenishment = self
            .ledger
            .record(StockKey::new(item_id, warehouse_id))
            .map(|record| (record.max_stock - current_qty).max(0))
            .unwrap_or(0);

        self.publish(DomainEvent::TriggerReplenishment(TriggerReplenishment {
            item_id,
            warehouse_id,
            current_qty,
            suggested_qty: suggested_replenishment,
            occurred_at: now,
        }));
        self.metrics.increment_counter("integration.low_stock_handled");

        LowStockImpact {
            affected_orders: affected.iter().map(|o| o.id).collect(),
            suggested_replenishment,
        }
    }

    /// Run the registry expiry sweep and raise an alert per expired lot.
    pub fn raise_expiry_alerts(
        &self,
        registry: &BatchRegistry,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let expired = registry.check_expiry(now);

        for batch_no in &expired {
            self.notifier.send_alert(Alert {
                severity: "warning".to_string(),
                message: format!("batch {batch_no} expired"),
            });
            self.publish(DomainEvent::AlertTriggered(AlertTriggered {
                source: "batch_expiry".to_string(),
                severity: AlertSeverity::Warning,
                message: format!("batch {batch_no} auto-expired"),
                occurred_at: now,
            }));
        }

        if !expired.is_empty() {
            tracing::warn!(count = expired.len(), "batches auto-expired");
        }
        expired
    }
}
