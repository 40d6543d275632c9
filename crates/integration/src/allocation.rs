//! Batch allocation: multiple orders against one shared stock pool.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agroerp_core::{ItemId, OrderId, ReservationId};
use agroerp_events::{BatchAllocationCompleted, DomainEvent, EventBus};
use agroerp_orders::{Notifier, Order, OrderDirectory, TransitFeed};
use agroerp_stock::{Reference, StockKey};

use crate::service::{IntegrationError, OrderInventoryService};

/// Ordering policy deciding which orders receive scarce stock first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStrategy {
    /// Ascending order date: first ordered, first served.
    #[default]
    Fifo,
    /// Descending priority, order date as tiebreak.
    Priority,
    /// Smallest total demand first, so more orders complete.
    Fair,
}

impl AllocationStrategy {
    fn sort(self, orders: &mut [Order]) {
        match self {
            AllocationStrategy::Fifo => orders.sort_by_key(|o| o.order_date),
            AllocationStrategy::Priority => {
                orders.sort_by(|a, b| {
                    b.priority
                        .cmp(&a.priority)
                        .then(a.order_date.cmp(&b.order_date))
                });
            }
            AllocationStrategy::Fair => {
                orders.sort_by_key(|o| {
                    (
                        o.items.iter().map(|line| line.quantity).sum::<i64>(),
                        o.order_date,
                    )
                });
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    Full,
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedLine {
    pub item_id: ItemId,
    pub requested: i64,
    pub allocated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAllocation {
    pub order_id: OrderId,
    pub status: AllocationStatus,
    pub lines: Vec<AllocatedLine>,
    #[serde(skip)]
    pub reservations: Vec<ReservationId>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationReport {
    pub outcomes: Vec<OrderAllocation>,
}

impl AllocationReport {
    pub fn with_status(&self, status: AllocationStatus) -> Vec<&OrderAllocation> {
        self.outcomes.iter().filter(|o| o.status == status).collect()
    }

    fn tally(&self, status: AllocationStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

impl<B, O, N, T> OrderInventoryService<B, O, N, T>
where
    B: EventBus<DomainEvent>,
    O: OrderDirectory,
    N: Notifier,
    T: TransitFeed,
{
    /// Allocate stock to multiple orders from one shared in-memory pool.
    ///
    /// The pool is snapshotted once and decremented sequentially in
    /// strategy order, which keeps the run fair within this call; the
    /// commit phase then reserves every allocated line. A commit failure
    /// (concurrent drift) rolls the entire batch back — no partial commits
    /// across orders.
    pub fn batch_allocate_inventory(
        &self,
        order_ids: &[OrderId],
        strategy: AllocationStrategy,
        now: DateTime<Utc>,
    ) -> Result<AllocationReport, IntegrationError> {
        let mut orders = self.orders.get_orders_by_ids(order_ids);
        strategy.sort(&mut orders);

        let mut missing: Vec<OrderId> = order_ids
            .iter()
            .filter(|id| orders.iter().all(|o| o.id != **id))
            .copied()
            .collect();

        // Shared snapshot pool of available stock.
        let mut pool: HashMap<StockKey, i64> = HashMap::new();
        for order in &orders {
            for line in &order.items {
                let key = StockKey::new(line.item_id, order.warehouse_id);
                pool.entry(key)
                    .or_insert_with(|| self.ledger.record(key).map(|r| r.available()).unwrap_or(0));
            }
        }

        // Plan phase: sequential decrement against the shared pool.
        let mut outcomes = Vec::with_capacity(orders.len());
        for order in &orders {
            let mut lines = Vec::with_capacity(order.items.len());
            let mut fully = true;
            let mut any = false;
            for line in &order.items {
                let key = StockKey::new(line.item_id, order.warehouse_id);
                let free = pool.entry(key).or_insert(0);
                let allocated = line.quantity.min(*free).max(0);
                *free -= allocated;
                fully &= allocated == line.quantity;
                any |= allocated > 0;
                lines.push(AllocatedLine {
                    item_id: line.item_id,
                    requested: line.quantity,
                    allocated,
                });
            }

            let status = if fully {
                AllocationStatus::Full
            } else if any {
                AllocationStatus::Partial
            } else {
                AllocationStatus::Failed
            };
            outcomes.push(OrderAllocation {
                order_id: order.id,
                status,
                lines,
                reservations: Vec::new(),
                reason: (status == AllocationStatus::Failed)
                    .then(|| "insufficient inventory".to_string()),
            });
        }

        // Commit phase: reserve every allocated line, rolling the whole
        // batch back on any failure.
        let mut committed: Vec<ReservationId> = Vec::new();
        for (outcome, order) in outcomes.iter_mut().zip(&orders) {
            for line in &outcome.lines {
                if line.allocated == 0 {
                    continue;
                }
                let key = StockKey::new(line.item_id, order.warehouse_id);
                match self.ledger.reserve_stock(
                    key,
                    line.allocated,
                    Reference::order(order.id),
                    None,
                    now,
                ) {
                    Ok(reservation) => {
                        committed.push(reservation.id);
                        outcome.reservations.push(reservation.id);
                    }
                    Err(source) => {
                        for id in committed {
                            if let Err(release_err) = self.ledger.release_reservation(id, now) {
                                tracing::warn!(
                                    reservation_id = %id,
                                    ?release_err,
                                    "batch allocation rollback release failed"
                                );
                            }
                        }
                        self.metrics
                            .increment_counter("integration.batch_allocation_rolled_back");
                        return Err(IntegrationError::AllocationFailed {
                            order_id: outcome.order_id,
                            source,
                        });
                    }
                }
            }
        }

        for order_id in missing.drain(..) {
            outcomes.push(OrderAllocation {
                order_id,
                status: AllocationStatus::Failed,
                lines: Vec::new(),
                reservations: Vec::new(),
                reason: Some("order not found".to_string()),
            });
        }

        let report = AllocationReport { outcomes };
        let (allocated, partial, failed) = (
            report.tally(AllocationStatus::Full),
            report.tally(AllocationStatus::Partial),
            report.tally(AllocationStatus::Failed),
        );
        tracing::info!(allocated, partial, failed, "batch allocation completed");
        self.metrics.increment_counter("integration.batch_allocation_runs");
        self.publish(DomainEvent::BatchAllocationCompleted(
            BatchAllocationCompleted {
                allocated,
                partial,
                failed,
                occurred_at: now,
            },
        ));

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    use agroerp_core::WarehouseId;
    use agroerp_orders::{OrderItem, OrderStatus};

    fn order(date: DateTime<Utc>, priority: u8, quantity: i64) -> Order {
        Order {
            id: OrderId::new(),
            status: OrderStatus::Pending,
            warehouse_id: WarehouseId::new(),
            order_date: date,
            delivery_date: None,
            priority,
            items: vec![OrderItem {
                item_id: ItemId::new(),
                quantity,
            }],
        }
    }

    #[test]
    fn fifo_sorts_by_ascending_order_date() {
        let now = Utc::now();
        let older = order(now - Duration::days(2), 0, 10);
        let newer = order(now, 0, 10);
        let mut orders = vec![newer.clone(), older.clone()];

        AllocationStrategy::Fifo.sort(&mut orders);
        assert_eq!(orders[0].id, older.id);
        assert_eq!(orders[1].id, newer.id);
    }

    #[test]
    fn priority_sorts_high_priority_first_with_date_tiebreak() {
        let now = Utc::now();
        let urgent = order(now, 9, 10);
        let early_normal = order(now - Duration::days(3), 1, 10);
        let late_normal = order(now, 1, 10);
        let mut orders = vec![late_normal.clone(), urgent.clone(), early_normal.clone()];

        AllocationStrategy::Priority.sort(&mut orders);
        assert_eq!(orders[0].id, urgent.id);
        assert_eq!(orders[1].id, early_normal.id);
        assert_eq!(orders[2].id, late_normal.id);
    }

    #[test]
    fn fair_sorts_smallest_demand_first() {
        let now = Utc::now();
        let big = order(now - Duration::days(1), 0, 100);
        let small = order(now, 0, 5);
        let mut orders = vec![big.clone(), small.clone()];

        AllocationStrategy::Fair.sort(&mut orders);
        assert_eq!(orders[0].id, small.id);
    }
}
