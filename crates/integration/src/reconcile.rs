//! Self-healing jobs: expired-hold cleanup and order/reservation
//! reconciliation.
//!
//! Both run collect-errors-continue: one failing reservation never blocks
//! the rest of the sweep, and a summary is always produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use agroerp_core::{DomainError, OrderId, ReservationId};
use agroerp_events::{DomainEvent, EventBus};
use agroerp_orders::{Notification, Notifier, Order, OrderDirectory, Report, TransitFeed};
use agroerp_stock::ReferenceType;

use crate::service::OrderInventoryService;

/// Result of one expired-reservation cleanup sweep.
#[derive(Debug, Default)]
pub struct CleanupSummary {
    pub released: Vec<ReservationId>,
    pub failures: Vec<(ReservationId, DomainError)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// The referenced order no longer exists.
    OrphanReservation,
    /// The referenced order is cancelled or otherwise terminal.
    CancelledOrderReservation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    Released,
    ReleaseFailed,
}

/// One drift repair attempted by the reconciliation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub reservation_id: ReservationId,
    pub order_id: Option<OrderId>,
    pub action: RepairAction,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Active order-backed reservations examined.
    pub checked: usize,
    pub discrepancies: Vec<Discrepancy>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

impl<B, O, N, T> OrderInventoryService<B, O, N, T>
where
    B: EventBus<DomainEvent>,
    O: OrderDirectory,
    N: Notifier,
    T: TransitFeed,
{
    /// Release every expired hold and notify the originating order.
    pub fn cleanup_expired_reservations(&self, now: DateTime<Utc>) -> CleanupSummary {
        let mut summary = CleanupSummary::default();

        for reservation in self.ledger.find_expired_reservations(now) {
            match self.ledger.release_reservation(reservation.id, now) {
                Ok(released) => {
                    if released.reference.reference_type == ReferenceType::Order {
                        self.notifier.send(Notification::ReservationExpired {
                            reservation_id: released.id,
                            reference_no: released.reference.reference_no.clone(),
                            item_id: released.item_id,
                            quantity: released.quantity,
                        });
                    }
                    summary.released.push(reservation.id);
                }
                // Strict release policy: a hold already released elsewhere
                // surfaces here as a skip, not a job failure.
                Err(err) => summary.failures.push((reservation.id, err)),
            }
        }

        tracing::info!(
            released = summary.released.len(),
            failed = summary.failures.len(),
            "expired reservation cleanup finished"
        );
        self.metrics
            .add_to_counter("integration.reservations_cleaned", summary.released.len() as u64);
        summary
    }

    /// Audit active reservations against the orders that created them,
    /// releasing any hold whose order is gone or terminal.
    pub fn reconcile_inventory_and_orders(&self, now: DateTime<Utc>) -> ReconciliationReport {
        let order_backed: Vec<_> = self
            .ledger
            .active_reservations()
            .into_iter()
            .filter(|r| r.reference.reference_type == ReferenceType::Order)
            .collect();

        let order_ids: Vec<OrderId> = order_backed
            .iter()
            .filter_map(|r| r.reference.reference_no.parse().ok())
            .collect();
        let orders = self.orders.get_orders_by_ids(&order_ids);

        let mut discrepancies = Vec::new();
        for reservation in &order_backed {
            let parsed: Option<OrderId> = reservation.reference.reference_no.parse().ok();
            let order: Option<&Order> =
                parsed.and_then(|id| orders.iter().find(|o| o.id == id));

            let kind = match order {
                None => DiscrepancyKind::OrphanReservation,
                Some(order) if order.status.is_terminal() => {
                    DiscrepancyKind::CancelledOrderReservation
                }
                Some(_) => continue,
            };

            let (action, error) = match self.ledger.release_reservation(reservation.id, now) {
                Ok(_) => (RepairAction::Released, None),
                Err(err) => (RepairAction::ReleaseFailed, Some(err.to_string())),
            };
            discrepancies.push(Discrepancy {
                kind,
                reservation_id: reservation.id,
                order_id: parsed,
                action,
                error,
            });
        }

        let report = ReconciliationReport {
            checked: order_backed.len(),
            discrepancies,
        };

        if !report.is_clean() {
            self.notifier.send_report(Report {
                kind: "inventory_reconciliation".to_string(),
                body: serde_json::to_value(&report).unwrap_or_else(|_| json!({})),
            });
        }
        self.metrics.record_histogram(
            "reconciliation.discrepancies",
            report.discrepancies.len() as f64,
        );
        tracing::info!(
            checked = report.checked,
            discrepancies = report.discrepancies.len(),
            "reconciliation completed"
        );
        report
    }
}
