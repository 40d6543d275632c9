//! Notification sink contract.
//!
//! Notifications are fire-and-forget: a failing sink is logged and never
//! propagated to the operation that produced the message.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use agroerp_core::{ItemId, ReservationId};

/// Routine notification to an interested party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    ReservationExpired {
        reservation_id: ReservationId,
        reference_no: String,
        item_id: ItemId,
        quantity: i64,
    },
    OrderAtRisk {
        reference_no: String,
        item_id: ItemId,
        shortage: i64,
    },
}

/// Urgent alert for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: String,
    pub message: String,
}

/// Periodic report (reconciliation summaries and the like).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub kind: String,
    pub body: JsonValue,
}

pub trait Notifier: Send + Sync {
    fn send(&self, notification: Notification);

    fn send_alert(&self, alert: Alert);

    fn send_report(&self, report: Report);
}

impl<N> Notifier for std::sync::Arc<N>
where
    N: Notifier + ?Sized,
{
    fn send(&self, notification: Notification) {
        (**self).send(notification);
    }

    fn send_alert(&self, alert: Alert) {
        (**self).send_alert(alert);
    }

    fn send_report(&self, report: Report) {
        (**self).send_report(report);
    }
}

/// Notifier that writes everything to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: Notification) {
        tracing::info!(?notification, "notification sent");
    }

    fn send_alert(&self, alert: Alert) {
        tracing::warn!(severity = %alert.severity, message = %alert.message, "alert sent");
    }

    fn send_report(&self, report: Report) {
        tracing::info!(kind = %report.kind, "report sent");
    }
}

/// Notifier that records everything for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
    alerts: Mutex<Vec<Alert>>,
    reports: Mutex<Vec<Report>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notification: Notification) {
        if let Ok(mut n) = self.notifications.lock() {
            n.push(notification);
        }
    }

    fn send_alert(&self, alert: Alert) {
        if let Ok(mut a) = self.alerts.lock() {
            a.push(alert);
        }
    }

    fn send_report(&self, report: Report) {
        if let Ok(mut r) = self.reports.lock() {
            r.push(report);
        }
    }
}
