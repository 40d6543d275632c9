//! Append-only audit log of stock mutations.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agroerp_core::{ItemId, WarehouseId};

use crate::reservation::Reference;

/// Classification of a stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Inbound,
    Outbound,
    Internal,
    Reserve,
    Release,
    Adjustment,
    Transfer,
}

/// A movement not yet committed to the log (no sequence assigned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub movement_type: MovementType,
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    /// Signed: outbound quantities are negative.
    pub quantity: i64,
    pub from: Option<WarehouseId>,
    pub to: Option<WarehouseId>,
    pub reference: Option<Reference>,
    pub reason: Option<String>,
    /// On-hand balance of the row after the mutation committed.
    pub balance_after: i64,
    pub performed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// A committed movement. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Monotonically increasing position in the log, assigned on append.
    pub sequence: u64,
    pub movement_type: MovementType,
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub from: Option<WarehouseId>,
    pub to: Option<WarehouseId>,
    pub reference: Option<Reference>,
    pub reason: Option<String>,
    pub balance_after: i64,
    pub performed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Append-only movement recorder.
///
/// The only write path is `append`; there is deliberately no update or
/// removal API.
#[derive(Debug, Default)]
pub struct MovementLog {
    entries: Mutex<Vec<Movement>>,
}

impl MovementLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a movement, assigning the next sequence number.
    pub fn append(&self, movement: NewMovement) -> u64 {
        let Ok(mut entries) = self.entries.lock() else {
            // A poisoned audit log cannot accept writes; the sequence 0
            // sentinel is never handed out on the success path.
            return 0;
        };
        let sequence = entries.len() as u64 + 1;
        entries.push(Movement {
            sequence,
            movement_type: movement.movement_type,
            item_id: movement.item_id,
            warehouse_id: movement.warehouse_id,
            quantity: movement.quantity,
            from: movement.from,
            to: movement.to,
            reference: movement.reference,
            reason: movement.reason,
            balance_after: movement.balance_after,
            performed_by: movement.performed_by,
            occurred_at: movement.occurred_at,
        });
        sequence
    }

    /// Snapshot of the full log, in append order.
    pub fn entries(&self) -> Vec<Movement> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Snapshot of movements touching one (item, warehouse) key.
    pub fn entries_for(&self, item_id: ItemId, warehouse_id: WarehouseId) -> Vec<Movement> {
        self.entries()
            .into_iter()
            .filter(|m| m.item_id == item_id && m.warehouse_id == warehouse_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(item_id: ItemId, warehouse_id: WarehouseId, quantity: i64) -> NewMovement {
        NewMovement {
            movement_type: MovementType::Inbound,
            item_id,
            warehouse_id,
            quantity,
            from: None,
            to: None,
            reference: None,
            reason: None,
            balance_after: quantity,
            performed_by: "system".to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn sequences_are_monotonic_from_one() {
        let log = MovementLog::new();
        let item_id = ItemId::new();
        let warehouse_id = WarehouseId::new();

        assert_eq!(log.append(draft(item_id, warehouse_id, 5)), 1);
        assert_eq!(log.append(draft(item_id, warehouse_id, 3)), 2);

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[test]
    fn entries_for_filters_by_key() {
        let log = MovementLog::new();
        let item_id = ItemId::new();
        let warehouse_a = WarehouseId::new();
        let warehouse_b = WarehouseId::new();

        log.append(draft(item_id, warehouse_a, 5));
        log.append(draft(item_id, warehouse_b, 7));

        assert_eq!(log.entries_for(item_id, warehouse_a).len(), 1);
        assert_eq!(log.entries_for(item_id, warehouse_b).len(), 1);
    }
}
