//! The stock ledger: keyed arena of stock rows with exclusive row locking.
//!
//! Every mutation follows the same shape: lock the (item, warehouse) row,
//! validate, mutate, append the audit movement, then release the lock —
//! the whole critical section commits or nothing does. Concurrent writers
//! on the same key serialize on the row lock; disjoint keys do not contend.
//! Domain events are published after the lock is dropped and are
//! best-effort: a publish failure is logged, never propagated.
//!
//! Lock order is fixed — row mutex, then reservation index, then the
//! movement log; multi-row operations lock rows in key order — so the
//! ledger cannot deadlock against itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};

use agroerp_core::{DomainError, DomainResult, ItemId, ReservationId, WarehouseId};
use agroerp_events::{
    DomainEvent, EventBus, LowStock, ReservationReleased, StockReserved,
};

use crate::movement::{Movement, MovementLog, MovementType, NewMovement};
use crate::record::{StockKey, StockRecord};
use crate::reservation::{Reference, ReferenceType, Reservation};

const SYSTEM_ACTOR: &str = "system";

/// One line of a `check_availability` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityRequest {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

/// Another warehouse holding free stock of the requested item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlternativeStock {
    pub warehouse_id: WarehouseId,
    pub available: i64,
}

/// Availability answer for one request line.
///
/// Read-only and unlocked: the answer may be stale the moment it is
/// produced and is **not** a reservation guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityCheck {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub requested: i64,
    pub available_qty: i64,
    pub is_available: bool,
    pub shortage: i64,
    /// Earliest active reservation expiry for the key, when short — the
    /// soonest moment stock could free up without a receipt.
    pub next_available_date: Option<DateTime<Utc>>,
    pub alternatives: Vec<AlternativeStock>,
}

/// Aggregate stock ledger with reservation management and audit trail.
pub struct StockLedger<B: EventBus<DomainEvent>> {
    rows: RwLock<HashMap<StockKey, Arc<Mutex<StockRecord>>>>,
    reservations: RwLock<HashMap<ReservationId, Reservation>>,
    movements: MovementLog,
    bus: B,
}

impl<B: EventBus<DomainEvent>> StockLedger<B> {
    pub fn new(bus: B) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            reservations: RwLock::new(HashMap::new()),
            movements: MovementLog::new(),
            bus,
        }
    }

    /// Seed or replace a stock row (item master sync, opening balances).
    pub fn register(&self, record: StockRecord) {
        if let Ok(mut rows) = self.rows.write() {
            rows.insert(record.key, Arc::new(Mutex::new(record)));
        }
    }

    /// Snapshot of one row, if present.
    pub fn record(&self, key: StockKey) -> Option<StockRecord> {
        let row = self.row(key)?;
        let guard = row.lock().ok()?;
        Some(guard.clone())
    }

    /// Snapshots of every row holding the item, across warehouses.
    pub fn records_for_item(&self, item_id: ItemId) -> Vec<StockRecord> {
        let Ok(rows) = self.rows.read() else {
            return Vec::new();
        };
        let handles: Vec<_> = rows
            .iter()
            .filter(|(key, _)| key.item_id == item_id)
            .map(|(_, row)| Arc::clone(row))
            .collect();
        drop(rows);

        handles
            .iter()
            .filter_map(|row| row.lock().ok().map(|guard| guard.clone()))
            .collect()
    }

    /// Full movement log snapshot, in append order.
    pub fn movements(&self) -> Vec<Movement> {
        self.movements.entries()
    }

    /// Movements touching one key.
    pub fn movements_for(&self, key: StockKey) -> Vec<Movement> {
        self.movements.entries_for(key.item_id, key.warehouse_id)
    }

    /// Reserve available stock against a reference document.
    ///
    /// Holds the row lock for the full check-mutate-log section, so two
    /// contenders whose combined quantity exceeds availability can never
    /// both succeed.
    pub fn reserve_stock(
        &self,
        key: StockKey,
        quantity: i64,
        reference: Reference,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DomainResult<Reservation> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let row = self.row(key).ok_or(DomainError::ItemNotFoundInWarehouse)?;
        let mut record = lock_row(&row)?;

        let available = record.available();
        if available < quantity {
            return Err(DomainError::insufficient(quantity, available));
        }

        let reservation = Reservation::new(
            key.item_id,
            key.warehouse_id,
            quantity,
            reference.clone(),
            expires_at,
            now,
        );

        {
            let mut reservations = self
                .reservations
                .write()
                .map_err(|_| DomainError::conflict("reservation index lock poisoned"))?;

            record.reserved += quantity;
            record.last_movement_at = Some(now);
            reservations.insert(reservation.id, reservation.clone());
        }

        self.movements.append(NewMovement {
            movement_type: MovementType::Reserve,
            item_id: key.item_id,
            warehouse_id: key.warehouse_id,
            quantity,
            from: None,
            to: None,
            reference: Some(reference),
            reason: None,
            balance_after: record.on_hand,
            performed_by: SYSTEM_ACTOR.to_string(),
            occurred_at: now,
        });
        drop(record);

        tracing::info!(
            reservation_id = %reservation.id,
            item_id = %key.item_id,
            warehouse_id = %key.warehouse_id,
            quantity,
            "stock reserved"
        );
        self.publish(DomainEvent::StockReserved(StockReserved {
            reservation_id: reservation.id,
            item_id: key.item_id,
            warehouse_id: key.warehouse_id,
            quantity,
            occurred_at: now,
        }));

        Ok(reservation)
    }

    /// Release an active reservation, returning its quantity to available.
    ///
    /// Strict policy: releasing an unknown or non-active reservation is an
    /// error and leaves the row untouched.
    pub fn release_reservation(
        &self,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> DomainResult<Reservation> {
        let snapshot = self
            .reservation(id)
            .ok_or(DomainError::ReservationNotFound)?;
        if !snapshot.is_active() {
            return Err(DomainError::not_active(snapshot.status.as_str()));
        }

        let key = StockKey::new(snapshot.item_id, snapshot.warehouse_id);
        let row = self.row(key).ok_or(DomainError::ItemNotFoundInWarehouse)?;
        let mut record = lock_row(&row)?;

        let released = {
            let mut reservations = self
                .reservations
                .write()
                .map_err(|_| DomainError::conflict("reservation index lock poisoned"))?;
            let reservation = reservations
                .get_mut(&id)
                .ok_or(DomainError::ReservationNotFound)?;

            // Re-check under the row lock: a concurrent release may have won.
            if !reservation.is_active() {
                return Err(DomainError::not_active(reservation.status.as_str()));
            }

            reservation.mark_released(now);
            record.reserved = (record.reserved - reservation.quantity).max(0);
            record.last_movement_at = Some(now);
            reservation.clone()
        };

        self.movements.append(NewMovement {
            movement_type: MovementType::Release,
            item_id: key.item_id,
            warehouse_id: key.warehouse_id,
            quantity: released.quantity,
            from: None,
            to: None,
            reference: Some(released.reference.clone()),
            reason: None,
            balance_after: record.on_hand,
            performed_by: SYSTEM_ACTOR.to_string(),
            occurred_at: now,
        });
        drop(record);

        tracing::info!(reservation_id = %id, quantity = released.quantity, "reservation released");
        self.publish(DomainEvent::ReservationReleased(ReservationReleased {
            reservation_id: id,
            item_id: key.item_id,
            warehouse_id: key.warehouse_id,
            quantity: released.quantity,
            occurred_at: now,
        }));

        Ok(released)
    }

    /// Physically remove stock (fulfillment).
    ///
    /// Emits `LowStock` as a separate, non-transactional trigger after the
    /// mutation commits when on-hand reaches safety stock.
    pub fn deduct_stock(
        &self,
        key: StockKey,
        quantity: i64,
        reference: Reference,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let row = self.row(key).ok_or(DomainError::ItemNotFoundInWarehouse)?;
        let mut record = lock_row(&row)?;

        if record.on_hand < quantity {
            return Err(DomainError::insufficient(quantity, record.on_hand));
        }

        record.on_hand -= quantity;
        record.last_movement_at = Some(now);
        let low_stock = record.is_low_stock().then(|| LowStock {
            item_id: key.item_id,
            warehouse_id: key.warehouse_id,
            current_qty: record.on_hand,
            safety_stock: record.safety_stock,
            occurred_at: now,
        });

        self.movements.append(NewMovement {
            movement_type: MovementType::Outbound,
            item_id: key.item_id,
            warehouse_id: key.warehouse_id,
            quantity: -quantity,
            from: None,
            to: None,
            reference: Some(reference),
            reason: Some(reason.into()),
            balance_after: record.on_hand,
            performed_by: SYSTEM_ACTOR.to_string(),
            occurred_at: now,
        });
        drop(record);

        if let Some(event) = low_stock {
            tracing::warn!(
                item_id = %key.item_id,
                warehouse_id = %key.warehouse_id,
                current_qty = event.current_qty,
                "stock at or below safety level"
            );
            self.publish(DomainEvent::LowStock(event));
        }

        Ok(())
    }

    /// Receive stock inbound; creates a zeroed row on first receipt.
    pub fn receive_stock(
        &self,
        key: StockKey,
        quantity: i64,
        reference: Reference,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let row = self.row_or_create(key)?;
        let mut record = lock_row(&row)?;

        record.on_hand += quantity;
        record.last_movement_at = Some(now);

        self.movements.append(NewMovement {
            movement_type: MovementType::Inbound,
            item_id: key.item_id,
            warehouse_id: key.warehouse_id,
            quantity,
            from: None,
            to: None,
            reference: Some(reference),
            reason: None,
            balance_after: record.on_hand,
            performed_by: SYSTEM_ACTOR.to_string(),
            occurred_at: now,
        });

        Ok(())
    }

    /// Signed stock correction (cycle count, spoilage write-off).
    pub fn adjust_stock(
        &self,
        key: StockKey,
        delta: i64,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let row = self.row(key).ok_or(DomainError::ItemNotFoundInWarehouse)?;
        let mut record = lock_row(&row)?;

        if record.on_hand + delta < 0 {
            return Err(DomainError::invariant("adjustment would drive on-hand negative"));
        }
        if record.available() + delta < 0 {
            return Err(DomainError::invariant(
                "adjustment would drive available negative",
            ));
        }

        record.on_hand += delta;
        record.last_movement_at = Some(now);

        self.movements.append(NewMovement {
            movement_type: MovementType::Adjustment,
            item_id: key.item_id,
            warehouse_id: key.warehouse_id,
            quantity: delta,
            from: None,
            to: None,
            reference: Some(Reference::new(ReferenceType::Adjustment, "stock-adjustment")),
            reason: Some(reason.into()),
            balance_after: record.on_hand,
            performed_by: SYSTEM_ACTOR.to_string(),
            occurred_at: now,
        });

        Ok(())
    }

    /// Move unencumbered stock between warehouses.
    ///
    /// Locks both rows in key order so opposing transfers cannot deadlock.
    pub fn transfer_stock(
        &self,
        item_id: ItemId,
        from_warehouse: WarehouseId,
        to_warehouse: WarehouseId,
        quantity: i64,
        reference: Reference,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if from_warehouse == to_warehouse {
            return Err(DomainError::validation(
                "transfer source and destination must differ",
            ));
        }

        let from_key = StockKey::new(item_id, from_warehouse);
        let to_key = StockKey::new(item_id, to_warehouse);

        let from_row = self
            .row(from_key)
            .ok_or(DomainError::ItemNotFoundInWarehouse)?;
        let to_row = self.row_or_create(to_key)?;

        // Key-ordered acquisition.
        let (mut from_record, mut to_record) = if from_key < to_key {
            let from_guard = lock_row(&from_row)?;
            let to_guard = lock_row(&to_row)?;
            (from_guard, to_guard)
        } else {
            let to_guard = lock_row(&to_row)?;
            let from_guard = lock_row(&from_row)?;
            (from_guard, to_guard)
        };

        let available = from_record.available();
        if available < quantity {
            return Err(DomainError::insufficient(quantity, available));
        }

        from_record.on_hand -= quantity;
        from_record.last_movement_at = Some(now);
        to_record.on_hand += quantity;
        to_record.last_movement_at = Some(now);

        self.movements.append(NewMovement {
            movement_type: MovementType::Transfer,
            item_id,
            warehouse_id: from_warehouse,
            quantity: -quantity,
            from: Some(from_warehouse),
            to: Some(to_warehouse),
            reference: Some(reference.clone()),
            reason: None,
            balance_after: from_record.on_hand,
            performed_by: SYSTEM_ACTOR.to_string(),
            occurred_at: now,
        });
        self.movements.append(NewMovement {
            movement_type: MovementType::Transfer,
            item_id,
            warehouse_id: to_warehouse,
            quantity,
            from: Some(from_warehouse),
            to: Some(to_warehouse),
            reference: Some(reference),
            reason: None,
            balance_after: to_record.on_hand,
            performed_by: SYSTEM_ACTOR.to_string(),
            occurred_at: now,
        });

        Ok(())
    }

    /// Place a quality hold: moves quantity from available into `frozen`.
    pub fn freeze_stock(
        &self,
        key: StockKey,
        quantity: i64,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.internal_move(key, quantity, reason, now, |record, qty| {
            record.frozen += qty;
            Ok(())
        })
    }

    /// Lift a quality hold.
    pub fn unfreeze_stock(
        &self,
        key: StockKey,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let row = self.row(key).ok_or(DomainError::ItemNotFoundInWarehouse)?;
        let mut record = lock_row(&row)?;

        if record.frozen < quantity {
            return Err(DomainError::invariant("cannot unfreeze more than frozen"));
        }
        record.frozen -= quantity;
        record.last_movement_at = Some(now);

        self.movements.append(NewMovement {
            movement_type: MovementType::Internal,
            item_id: key.item_id,
            warehouse_id: key.warehouse_id,
            quantity,
            from: None,
            to: None,
            reference: None,
            reason: Some("unfreeze".to_string()),
            balance_after: record.on_hand,
            performed_by: SYSTEM_ACTOR.to_string(),
            occurred_at: now,
        });

        Ok(())
    }

    /// Write quantity down as damaged; it stays on hand but unavailable.
    pub fn mark_damaged(
        &self,
        key: StockKey,
        quantity: i64,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.internal_move(key, quantity, reason, now, |record, qty| {
            record.damaged += qty;
            Ok(())
        })
    }

    /// Read-only availability probe across request lines.
    ///
    /// Takes no lock across rows; results may be stale under concurrent
    /// writers and are not a reservation guarantee.
    pub fn check_availability(&self, requests: &[AvailabilityRequest]) -> Vec<AvailabilityCheck> {
        requests
            .iter()
            .map(|request| {
                let key = StockKey::new(request.item_id, request.warehouse_id);
                let available_qty = self.record(key).map(|r| r.available()).unwrap_or(0);
                let is_available = available_qty >= request.quantity;
                let shortage = (request.quantity - available_qty).max(0);

                let (next_available_date, alternatives) = if is_available {
                    (None, Vec::new())
                } else {
                    (
                        self.earliest_reservation_expiry(key),
                        self.alternative_warehouses(request.item_id, request.warehouse_id),
                    )
                };

                AvailabilityCheck {
                    item_id: request.item_id,
                    warehouse_id: request.warehouse_id,
                    requested: request.quantity,
                    available_qty,
                    is_available,
                    shortage,
                    next_available_date,
                    alternatives,
                }
            })
            .collect()
    }

    /// Active reservations whose expiry has passed; drives periodic cleanup.
    pub fn find_expired_reservations(&self, now: DateTime<Utc>) -> Vec<Reservation> {
        let Ok(reservations) = self.reservations.read() else {
            return Vec::new();
        };
        reservations
            .values()
            .filter(|r| r.is_expired(now))
            .cloned()
            .collect()
    }

    pub fn active_reservations(&self) -> Vec<Reservation> {
        let Ok(reservations) = self.reservations.read() else {
            return Vec::new();
        };
        reservations.values().filter(|r| r.is_active()).cloned().collect()
    }

    /// Active reservations referencing one document.
    pub fn reservations_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_no: &str,
    ) -> Vec<Reservation> {
        self.active_reservations()
            .into_iter()
            .filter(|r| {
                r.reference.reference_type == reference_type
                    && r.reference.reference_no == reference_no
            })
            .collect()
    }

    pub fn reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.reservations.read().ok()?.get(&id).cloned()
    }

    fn row(&self, key: StockKey) -> Option<Arc<Mutex<StockRecord>>> {
        self.rows.read().ok()?.get(&key).map(Arc::clone)
    }

    fn row_or_create(&self, key: StockKey) -> DomainResult<Arc<Mutex<StockRecord>>> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| DomainError::conflict("stock arena lock poisoned"))?;
        Ok(Arc::clone(
            rows.entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(StockRecord::new(key)))),
        ))
    }

    fn internal_move(
        &self,
        key: StockKey,
        quantity: i64,
        reason: impl Into<String>,
        now: DateTime<Utc>,
        apply: impl FnOnce(&mut StockRecord, i64) -> DomainResult<()>,
    ) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let row = self.row(key).ok_or(DomainError::ItemNotFoundInWarehouse)?;
        let mut record = lock_row(&row)?;

        let available = record.available();
        if available < quantity {
            return Err(DomainError::insufficient(quantity, available));
        }

        let reason = reason.into();
        apply(&mut record, quantity)?;
        record.last_movement_at = Some(now);

        self.movements.append(NewMovement {
            movement_type: MovementType::Internal,
            item_id: key.item_id,
            warehouse_id: key.warehouse_id,
            quantity,
            from: None,
            to: None,
            reference: None,
            reason: Some(reason),
            balance_after: record.on_hand,
            performed_by: SYSTEM_ACTOR.to_string(),
            occurred_at: now,
        });

        Ok(())
    }

    fn earliest_reservation_expiry(&self, key: StockKey) -> Option<DateTime<Utc>> {
        let reservations = self.reservations.read().ok()?;
        reservations
            .values()
            .filter(|r| {
                r.is_active() && r.item_id == key.item_id && r.warehouse_id == key.warehouse_id
            })
            .map(|r| r.expires_at)
            .min()
    }

    fn alternative_warehouses(
        &self,
        item_id: ItemId,
        excluding: WarehouseId,
    ) -> Vec<AlternativeStock> {
        let mut alternatives: Vec<_> = self
            .records_for_item(item_id)
            .into_iter()
            .filter(|r| r.key.warehouse_id != excluding && r.available() > 0)
            .map(|r| AlternativeStock {
                warehouse_id: r.key.warehouse_id,
                available: r.available(),
            })
            .collect();
        alternatives.sort_by(|a, b| b.available.cmp(&a.available));
        alternatives
    }

    fn publish(&self, event: DomainEvent) {
        if let Err(err) = self.bus.publish(event) {
            tracing::warn!(?err, "failed to publish domain event");
        }
    }
}

fn lock_row(row: &Arc<Mutex<StockRecord>>) -> DomainResult<MutexGuard<'_, StockRecord>> {
    row.lock()
        .map_err(|_| DomainError::conflict("stock row lock poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;

    use agroerp_core::OrderId;
    use agroerp_events::InMemoryEventBus;

    use crate::reservation::ReservationStatus;

    type TestLedger = StockLedger<Arc<InMemoryEventBus<DomainEvent>>>;

    fn ledger() -> (Arc<TestLedger>, Arc<InMemoryEventBus<DomainEvent>>) {
        let bus = Arc::new(InMemoryEventBus::new());
        (Arc::new(StockLedger::new(Arc::clone(&bus))), bus)
    }

    fn seeded_key(ledger: &TestLedger, on_hand: i64, safety_stock: i64) -> StockKey {
        let key = StockKey::new(ItemId::new(), WarehouseId::new());
        ledger.register(
            StockRecord::new(key)
                .with_on_hand(on_hand)
                .with_levels(safety_stock, safety_stock + 50, on_hand * 2),
        );
        key
    }

    fn order_reference() -> Reference {
        Reference::order(OrderId::new())
    }

    fn assert_invariant(record: &StockRecord) {
        assert_eq!(
            record.available(),
            record.on_hand - record.reserved - record.frozen - record.damaged
        );
        assert!(record.available() >= 0, "available went negative: {record:?}");
    }

    #[test]
    fn reserve_moves_exactly_quantity_from_available_to_reserved() {
        let (ledger, _bus) = ledger();
        let key = seeded_key(&ledger, 100, 0);
        let now = Utc::now();

        let before = ledger.record(key).unwrap();
        ledger
            .reserve_stock(key, 40, order_reference(), None, now)
            .unwrap();
        let after = ledger.record(key).unwrap();

        assert_eq!(after.reserved, before.reserved + 40);
        assert_eq!(after.available(), before.available() - 40);
        assert_invariant(&after);
    }

    #[test]
    fn release_is_the_exact_inverse_of_reserve() {
        let (ledger, _bus) = ledger();
        let key = seeded_key(&ledger, 100, 0);
        let now = Utc::now();

        let before = ledger.record(key).unwrap();
        let reservation = ledger
            .reserve_stock(key, 25, order_reference(), None, now)
            .unwrap();
        ledger.release_reservation(reservation.id, now).unwrap();
        let after = ledger.record(key).unwrap();

        assert_eq!(after.reserved, before.reserved);
        assert_eq!(after.available(), before.available());
        assert_invariant(&after);

        let released = ledger.reservation(reservation.id).unwrap();
        assert_eq!(released.status, ReservationStatus::Released);
        assert!(released.released_at.is_some());
    }

    #[test]
    fn second_release_fails_and_leaves_the_record_unchanged() {
        let (ledger, _bus) = ledger();
        let key = seeded_key(&ledger, 100, 0);
        let now = Utc::now();

        let reservation = ledger
            .reserve_stock(key, 10, order_reference(), None, now)
            .unwrap();
        ledger.release_reservation(reservation.id, now).unwrap();
        let snapshot = ledger.record(key).unwrap();

        let err = ledger.release_reservation(reservation.id, now).unwrap_err();
        assert!(matches!(err, DomainError::ReservationNotActive { .. }));
        assert_eq!(ledger.record(key).unwrap(), snapshot);
    }

    #[test]
    fn reserve_fails_when_available_is_insufficient() {
        let (ledger, _bus) = ledger();
        let key = seeded_key(&ledger, 10, 0);
        let now = Utc::now();

        let err = ledger
            .reserve_stock(key, 11, order_reference(), None, now)
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientInventory {
                requested: 11,
                available: 10
            }
        );
        assert_eq!(ledger.record(key).unwrap().reserved, 0);
        assert!(ledger.movements_for(key).is_empty());
    }

    #[test]
    fn reserve_accounts_for_frozen_and_damaged_stock() {
        let (ledger, _bus) = ledger();
        let key = seeded_key(&ledger, 100, 0);
        let now = Utc::now();

        ledger.freeze_stock(key, 30, "quality hold", now).unwrap();
        ledger.mark_damaged(key, 20, "transport damage", now).unwrap();

        // 100 on hand − 30 frozen − 20 damaged = 50 free to promise.
        let err = ledger
            .reserve_stock(key, 51, order_reference(), None, now)
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientInventory { available: 50, .. }));

        ledger
            .reserve_stock(key, 50, order_reference(), None, now)
            .unwrap();
        let record = ledger.record(key).unwrap();
        assert_eq!(record.available(), 0);
        assert_eq!(record.on_hand, 100);
        assert_invariant(&record);
    }

    #[test]
    fn rejects_non_positive_quantities() {
        let (ledger, _bus) = ledger();
        let key = seeded_key(&ledger, 100, 0);
        let now = Utc::now();

        for quantity in [0, -5] {
            let err = ledger
                .reserve_stock(key, quantity, order_reference(), None, now)
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
        assert!(matches!(
            ledger.adjust_stock(key, 0, "noop", now).unwrap_err(),
            DomainError::Validation(_)
        ));
    }

    #[test]
    fn reserve_against_unknown_key_reports_item_not_found() {
        let (ledger, _bus) = ledger();
        let key = StockKey::new(ItemId::new(), WarehouseId::new());

        let err = ledger
            .reserve_stock(key, 1, order_reference(), None, Utc::now())
            .unwrap_err();
        assert_eq!(err, DomainError::ItemNotFoundInWarehouse);
    }

    #[test]
    fn deduct_at_safety_stock_emits_low_stock_with_current_quantity() {
        let (ledger, bus) = ledger();
        let key = StockKey::new(ItemId::new(), WarehouseId::new());
        ledger.register(StockRecord::new(key).with_on_hand(500).with_levels(100, 150, 1000));
        let events = bus.subscribe();
        let now = Utc::now();

        ledger
            .deduct_stock(key, 420, order_reference(), "order fulfillment", now)
            .unwrap();

        let record = ledger.record(key).unwrap();
        assert_eq!(record.on_hand, 80);

        let low_stock: Vec<_> = events
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                DomainEvent::LowStock(e) => Some(e),
                _ => None,
            })
            .collect();
        assert_eq!(low_stock.len(), 1);
        assert_eq!(low_stock[0].current_qty, 80);
        assert_eq!(low_stock[0].safety_stock, 100);
    }

    #[test]
    fn deduct_more_than_on_hand_fails() {
        let (ledger, _bus) = ledger();
        let key = seeded_key(&ledger, 50, 0);

        let err = ledger
            .deduct_stock(key, 51, order_reference(), "fulfillment", Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientInventory { .. }));
        assert_eq!(ledger.record(key).unwrap().on_hand, 50);
    }

    #[test]
    fn concurrent_reserves_exceeding_available_yield_exactly_one_success() {
        let (ledger, _bus) = ledger();
        let key = seeded_key(&ledger, 10, 0);
        let now = Utc::now();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    ledger
                        .reserve_stock(key, 7, order_reference(), None, now)
                        .is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();

        assert_eq!(successes, 1);
        let record = ledger.record(key).unwrap();
        assert_eq!(record.reserved, 7);
        assert_invariant(&record);
    }

    #[test]
    fn opposing_transfers_complete_without_deadlock() {
        let (ledger, _bus) = ledger();
        let item_id = ItemId::new();
        let warehouse_a = WarehouseId::new();
        let warehouse_b = WarehouseId::new();
        ledger.register(StockRecord::new(StockKey::new(item_id, warehouse_a)).with_on_hand(100));
        ledger.register(StockRecord::new(StockKey::new(item_id, warehouse_b)).with_on_hand(100));
        let now = Utc::now();

        let forward = {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                for _ in 0..50 {
                    ledger
                        .transfer_stock(item_id, warehouse_a, warehouse_b, 1, order_reference(), now)
                        .unwrap();
                }
            })
        };
        let backward = {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                for _ in 0..50 {
                    ledger
                        .transfer_stock(item_id, warehouse_b, warehouse_a, 1, order_reference(), now)
                        .unwrap();
                }
            })
        };
        forward.join().unwrap();
        backward.join().unwrap();

        let total: i64 = ledger
            .records_for_item(item_id)
            .iter()
            .map(|r| r.on_hand)
            .sum();
        assert_eq!(total, 200);
    }

    #[test]
    fn transfer_preserves_summed_on_hand_and_logs_both_sides() {
        let (ledger, _bus) = ledger();
        let item_id = ItemId::new();
        let warehouse_a = WarehouseId::new();
        let warehouse_b = WarehouseId::new();
        ledger.register(StockRecord::new(StockKey::new(item_id, warehouse_a)).with_on_hand(60));
        let now = Utc::now();

        ledger
            .transfer_stock(item_id, warehouse_a, warehouse_b, 25, order_reference(), now)
            .unwrap();

        assert_eq!(
            ledger.record(StockKey::new(item_id, warehouse_a)).unwrap().on_hand,
            35
        );
        assert_eq!(
            ledger.record(StockKey::new(item_id, warehouse_b)).unwrap().on_hand,
            25
        );

        let movements = ledger.movements();
        let transfer_quantities: Vec<_> = movements
            .iter()
            .filter(|m| m.movement_type == MovementType::Transfer)
            .map(|m| m.quantity)
            .collect();
        assert_eq!(transfer_quantities, vec![-25, 25]);
    }

    #[test]
    fn expired_reservations_are_found_by_the_sweep() {
        let (ledger, _bus) = ledger();
        let key = seeded_key(&ledger, 100, 0);
        let now = Utc::now();

        let expired = ledger
            .reserve_stock(
                key,
                10,
                order_reference(),
                Some(now - chrono::Duration::seconds(1)),
                now - chrono::Duration::hours(1),
            )
            .unwrap();
        ledger
            .reserve_stock(key, 5, order_reference(), None, now)
            .unwrap();

        let found = ledger.find_expired_reservations(now);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, expired.id);
    }

    #[test]
    fn availability_check_reports_shortage_and_alternatives() {
        let (ledger, _bus) = ledger();
        let item_id = ItemId::new();
        let warehouse_a = WarehouseId::new();
        let warehouse_b = WarehouseId::new();
        ledger.register(StockRecord::new(StockKey::new(item_id, warehouse_a)).with_on_hand(5));
        ledger.register(StockRecord::new(StockKey::new(item_id, warehouse_b)).with_on_hand(80));
        let now = Utc::now();
        ledger
            .reserve_stock(StockKey::new(item_id, warehouse_a), 2, order_reference(), None, now)
            .unwrap();

        let checks = ledger.check_availability(&[AvailabilityRequest {
            item_id,
            warehouse_id: warehouse_a,
            quantity: 10,
        }]);

        assert_eq!(checks.len(), 1);
        let check = &checks[0];
        assert_eq!(check.available_qty, 3);
        assert!(!check.is_available);
        assert_eq!(check.shortage, 7);
        assert!(check.next_available_date.is_some());
        assert_eq!(check.alternatives.len(), 1);
        assert_eq!(check.alternatives[0].warehouse_id, warehouse_b);
        assert_eq!(check.alternatives[0].available, 80);
    }

    #[test]
    fn movement_log_covers_every_mutation_in_order() {
        let (ledger, _bus) = ledger();
        let key = seeded_key(&ledger, 0, 0);
        let now = Utc::now();

        ledger
            .receive_stock(key, 100, order_reference(), now)
            .unwrap();
        let reservation = ledger
            .reserve_stock(key, 30, order_reference(), None, now)
            .unwrap();
        ledger.release_reservation(reservation.id, now).unwrap();
        ledger.adjust_stock(key, -10, "cycle count", now).unwrap();
        ledger
            .deduct_stock(key, 20, order_reference(), "fulfillment", now)
            .unwrap();

        let types: Vec<_> = ledger
            .movements_for(key)
            .iter()
            .map(|m| m.movement_type)
            .collect();
        assert_eq!(
            types,
            vec![
                MovementType::Inbound,
                MovementType::Reserve,
                MovementType::Release,
                MovementType::Adjustment,
                MovementType::Outbound,
            ]
        );

        let balances: Vec<_> = ledger
            .movements_for(key)
            .iter()
            .map(|m| m.balance_after)
            .collect();
        assert_eq!(balances, vec![100, 100, 100, 90, 70]);
    }
}

#[cfg(test)]
mod properties {
    use super::*;

    use std::sync::Arc;

    use agroerp_core::OrderId;
    use agroerp_events::InMemoryEventBus;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(i64),
        ReleaseOldest,
        Deduct(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1..30i64).prop_map(Op::Reserve),
            Just(Op::ReleaseOldest),
            (1..20i64).prop_map(Op::Deduct),
        ]
    }

    proptest! {
        #[test]
        fn availability_identity_holds_under_arbitrary_interleavings(
            ops in prop::collection::vec(op_strategy(), 1..60)
        ) {
            let bus = Arc::new(InMemoryEventBus::new());
            let ledger = StockLedger::new(bus);
            let key = StockKey::new(ItemId::new(), WarehouseId::new());
            ledger.register(StockRecord::new(key).with_on_hand(100));
            let now = Utc::now();
            let mut active: Vec<_> = Vec::new();

            for op in ops {
                match op {
                    Op::Reserve(quantity) => {
                        if let Ok(reservation) = ledger.reserve_stock(
                            key,
                            quantity,
                            Reference::order(OrderId::new()),
                            None,
                            now,
                        ) {
                            active.push(reservation.id);
                        }
                    }
                    Op::ReleaseOldest => {
                        if !active.is_empty() {
                            let id = active.remove(0);
                            ledger.release_reservation(id, now).unwrap();
                        }
                    }
                    Op::Deduct(quantity) => {
                        let _ = ledger.deduct_stock(
                            key,
                            quantity,
                            Reference::order(OrderId::new()),
                            "property deduct",
                            now,
                        );
                    }
                }

                let record = ledger.record(key).unwrap();
                prop_assert_eq!(
                    record.available(),
                    record.on_hand - record.reserved - record.frozen - record.damaged
                );
                prop_assert!(record.reserved >= 0);
                prop_assert!(record.on_hand >= 0);
            }
        }
    }
}
