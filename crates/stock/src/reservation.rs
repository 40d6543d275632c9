use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use agroerp_core::{Entity, ItemId, OrderId, ReservationId, WarehouseId};

/// Kind of document a reservation or movement refers back to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    Order,
    Production,
    Transfer,
    Adjustment,
}

/// External document reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub reference_type: ReferenceType,
    pub reference_no: String,
}

impl Reference {
    pub fn new(reference_type: ReferenceType, reference_no: impl Into<String>) -> Self {
        Self {
            reference_type,
            reference_no: reference_no.into(),
        }
    }

    /// Reference to an order, keyed by its id.
    pub fn order(order_id: OrderId) -> Self {
        Self::new(ReferenceType::Order, order_id.to_string())
    }
}

/// Reservation lifecycle. `Released` and `Expired` are terminal; a
/// reservation is immutable once it reaches either.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReservationStatus::Released | ReservationStatus::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Released => "released",
            ReservationStatus::Expired => "expired",
        }
    }
}

/// Default hold duration when the caller gives no expiry.
pub const DEFAULT_RESERVATION_TTL_DAYS: i64 = 7;

/// Time-bounded hold against available stock, tied to a reference document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub reference: Reference,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn new(
        item_id: ItemId,
        warehouse_id: WarehouseId,
        quantity: i64,
        reference: Reference,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            item_id,
            warehouse_id,
            quantity,
            reference,
            status: ReservationStatus::Active,
            expires_at: expires_at.unwrap_or(now + Duration::days(DEFAULT_RESERVATION_TTL_DAYS)),
            created_at: now,
            released_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Active but past its expiry time; picked up by the cleanup sweep.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at < now
    }

    pub fn mark_released(&mut self, now: DateTime<Utc>) {
        self.status = ReservationStatus::Released;
        self.released_at = Some(now);
    }
}

impl Entity for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
