//! Stock ledger domain module.
//!
//! The aggregate quantity ledger: one `StockRecord` per (item, warehouse)
//! key, time-bounded reservations against available stock, and an
//! append-only movement log auditing every mutation. All mutations run
//! under an exclusive per-row lock so the availability invariant holds
//! under concurrent writers.

pub mod ledger;
pub mod movement;
pub mod record;
pub mod reservation;

pub use ledger::{AlternativeStock, AvailabilityCheck, AvailabilityRequest, StockLedger};
pub use movement::{Movement, MovementLog, MovementType, NewMovement};
pub use record::{StockKey, StockRecord};
pub use reservation::{Reference, ReferenceType, Reservation, ReservationStatus};
