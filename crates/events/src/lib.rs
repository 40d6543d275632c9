//! Typed internal message passing for domain events.
//!
//! Business operations publish facts (`DomainEvent`) after they commit; the
//! bus fans them out to whoever subscribed. Delivery is **at-most-once** and
//! best-effort: a publish failure is logged by the caller and never aborts
//! the operation that produced the event.

pub mod bus;
pub mod domain;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use domain::{
    AlertSeverity, AlertTriggered, BatchAllocationCompleted, DomainEvent, InventoryAllocated,
    LowStock, ReservationReleased, StockReserved, TriggerReplenishment,
};
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
