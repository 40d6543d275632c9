//! Collaborator contracts consumed by the inventory core.
//!
//! The order directory, notification sink, and in-transit feed live outside
//! this bounded context; this crate defines their contracts plus in-memory
//! implementations for wiring and tests. No business logic belongs here.

pub mod notify;
pub mod order;
pub mod transit;

pub use notify::{Alert, LogNotifier, Notification, Notifier, RecordingNotifier, Report};
pub use order::{InMemoryOrderDirectory, Order, OrderDirectory, OrderItem, OrderStatus};
pub use transit::{NoTransit, StaticTransit, TransitFeed};
