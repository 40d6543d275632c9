//! Order-inventory integration: the allocation engine, the self-healing
//! reconciliation jobs, and the alert bridge.
//!
//! This crate orchestrates the two ledgers (`agroerp-stock`,
//! `agroerp-batch`) against the order directory collaborator. It owns no
//! quantity state of its own; every hold and deduction goes through the
//! ledgers' locked operations, and cross-ledger consistency is maintained
//! by compensation (release what was created) rather than a shared
//! transaction.

pub mod alerts;
pub mod allocation;
pub mod reconcile;
pub mod schedule;
pub mod service;

pub use alerts::LowStockImpact;
pub use allocation::{
    AllocatedLine, AllocationReport, AllocationStatus, AllocationStrategy, OrderAllocation,
};
pub use reconcile::{
    CleanupSummary, Discrepancy, DiscrepancyKind, ReconciliationReport, RepairAction,
};
pub use schedule::{JobOutcome, RecurringJob};
pub use service::{
    AvailableInventory, FeasibilityReport, FeasibilityRequest, FeasibleLine, FulfillmentType,
    InfeasibleLine, IntegrationError, OrderInventoryService, SuggestedAction,
};
