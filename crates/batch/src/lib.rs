//! Batch registry and traceability domain module.
//!
//! Lot-level quantity sub-ledger with quality metadata, per-batch
//! transaction log, and a genealogy graph (merge/split provenance,
//! consumption records). The registry is one independently locked ledger;
//! multi-batch operations (merge, split) are atomic under its single write
//! lock.

pub mod batch;
pub mod registry;
pub mod trace;

pub use batch::{
    AlertLevel, Batch, BatchAlert, BatchLocation, BatchQuantity, BatchReference, BatchSpec,
    BatchStatus, BatchTransaction, BatchTransactionKind, ChildLink, ConsumptionDoc,
    ConsumptionKind, InspectionStatus, ParentLink, QualityInfo, Traceability,
};
pub use registry::{BatchRegistry, BatchSplit};
pub use trace::{CustomerTouch, DownstreamTrace, UpstreamTrace};
