use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agroerp_core::Entity;

/// Batch lifecycle.
///
/// `Expired` and `Consumed` are terminal; no transition leaves either.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Active,
    Quarantine,
    Blocked,
    Expired,
    Consumed,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Expired | BatchStatus::Consumed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Active => "active",
            BatchStatus::Quarantine => "quarantine",
            BatchStatus::Blocked => "blocked",
            BatchStatus::Expired => "expired",
            BatchStatus::Consumed => "consumed",
        }
    }
}

/// Lot-level quantity sub-ledger.
///
/// Invariants, maintained by the registry: `current = initial + Σ receipts
/// − Σ issues`; `available = current − reserved` while the batch is active,
/// zero while quarantined or blocked; neither goes negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchQuantity {
    pub initial: i64,
    pub current: i64,
    pub reserved: i64,
    pub available: i64,
    pub unit: String,
}

/// Physical placement of a lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLocation {
    pub warehouse: String,
    pub zone: Option<String>,
}

impl BatchLocation {
    /// Parse a location code like "WH1-A" into warehouse and zone.
    pub fn parse(code: &str) -> Self {
        match code.split_once('-') {
            Some((warehouse, zone)) => Self {
                warehouse: warehouse.to_string(),
                zone: Some(zone.to_string()),
            },
            None => Self {
                warehouse: code.to_string(),
                zone: None,
            },
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectionStatus {
    Pending,
    Passed,
    Failed,
}

/// Quality and compliance metadata carried by a lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityInfo {
    pub inspection_status: InspectionStatus,
    pub certificates: Vec<String>,
}

impl Default for QualityInfo {
    fn default() -> Self {
        Self {
            inspection_status: InspectionStatus::Pending,
            certificates: Vec::new(),
        }
    }
}

/// Upstream genealogy: a source batch consumed into this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    pub batch_no: String,
    pub item_code: String,
    pub quantity: i64,
    pub consumed_at: DateTime<Utc>,
}

/// Downstream genealogy: a batch created out of this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildLink {
    pub batch_no: String,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionKind {
    SalesOrder,
    BatchMerge,
    BatchSplit,
    Production,
}

/// Downstream consumption record (where the lot went).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionDoc {
    pub kind: ConsumptionKind,
    pub doc_no: String,
    pub customer: Option<String>,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Genealogy of a lot: provenance upstream, destiny downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traceability {
    pub parent_batches: Vec<ParentLink>,
    pub child_batches: Vec<ChildLink>,
    pub consumption_docs: Vec<ConsumptionDoc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchTransactionKind {
    Receipt,
    Issue,
    Transfer,
    Reserve,
    Release,
}

/// Document reference attached to a batch transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReference {
    pub doc_type: String,
    pub doc_no: String,
    pub customer: Option<String>,
}

impl BatchReference {
    pub fn new(doc_type: impl Into<String>, doc_no: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            doc_no: doc_no.into(),
            customer: None,
        }
    }

    pub fn sales_order(doc_no: impl Into<String>, customer: impl Into<String>) -> Self {
        Self {
            doc_type: "sales_order".to_string(),
            doc_no: doc_no.into(),
            customer: Some(customer.into()),
        }
    }
}

/// One entry of a batch's own transaction log. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTransaction {
    /// Position in this batch's log, starting at 1.
    pub sequence: u64,
    pub kind: BatchTransactionKind,
    pub quantity: i64,
    pub reference: Option<BatchReference>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    /// `current` after the transaction committed.
    pub balance_after: i64,
    pub performed_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

/// Alert raised against a lot (status change with reason, expiry, …).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAlert {
    pub level: AlertLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
}

/// A traceable lot with its own quantity sub-ledger and genealogy links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Business key, unique across the registry.
    pub batch_no: String,
    pub item_code: String,
    pub item_name: String,
    pub quantity: BatchQuantity,
    pub status: BatchStatus,
    pub production_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub location: Option<BatchLocation>,
    pub quality: QualityInfo,
    pub traceability: Traceability,
    pub transactions: Vec<BatchTransaction>,
    pub alerts: Vec<BatchAlert>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Batch {
    /// Past its expiry date (independent of status).
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.is_some_and(|d| d < now)
    }

    /// Append a transaction entry and bump the version.
    pub(crate) fn log_transaction(
        &mut self,
        kind: BatchTransactionKind,
        quantity: i64,
        reference: Option<BatchReference>,
        from_location: Option<String>,
        to_location: Option<String>,
        now: DateTime<Utc>,
    ) {
        let sequence = self.transactions.len() as u64 + 1;
        self.transactions.push(BatchTransaction {
            sequence,
            kind,
            quantity,
            reference,
            from_location,
            to_location,
            balance_after: self.quantity.current,
            performed_by: "system".to_string(),
            occurred_at: now,
        });
        self.version += 1;
        self.updated_at = now;
    }

    pub(crate) fn push_alert(&mut self, level: AlertLevel, message: String, now: DateTime<Utc>) {
        self.alerts.push(BatchAlert {
            level,
            message,
            created_at: now,
            resolved: false,
        });
    }
}

impl Entity for Batch {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.batch_no
    }
}

/// Input to `create_batch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSpec {
    /// Explicit batch number; generated from the item code when absent.
    pub batch_no: Option<String>,
    pub item_code: String,
    pub item_name: String,
    pub initial_quantity: i64,
    pub unit: String,
    pub production_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub location: Option<BatchLocation>,
}

impl BatchSpec {
    pub fn new(item_code: impl Into<String>, initial_quantity: i64) -> Self {
        Self {
            batch_no: None,
            item_code: item_code.into(),
            item_name: String::new(),
            initial_quantity,
            unit: "KG".to_string(),
            production_date: None,
            expiry_date: None,
            location: None,
        }
    }

    pub fn with_batch_no(mut self, batch_no: impl Into<String>) -> Self {
        self.batch_no = Some(batch_no.into());
        self
    }

    pub fn with_item_name(mut self, item_name: impl Into<String>) -> Self {
        self.item_name = item_name.into();
        self
    }

    pub fn with_expiry(mut self, expiry_date: DateTime<Utc>) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }

    pub fn with_location(mut self, code: &str) -> Self {
        self.location = Some(BatchLocation::parse(code));
        self
    }
}
