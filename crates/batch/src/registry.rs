//! The batch registry: an independently locked lot ledger.
//!
//! All mutations take the registry write lock for their full critical
//! section, so multi-batch operations (merge, split) observe and mutate a
//! consistent snapshot — they commit entirely or not at all. Validation
//! happens before the first mutation.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rand::Rng;

use agroerp_core::{DomainError, DomainResult};

use crate::batch::{
    AlertLevel, Batch, BatchLocation, BatchQuantity, BatchReference, BatchSpec, BatchStatus,
    BatchTransactionKind, ChildLink, ConsumptionDoc, ConsumptionKind, ParentLink, QualityInfo,
    Traceability,
};
use crate::trace::{self, DownstreamTrace, UpstreamTrace};

/// One requested slice of a `split_batch` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSplit {
    pub quantity: i64,
    pub new_batch_no: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    batches: HashMap<String, Batch>,
    by_item: HashMap<String, BTreeSet<String>>,
}

impl RegistryInner {
    fn insert(&mut self, batch: Batch) {
        self.by_item
            .entry(batch.item_code.clone())
            .or_default()
            .insert(batch.batch_no.clone());
        self.batches.insert(batch.batch_no.clone(), batch);
    }

    fn get_mut(&mut self, batch_no: &str) -> DomainResult<&mut Batch> {
        self.batches
            .get_mut(batch_no)
            .ok_or_else(|| DomainError::BatchNotFound(batch_no.to_string()))
    }

    /// Issue quantity out of a lot. Shared by the public issue path and the
    /// merge/split internals; the caller holds the write lock.
    fn issue(
        &mut self,
        batch_no: &str,
        quantity: i64,
        reference: BatchReference,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let batch = self.get_mut(batch_no)?;
        if batch.status != BatchStatus::Active {
            return Err(DomainError::invariant(format!(
                "batch status is {}, cannot issue",
                batch.status.as_str()
            )));
        }
        if batch.is_past_expiry(now) {
            return Err(DomainError::ExpiredBatchIssue(batch_no.to_string()));
        }
        if quantity > batch.quantity.available {
            return Err(DomainError::insufficient(quantity, batch.quantity.available));
        }

        batch.quantity.current -= quantity;
        batch.quantity.available -= quantity;
        let customer = reference.customer.clone();
        let doc_no = reference.doc_no.clone();
        batch.log_transaction(
            BatchTransactionKind::Issue,
            quantity,
            Some(reference),
            None,
            None,
            now,
        );

        if let Some(customer) = customer {
            batch.traceability.consumption_docs.push(ConsumptionDoc {
                kind: ConsumptionKind::SalesOrder,
                doc_no,
                customer: Some(customer),
                quantity,
                occurred_at: now,
            });
        }

        if batch.quantity.current == 0 && batch.quantity.reserved == 0 {
            batch.status = BatchStatus::Consumed;
            tracing::debug!(batch_no, "batch fully consumed");
        }

        Ok(())
    }

    fn update_status(
        &mut self,
        batch_no: &str,
        status: BatchStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let batch = self.get_mut(batch_no)?;
        let from = batch.status;

        if !transition_allowed(from, status) {
            return Err(DomainError::invariant(format!(
                "no transition from {} to {}",
                from.as_str(),
                status.as_str()
            )));
        }
        if status == BatchStatus::Consumed
            && (batch.quantity.current != 0 || batch.quantity.available != 0)
        {
            return Err(DomainError::invariant(
                "batch can only be consumed once its quantities reach zero",
            ));
        }

        batch.status = status;
        match status {
            // Held lots keep their reservations; only availability is pulled.
            BatchStatus::Quarantine | BatchStatus::Blocked => batch.quantity.available = 0,
            BatchStatus::Active => {
                batch.quantity.available = batch.quantity.current - batch.quantity.reserved;
            }
            BatchStatus::Expired | BatchStatus::Consumed => {}
        }

        if let Some(reason) = reason {
            let level = if status == BatchStatus::Blocked {
                AlertLevel::Critical
            } else {
                AlertLevel::Warning
            };
            batch.push_alert(
                level,
                format!("status changed to {}: {}", status.as_str(), reason),
                now,
            );
        }
        batch.version += 1;
        batch.updated_at = now;

        tracing::info!(
            batch_no,
            from = from.as_str(),
            to = status.as_str(),
            "batch status changed"
        );
        Ok(())
    }

    fn assign_batch_no(
        &self,
        explicit: Option<String>,
        item_code: &str,
        taken: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<String> {
        if let Some(batch_no) = explicit {
            if self.batches.contains_key(&batch_no) || taken.contains(&batch_no) {
                return Err(DomainError::DuplicateBatch(batch_no));
            }
            return Ok(batch_no);
        }

        let mut rng = rand::thread_rng();
        let date = now.format("%Y%m%d");
        let mut candidate = String::new();
        for _ in 0..16 {
            candidate = format!("{item_code}-{date}-{:03}", rng.gen_range(0..1000));
            if !self.batches.contains_key(&candidate) && !taken.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(DomainError::DuplicateBatch(candidate))
    }
}

fn transition_allowed(from: BatchStatus, to: BatchStatus) -> bool {
    matches!(
        (from, to),
        (BatchStatus::Active, BatchStatus::Quarantine)
            | (BatchStatus::Quarantine, BatchStatus::Active)
            | (BatchStatus::Active, BatchStatus::Blocked)
            | (BatchStatus::Blocked, BatchStatus::Active)
            | (BatchStatus::Active, BatchStatus::Expired)
            | (BatchStatus::Active, BatchStatus::Consumed)
    )
}

/// Per-lot quantity sub-ledger with genealogy tracking.
#[derive(Debug, Default)]
pub struct BatchRegistry {
    inner: RwLock<RegistryInner>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new lot. A missing `batch_no` is generated as
    /// `{item_code}-{YYYYMMDD}-{3-digit random}`.
    pub fn create_batch(&self, spec: BatchSpec, now: DateTime<Utc>) -> DomainResult<Batch> {
        if spec.item_code.trim().is_empty() {
            return Err(DomainError::validation("item_code cannot be empty"));
        }
        if spec.initial_quantity <= 0 {
            return Err(DomainError::validation("initial quantity must be positive"));
        }

        let mut inner = self.write()?;
        let batch_no =
            inner.assign_batch_no(spec.batch_no, &spec.item_code, &HashSet::new(), now)?;

        let mut batch = Batch {
            batch_no: batch_no.clone(),
            item_code: spec.item_code,
            item_name: spec.item_name,
            quantity: BatchQuantity {
                initial: spec.initial_quantity,
                current: spec.initial_quantity,
                reserved: 0,
                available: spec.initial_quantity,
                unit: spec.unit,
            },
            status: BatchStatus::Active,
            production_date: spec.production_date.unwrap_or(now),
            expiry_date: spec.expiry_date,
            location: spec.location,
            quality: QualityInfo::default(),
            traceability: Traceability::default(),
            transactions: Vec::new(),
            alerts: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        };
        batch.log_transaction(
            BatchTransactionKind::Receipt,
            batch.quantity.initial,
            Some(BatchReference::new("batch_creation", &batch_no)),
            None,
            None,
            now,
        );

        inner.insert(batch.clone());
        tracing::info!(batch_no = %batch_no, initial = batch.quantity.initial, "batch created");
        Ok(batch)
    }

    pub fn get(&self, batch_no: &str) -> Option<Batch> {
        self.inner.read().ok()?.batches.get(batch_no).cloned()
    }

    pub fn find_batch(&self, batch_no: &str) -> DomainResult<Batch> {
        self.get(batch_no)
            .ok_or_else(|| DomainError::BatchNotFound(batch_no.to_string()))
    }

    pub fn batches_for_item(&self, item_code: &str) -> Vec<Batch> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        inner
            .by_item
            .get(item_code)
            .map(|nos| {
                nos.iter()
                    .filter_map(|no| inner.batches.get(no).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Issue quantity out of a lot against a reference document.
    ///
    /// A reference carrying a customer also appends a downstream
    /// consumption record for traceability.
    pub fn issue_batch(
        &self,
        batch_no: &str,
        quantity: i64,
        reference: BatchReference,
        now: DateTime<Utc>,
    ) -> DomainResult<Batch> {
        let mut inner = self.write()?;
        inner.issue(batch_no, quantity, reference, now)?;
        Ok(inner.batches[batch_no].clone())
    }

    /// Receive additional quantity into an active lot.
    pub fn receive_batch(
        &self,
        batch_no: &str,
        quantity: i64,
        reference: BatchReference,
        now: DateTime<Utc>,
    ) -> DomainResult<Batch> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let mut inner = self.write()?;
        let batch = inner.get_mut(batch_no)?;
        if batch.status != BatchStatus::Active {
            return Err(DomainError::invariant(format!(
                "batch status is {}, cannot receive",
                batch.status.as_str()
            )));
        }

        batch.quantity.current += quantity;
        batch.quantity.available += quantity;
        batch.log_transaction(
            BatchTransactionKind::Receipt,
            quantity,
            Some(reference),
            None,
            None,
            now,
        );
        Ok(batch.clone())
    }

    /// Move a lot between locations. Changes location metadata only; the
    /// quantity sub-ledger is untouched.
    pub fn transfer_batch(
        &self,
        batch_no: &str,
        quantity: i64,
        from_location: &str,
        to_location: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Batch> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let mut inner = self.write()?;
        let batch = inner.get_mut(batch_no)?;
        if quantity > batch.quantity.current {
            return Err(DomainError::validation(
                "transfer quantity exceeds lot quantity",
            ));
        }

        batch.log_transaction(
            BatchTransactionKind::Transfer,
            quantity,
            None,
            Some(from_location.to_string()),
            Some(to_location.to_string()),
            now,
        );
        batch.location = Some(BatchLocation::parse(to_location));
        Ok(batch.clone())
    }

    /// Place a lot-level hold for a reference document.
    pub fn reserve_batch(
        &self,
        batch_no: &str,
        quantity: i64,
        reference: BatchReference,
        now: DateTime<Utc>,
    ) -> DomainResult<Batch> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let mut inner = self.write()?;
        let batch = inner.get_mut(batch_no)?;
        if batch.status != BatchStatus::Active {
            return Err(DomainError::invariant(format!(
                "batch status is {}, cannot reserve",
                batch.status.as_str()
            )));
        }
        if batch.is_past_expiry(now) {
            return Err(DomainError::ExpiredBatchIssue(batch_no.to_string()));
        }
        if quantity > batch.quantity.available {
            return Err(DomainError::insufficient(quantity, batch.quantity.available));
        }

        batch.quantity.reserved += quantity;
        batch.quantity.available -= quantity;
        batch.log_transaction(
            BatchTransactionKind::Reserve,
            quantity,
            Some(reference),
            None,
            None,
            now,
        );
        Ok(batch.clone())
    }

    /// Lift a lot-level hold.
    pub fn release_batch(
        &self,
        batch_no: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Batch> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let mut inner = self.write()?;
        let batch = inner.get_mut(batch_no)?;
        if quantity > batch.quantity.reserved {
            return Err(DomainError::invariant("release exceeds reserved quantity"));
        }

        batch.quantity.reserved -= quantity;
        // Held lots stay at zero availability until reactivated.
        if batch.status == BatchStatus::Active {
            batch.quantity.available += quantity;
        }
        batch.log_transaction(
            BatchTransactionKind::Release,
            quantity,
            None,
            None,
            None,
            now,
        );
        Ok(batch.clone())
    }

    /// Merge source lots into one new lot.
    ///
    /// Every source is fully issued against the new batch and linked both
    /// ways; the merged lot's initial quantity is the sum of the source
    /// `current` quantities at merge time.
    pub fn merge_batches(
        &self,
        source_batch_nos: &[String],
        target_batch_no: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Batch> {
        if source_batch_nos.len() < 2 {
            return Err(DomainError::validation(
                "merge requires at least two source batches",
            ));
        }

        let mut inner = self.write()?;

        // Validate everything before the first mutation.
        let mut item_codes = BTreeSet::new();
        let mut sources = Vec::with_capacity(source_batch_nos.len());
        for batch_no in source_batch_nos {
            let batch = inner
                .batches
                .get(batch_no)
                .ok_or_else(|| DomainError::BatchNotFound(batch_no.clone()))?;
            item_codes.insert(batch.item_code.clone());
            if batch.status != BatchStatus::Active {
                return Err(DomainError::invariant(format!(
                    "batch {} is {}, cannot merge",
                    batch_no,
                    batch.status.as_str()
                )));
            }
            if batch.is_past_expiry(now) {
                return Err(DomainError::ExpiredBatchIssue(batch_no.clone()));
            }
            if batch.quantity.reserved != 0 {
                return Err(DomainError::invariant(format!(
                    "batch {batch_no} has outstanding reservations, cannot merge"
                )));
            }
            sources.push((
                batch.batch_no.clone(),
                batch.item_code.clone(),
                batch.quantity.current,
                batch.expiry_date,
            ));
        }
        if item_codes.len() > 1 {
            return Err(DomainError::MixedItemMerge);
        }

        let merged_no =
            inner.assign_batch_no(target_batch_no, item_codes.iter().next().map(String::as_str).unwrap_or_default(), &HashSet::new(), now)?;
        let total: i64 = sources.iter().map(|(_, _, current, _)| current).sum();
        let first = &inner.batches[&sources[0].0];
        let unit = first.quantity.unit.clone();
        let item_name = first.item_name.clone();
        let item_code = first.item_code.clone();
        let location = first.location.clone();
        // Earliest source expiry governs the merged lot.
        let expiry_date = sources.iter().filter_map(|(_, _, _, e)| *e).min();

        let mut merged = Batch {
            batch_no: merged_no.clone(),
            item_code,
            item_name,
            quantity: BatchQuantity {
                initial: total,
                current: total,
                reserved: 0,
                available: total,
                unit,
            },
            status: BatchStatus::Active,
            production_date: now,
            expiry_date,
            location,
            quality: QualityInfo::default(),
            traceability: Traceability {
                parent_batches: sources
                    .iter()
                    .map(|(batch_no, item_code, current, _)| ParentLink {
                        batch_no: batch_no.clone(),
                        item_code: item_code.clone(),
                        quantity: *current,
                        consumed_at: now,
                    })
                    .collect(),
                child_batches: Vec::new(),
                consumption_docs: Vec::new(),
            },
            transactions: Vec::new(),
            alerts: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        };
        merged.log_transaction(
            BatchTransactionKind::Receipt,
            total,
            Some(BatchReference::new("batch_merge", &merged_no)),
            None,
            None,
            now,
        );

        for (batch_no, _, current, _) in &sources {
            inner.issue(
                batch_no,
                *current,
                BatchReference::new("batch_merge", &merged_no),
                now,
            )?;
            let source = inner.get_mut(batch_no)?;
            source.traceability.child_batches.push(ChildLink {
                batch_no: merged_no.clone(),
                quantity: *current,
                created_at: now,
            });
        }

        inner.insert(merged.clone());
        tracing::info!(
            batch_no = %merged_no,
            sources = sources.len(),
            total,
            "batches merged"
        );
        Ok(merged)
    }

    /// Split a lot into new child lots, each with one upstream parent link.
    pub fn split_batch(
        &self,
        source_batch_no: &str,
        splits: &[BatchSplit],
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Batch>> {
        if splits.is_empty() {
            return Err(DomainError::validation("split requires at least one slice"));
        }
        if splits.iter().any(|s| s.quantity <= 0) {
            return Err(DomainError::validation("split quantities must be positive"));
        }

        let mut inner = self.write()?;

        let source = inner
            .batches
            .get(source_batch_no)
            .ok_or_else(|| DomainError::BatchNotFound(source_batch_no.to_string()))?;
        if source.status != BatchStatus::Active {
            return Err(DomainError::invariant(format!(
                "batch status is {}, cannot split",
                source.status.as_str()
            )));
        }
        if source.is_past_expiry(now) {
            return Err(DomainError::ExpiredBatchIssue(source_batch_no.to_string()));
        }

        let total: i64 = splits.iter().map(|s| s.quantity).sum();
        if total > source.quantity.available {
            return Err(DomainError::over_allocation(total, source.quantity.available));
        }

        let item_code = source.item_code.clone();
        let item_name = source.item_name.clone();
        let unit = source.quantity.unit.clone();
        let production_date = source.production_date;
        let expiry_date = source.expiry_date;
        let location = source.location.clone();

        // Resolve child numbers before mutating anything.
        let mut taken = HashSet::new();
        let mut child_nos = Vec::with_capacity(splits.len());
        for split in splits {
            let child_no =
                inner.assign_batch_no(split.new_batch_no.clone(), &item_code, &taken, now)?;
            taken.insert(child_no.clone());
            child_nos.push(child_no);
        }

        let mut children = Vec::with_capacity(splits.len());
        for (split, child_no) in splits.iter().zip(&child_nos) {
            let mut child = Batch {
                batch_no: child_no.clone(),
                item_code: item_code.clone(),
                item_name: item_name.clone(),
                quantity: BatchQuantity {
                    initial: split.quantity,
                    current: split.quantity,
                    reserved: 0,
                    available: split.quantity,
                    unit: unit.clone(),
                },
                status: BatchStatus::Active,
                production_date,
                expiry_date,
                location: location.clone(),
                quality: QualityInfo::default(),
                traceability: Traceability {
                    parent_batches: vec![ParentLink {
                        batch_no: source_batch_no.to_string(),
                        item_code: item_code.clone(),
                        quantity: split.quantity,
                        consumed_at: now,
                    }],
                    child_batches: Vec::new(),
                    consumption_docs: Vec::new(),
                },
                transactions: Vec::new(),
                alerts: Vec::new(),
                created_at: now,
                updated_at: now,
                version: 0,
            };
            child.log_transaction(
                BatchTransactionKind::Receipt,
                split.quantity,
                Some(BatchReference::new("batch_split", source_batch_no)),
                None,
                None,
                now,
            );
            children.push(child);
        }

        inner.issue(
            source_batch_no,
            total,
            BatchReference::new("batch_split", child_nos.join(",")),
            now,
        )?;
        let source = inner.get_mut(source_batch_no)?;
        for child in &children {
            source.traceability.child_batches.push(ChildLink {
                batch_no: child.batch_no.clone(),
                quantity: child.quantity.initial,
                created_at: now,
            });
        }

        for child in &children {
            inner.insert(child.clone());
        }
        tracing::info!(
            source_batch_no,
            children = children.len(),
            total,
            "batch split"
        );
        Ok(children)
    }

    /// Transition a lot's status.
    ///
    /// Allowed: active⇄quarantine, active⇄blocked, active→expired,
    /// active→consumed (with an exhausted sub-ledger). A reason appends an
    /// alert entry.
    pub fn update_batch_status(
        &self,
        batch_no: &str,
        status: BatchStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<Batch> {
        let mut inner = self.write()?;
        inner.update_status(batch_no, status, reason, now)?;
        Ok(inner.batches[batch_no].clone())
    }

    /// Auto-expire active lots past their expiry date; returns the affected
    /// batch numbers. Runs on a fixed schedule.
    pub fn check_expiry(&self, now: DateTime<Utc>) -> Vec<String> {
        let Ok(mut inner) = self.inner.write() else {
            return Vec::new();
        };

        let due: Vec<String> = inner
            .batches
            .values()
            .filter(|b| b.status == BatchStatus::Active && b.is_past_expiry(now))
            .map(|b| b.batch_no.clone())
            .collect();

        let mut expired = Vec::with_capacity(due.len());
        for batch_no in due {
            if inner
                .update_status(
                    &batch_no,
                    BatchStatus::Expired,
                    Some("auto-expired by system"),
                    now,
                )
                .is_ok()
            {
                expired.push(batch_no);
            }
        }
        expired
    }

    /// Depth-bounded provenance trace (raw materials this lot came from).
    pub fn trace_upstream(&self, batch_no: &str, levels: u32) -> DomainResult<UpstreamTrace> {
        let inner = self.read()?;
        trace::trace_upstream(&inner.batches, batch_no, levels)
    }

    /// Depth-bounded consumption trace (where this lot went).
    pub fn trace_downstream(&self, batch_no: &str, levels: u32) -> DomainResult<DownstreamTrace> {
        let inner = self.read()?;
        trace::trace_downstream(&inner.batches, batch_no, levels)
    }

    fn read(&self) -> DomainResult<std::sync::RwLockReadGuard<'_, RegistryInner>> {
        self.inner
            .read()
            .map_err(|_| DomainError::conflict("batch registry lock poisoned"))
    }

    fn write(&self) -> DomainResult<std::sync::RwLockWriteGuard<'_, RegistryInner>> {
        self.inner
            .write()
            .map_err(|_| DomainError::conflict("batch registry lock poisoned"))
    }
}
