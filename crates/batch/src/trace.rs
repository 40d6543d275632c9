//! Depth-bounded genealogy traversal.
//!
//! Merge and split can in principle produce graphs that revisit a batch,
//! so traversal carries a visited set in addition to the level bound; a
//! revisited node is cut off with no children rather than re-expanded.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agroerp_core::{DomainError, DomainResult};

use crate::batch::{Batch, ConsumptionKind};

/// Provenance tree node: the batch and the sources it was made from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamTrace {
    pub batch_no: String,
    pub item_code: String,
    pub production_date: DateTime<Utc>,
    pub parents: Vec<UpstreamTrace>,
}

/// A customer that received quantity out of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerTouch {
    pub customer: String,
    pub doc_no: String,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Consumption tree node: child batches and customer shipments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamTrace {
    pub batch_no: String,
    pub item_code: String,
    pub production_date: DateTime<Utc>,
    pub children: Vec<DownstreamTrace>,
    pub customers: Vec<CustomerTouch>,
}

pub fn trace_upstream(
    batches: &HashMap<String, Batch>,
    batch_no: &str,
    levels: u32,
) -> DomainResult<UpstreamTrace> {
    let mut visited = HashSet::new();
    upstream_node(batches, batch_no, levels, &mut visited)
        .ok_or_else(|| DomainError::BatchNotFound(batch_no.to_string()))
}

pub fn trace_downstream(
    batches: &HashMap<String, Batch>,
    batch_no: &str,
    levels: u32,
) -> DomainResult<DownstreamTrace> {
    let mut visited = HashSet::new();
    downstream_node(batches, batch_no, levels, &mut visited)
        .ok_or_else(|| DomainError::BatchNotFound(batch_no.to_string()))
}

fn upstream_node(
    batches: &HashMap<String, Batch>,
    batch_no: &str,
    levels: u32,
    visited: &mut HashSet<String>,
) -> Option<UpstreamTrace> {
    let batch = batches.get(batch_no)?;
    let mut node = UpstreamTrace {
        batch_no: batch.batch_no.clone(),
        item_code: batch.item_code.clone(),
        production_date: batch.production_date,
        parents: Vec::new(),
    };

    if levels > 0 && visited.insert(batch.batch_no.clone()) {
        for parent in &batch.traceability.parent_batches {
            if let Some(trace) = upstream_node(batches, &parent.batch_no, levels - 1, visited) {
                node.parents.push(trace);
            }
        }
    }

    Some(node)
}

fn downstream_node(
    batches: &HashMap<String, Batch>,
    batch_no: &str,
    levels: u32,
    visited: &mut HashSet<String>,
) -> Option<DownstreamTrace> {
    let batch = batches.get(batch_no)?;
    let mut node = DownstreamTrace {
        batch_no: batch.batch_no.clone(),
        item_code: batch.item_code.clone(),
        production_date: batch.production_date,
        children: Vec::new(),
        customers: Vec::new(),
    };

    if levels > 0 && visited.insert(batch.batch_no.clone()) {
        for child in &batch.traceability.child_batches {
            if let Some(trace) = downstream_node(batches, &child.batch_no, levels - 1, visited) {
                node.children.push(trace);
            }
        }
        for doc in &batch.traceability.consumption_docs {
            if doc.kind == ConsumptionKind::SalesOrder {
                if let Some(customer) = &doc.customer {
                    node.customers.push(CustomerTouch {
                        customer: customer.clone(),
                        doc_no: doc.doc_no.clone(),
                        quantity: doc.quantity,
                        occurred_at: doc.occurred_at,
                    });
                }
            }
        }
    }

    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::batch::{
        BatchQuantity, BatchStatus, ChildLink, ConsumptionDoc, ParentLink, QualityInfo,
        Traceability,
    };

    fn bare_batch(batch_no: &str) -> Batch {
        let now = Utc::now();
        Batch {
            batch_no: batch_no.to_string(),
            item_code: "VEG-001".to_string(),
            item_name: String::new(),
            quantity: BatchQuantity {
                initial: 100,
                current: 100,
                reserved: 0,
                available: 100,
                unit: "KG".to_string(),
            },
            status: BatchStatus::Active,
            production_date: now,
            expiry_date: None,
            location: None,
            quality: QualityInfo::default(),
            traceability: Traceability::default(),
            transactions: Vec::new(),
            alerts: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    fn link_parent(child: &mut Batch, parent_no: &str) {
        child.traceability.parent_batches.push(ParentLink {
            batch_no: parent_no.to_string(),
            item_code: "VEG-001".to_string(),
            quantity: 50,
            consumed_at: Utc::now(),
        });
    }

    fn link_child(parent: &mut Batch, child_no: &str) {
        parent.traceability.child_batches.push(ChildLink {
            batch_no: child_no.to_string(),
            quantity: 50,
            created_at: Utc::now(),
        });
    }

    #[test]
    fn upstream_respects_the_level_bound() {
        let mut a = bare_batch("A");
        let mut b = bare_batch("B");
        let mut c = bare_batch("C");
        link_parent(&mut c, "B");
        link_parent(&mut b, "A");
        link_child(&mut a, "B");
        link_child(&mut b, "C");

        let batches: HashMap<_, _> = [a, b, c]
            .into_iter()
            .map(|batch| (batch.batch_no.clone(), batch))
            .collect();

        let shallow = trace_upstream(&batches, "C", 1).unwrap();
        assert_eq!(shallow.parents.len(), 1);
        assert_eq!(shallow.parents[0].batch_no, "B");
        assert!(shallow.parents[0].parents.is_empty());

        let deep = trace_upstream(&batches, "C", 3).unwrap();
        assert_eq!(deep.parents[0].parents[0].batch_no, "A");
    }

    #[test]
    fn cyclic_genealogy_terminates() {
        let mut a = bare_batch("A");
        let mut b = bare_batch("B");
        link_parent(&mut a, "B");
        link_parent(&mut b, "A");

        let batches: HashMap<_, _> = [a, b]
            .into_iter()
            .map(|batch| (batch.batch_no.clone(), batch))
            .collect();

        // Would recurse forever without the visited set.
        let trace = trace_upstream(&batches, "A", 10).unwrap();
        assert_eq!(trace.parents.len(), 1);
        let b_node = &trace.parents[0];
        assert_eq!(b_node.batch_no, "B");
        // A is already visited, so B's parent list cuts off there.
        assert_eq!(b_node.parents.len(), 1);
        assert!(b_node.parents[0].parents.is_empty());
    }

    #[test]
    fn downstream_collects_customers_from_sales_consumption() {
        let mut a = bare_batch("A");
        a.traceability.consumption_docs.push(ConsumptionDoc {
            kind: ConsumptionKind::SalesOrder,
            doc_no: "SO-100".to_string(),
            customer: Some("Green Grocer".to_string()),
            quantity: 25,
            occurred_at: Utc::now(),
        });
        link_child(&mut a, "B");
        let b = bare_batch("B");

        let batches: HashMap<_, _> = [a, b]
            .into_iter()
            .map(|batch| (batch.batch_no.clone(), batch))
            .collect();

        let trace = trace_downstream(&batches, "A", 2).unwrap();
        assert_eq!(trace.children.len(), 1);
        assert_eq!(trace.customers.len(), 1);
        assert_eq!(trace.customers[0].customer, "Green Grocer");
        assert_eq!(trace.customers[0].doc_no, "SO-100");
    }

    #[test]
    fn unknown_batch_is_reported() {
        let batches = HashMap::new();
        let err = trace_upstream(&batches, "missing", 3).unwrap_err();
        assert!(matches!(err, DomainError::BatchNotFound(_)));
    }
}
