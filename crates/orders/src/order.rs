use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agroerp_core::{DomainError, DomainResult, ItemId, OrderId, WarehouseId};

/// Order status lifecycle as seen from the inventory side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Terminal orders no longer justify holding stock.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// One demand line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub item_id: ItemId,
    pub quantity: i64,
}

/// Order snapshot exposed by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub warehouse_id: WarehouseId,
    pub order_date: DateTime<Utc>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub priority: u8,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Total quantity demanded for one item across lines.
    pub fn demand_for(&self, item_id: ItemId) -> i64 {
        self.items
            .iter()
            .filter(|line| line.item_id == item_id)
            .map(|line| line.quantity)
            .sum()
    }
}

/// Directory of orders (contract only; the implementation lives with the
/// order module, outside this bounded context).
pub trait OrderDirectory: Send + Sync {
    fn get_order_detail(&self, id: OrderId) -> DomainResult<Order>;

    /// Bulk lookup; unknown ids are simply absent from the result.
    fn get_orders_by_ids(&self, ids: &[OrderId]) -> Vec<Order>;

    fn update_order_status(&self, id: OrderId, status: OrderStatus) -> DomainResult<()>;

    /// Non-terminal orders demanding the given item.
    fn open_orders_for_item(&self, item_id: ItemId) -> Vec<Order>;

    /// Quantity demanded by open, not-yet-confirmed orders for the key.
    fn pending_order_quantity(&self, item_id: ItemId, warehouse_id: WarehouseId) -> i64;

    /// Bump an order's priority (used when scarce stock threatens it).
    fn raise_priority(&self, id: OrderId) -> DomainResult<()>;
}

impl<D> OrderDirectory for std::sync::Arc<D>
where
    D: OrderDirectory + ?Sized,
{
    fn get_order_detail(&self, id: OrderId) -> DomainResult<Order> {
        (**self).get_order_detail(id)
    }

    fn get_orders_by_ids(&self, ids: &[OrderId]) -> Vec<Order> {
        (**self).get_orders_by_ids(ids)
    }

    fn update_order_status(&self, id: OrderId, status: OrderStatus) -> DomainResult<()> {
        (**self).update_order_status(id, status)
    }

    fn open_orders_for_item(&self, item_id: ItemId) -> Vec<Order> {
        (**self).open_orders_for_item(item_id)
    }

    fn pending_order_quantity(&self, item_id: ItemId, warehouse_id: WarehouseId) -> i64 {
        (**self).pending_order_quantity(item_id, warehouse_id)
    }

    fn raise_priority(&self, id: OrderId) -> DomainResult<()> {
        (**self).raise_priority(id)
    }
}

/// In-memory order directory for wiring and tests.
#[derive(Debug, Default)]
pub struct InMemoryOrderDirectory {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: Order) {
        if let Ok(mut orders) = self.orders.write() {
            orders.insert(order.id, order);
        }
    }

    pub fn remove(&self, id: OrderId) -> Option<Order> {
        self.orders.write().ok()?.remove(&id)
    }
}

impl OrderDirectory for InMemoryOrderDirectory {
    fn get_order_detail(&self, id: OrderId) -> DomainResult<Order> {
        self.orders
            .read()
            .map_err(|_| DomainError::conflict("order directory lock poisoned"))?
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::validation(format!("order {id} not found")))
    }

    fn get_orders_by_ids(&self, ids: &[OrderId]) -> Vec<Order> {
        let Ok(orders) = self.orders.read() else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| orders.get(id).cloned()).collect()
    }

    fn update_order_status(&self, id: OrderId, status: OrderStatus) -> DomainResult<()> {
        let mut orders = self
            .orders
            .write()
            .map_err(|_| DomainError::conflict("order directory lock poisoned"))?;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| DomainError::validation(format!("order {id} not found")))?;
        order.status = status;
        Ok(())
    }

    fn open_orders_for_item(&self, item_id: ItemId) -> Vec<Order> {
        let Ok(orders) = self.orders.read() else {
            return Vec::new();
        };
        orders
            .values()
            .filter(|o| !o.status.is_terminal() && o.demand_for(item_id) > 0)
            .cloned()
            .collect()
    }

    fn pending_order_quantity(&self, item_id: ItemId, warehouse_id: WarehouseId) -> i64 {
        let Ok(orders) = self.orders.read() else {
            return 0;
        };
        orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.warehouse_id == warehouse_id)
            .map(|o| o.demand_for(item_id))
            .sum()
    }

    fn raise_priority(&self, id: OrderId) -> DomainResult<()> {
        let mut orders = self
            .orders
            .write()
            .map_err(|_| DomainError::conflict("order directory lock poisoned"))?;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| DomainError::validation(format!("order {id} not found")))?;
        order.priority = order.priority.saturating_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus, item_id: ItemId, quantity: i64) -> Order {
        Order {
            id: OrderId::new(),
            status,
            warehouse_id: WarehouseId::new(),
            order_date: Utc::now(),
            delivery_date: None,
            priority: 0,
            items: vec![OrderItem { item_id, quantity }],
        }
    }

    #[test]
    fn open_orders_excludes_terminal_statuses() {
        let directory = InMemoryOrderDirectory::new();
        let item_id = ItemId::new();
        directory.insert(order(OrderStatus::Pending, item_id, 5));
        directory.insert(order(OrderStatus::Cancelled, item_id, 5));

        assert_eq!(directory.open_orders_for_item(item_id).len(), 1);
    }

    #[test]
    fn pending_quantity_only_counts_pending_orders_in_warehouse() {
        let directory = InMemoryOrderDirectory::new();
        let item_id = ItemId::new();
        let pending = order(OrderStatus::Pending, item_id, 7);
        let warehouse_id = pending.warehouse_id;
        directory.insert(pending);
        directory.insert(order(OrderStatus::Confirmed, item_id, 3));

        assert_eq!(directory.pending_order_quantity(item_id, warehouse_id), 7);
    }

    #[test]
    fn raise_priority_saturates() {
        let directory = InMemoryOrderDirectory::new();
        let mut o = order(OrderStatus::Pending, ItemId::new(), 1);
        o.priority = u8::MAX;
        let id = o.id;
        directory.insert(o);

        directory.raise_priority(id).unwrap();
        assert_eq!(directory.get_order_detail(id).unwrap().priority, u8::MAX);
    }
}
