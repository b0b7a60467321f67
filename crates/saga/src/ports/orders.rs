//! Order repository port.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::Order;

use crate::error::SagaError;

/// Lookup and persistence for orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Finds an order by ID.
    async fn find(&self, order_id: OrderId) -> Result<Option<Order>, SagaError>;

    /// Persists the order state.
    async fn save(&self, order: &Order) -> Result<(), SagaError>;
}

/// In-memory order repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrders {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrders {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an order.
    pub fn insert(&self, order: Order) {
        self.orders.write().unwrap().insert(order.id(), order);
    }

    /// Returns a snapshot of an order.
    pub fn get(&self, order_id: OrderId) -> Option<Order> {
        self.orders.read().unwrap().get(&order_id).cloned()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrders {
    async fn find(&self, order_id: OrderId) -> Result<Option<Order>, SagaError> {
        Ok(self.orders.read().unwrap().get(&order_id).cloned())
    }

    async fn save(&self, order: &Order) -> Result<(), SagaError> {
        self.orders
            .write()
            .unwrap()
            .insert(order.id(), order.clone());
        Ok(())
    }
}
