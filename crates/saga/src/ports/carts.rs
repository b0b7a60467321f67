//! Shopping cart port.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::CartId;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// The slice of the shopping cart this subsystem touches: once payment
/// settles, the originating cart is locked against further edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    id: CartId,
    checked_out: bool,
}

impl Cart {
    /// Creates an open cart.
    pub fn open(id: CartId) -> Self {
        Self {
            id,
            checked_out: false,
        }
    }

    pub fn id(&self) -> CartId {
        self.id
    }

    pub fn is_checked_out(&self) -> bool {
        self.checked_out
    }

    /// Locks the cart. Idempotent.
    pub fn checkout(&mut self) {
        self.checked_out = true;
    }
}

/// Lookup and persistence for carts.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Finds a cart by ID.
    async fn find(&self, cart_id: CartId) -> Result<Option<Cart>, SagaError>;

    /// Persists the cart state.
    async fn save(&self, cart: &Cart) -> Result<(), SagaError>;
}

/// In-memory cart repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCarts {
    carts: Arc<RwLock<HashMap<CartId, Cart>>>,
}

impl InMemoryCarts {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a cart.
    pub fn insert(&self, cart: Cart) {
        self.carts.write().unwrap().insert(cart.id(), cart);
    }

    /// Returns true if the cart exists and is checked out.
    pub fn is_checked_out(&self, cart_id: CartId) -> bool {
        self.carts
            .read()
            .unwrap()
            .get(&cart_id)
            .map(|c| c.is_checked_out())
            .unwrap_or(false)
    }
}

#[async_trait]
impl CartRepository for InMemoryCarts {
    async fn find(&self, cart_id: CartId) -> Result<Option<Cart>, SagaError> {
        Ok(self.carts.read().unwrap().get(&cart_id).cloned())
    }

    async fn save(&self, cart: &Cart) -> Result<(), SagaError> {
        self.carts.write().unwrap().insert(cart.id(), cart.clone());
        Ok(())
    }
}
