//! Inventory reservation repository port.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::InventoryReservation;

use crate::error::SagaError;

/// Lookup and persistence for reservations, keyed by order.
///
/// Exactly one reservation exists per order; closed reservations are kept
/// as audit records.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Finds the reservation for an order.
    async fn find_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<InventoryReservation>, SagaError>;

    /// Persists the reservation state.
    async fn save(&self, reservation: &InventoryReservation) -> Result<(), SagaError>;
}

/// In-memory reservation repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReservations {
    reservations: Arc<RwLock<HashMap<OrderId, InventoryReservation>>>,
}

impl InMemoryReservations {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a reservation.
    pub fn insert(&self, reservation: InventoryReservation) {
        self.reservations
            .write()
            .unwrap()
            .insert(reservation.order_id(), reservation);
    }

    /// Returns a snapshot of an order's reservation.
    pub fn get(&self, order_id: OrderId) -> Option<InventoryReservation> {
        self.reservations.read().unwrap().get(&order_id).cloned()
    }

    /// Returns the number of stored reservations.
    pub fn count(&self) -> usize {
        self.reservations.read().unwrap().len()
    }
}

#[async_trait]
impl ReservationRepository for InMemoryReservations {
    async fn find_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<InventoryReservation>, SagaError> {
        Ok(self.reservations.read().unwrap().get(&order_id).cloned())
    }

    async fn save(&self, reservation: &InventoryReservation) -> Result<(), SagaError> {
        self.reservations
            .write()
            .unwrap()
            .insert(reservation.order_id(), reservation.clone());
        Ok(())
    }
}
