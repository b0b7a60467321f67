//! Inventory reservation aggregate.

use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId, VariantId};
use serde::{Deserialize, Serialize};

use super::{ReservationError, ReservationStatus};

/// A single reserved line: variant plus requested quantity. Immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationItem {
    pub variant_id: VariantId,
    pub quantity: u32,
}

impl ReservationItem {
    /// Creates a new reservation item.
    pub fn new(variant_id: VariantId, quantity: u32) -> Self {
        Self {
            variant_id,
            quantity,
        }
    }
}

/// Tracks a soft reservation of inventory items for an order, with expiry.
///
/// Exactly one reservation exists per order. Closed reservations are kept
/// as audit records rather than deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReservation {
    id: ReservationId,
    order_id: OrderId,
    items: Vec<ReservationItem>,
    status: ReservationStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl InventoryReservation {
    /// Creates a pending reservation for an order.
    pub fn pending(
        order_id: OrderId,
        items: Vec<ReservationItem>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ReservationId::new(),
            order_id,
            items,
            status: ReservationStatus::Pending,
            created_at: now,
            updated_at: now,
            expires_at,
        }
    }

    pub fn id(&self) -> ReservationId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Returns the reserved lines in command order.
    pub fn items(&self) -> &[ReservationItem] {
        &self.items
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Marks the reservation reserved after every item's stock lock succeeded.
    pub fn mark_reserved(&mut self) -> Result<(), ReservationError> {
        if !self.status.can_reserve() {
            return Err(ReservationError::InvalidStatusTransition {
                current: self.status,
                action: "mark reserved",
            });
        }
        self.status = ReservationStatus::Reserved;
        self.touch();
        Ok(())
    }

    /// Confirms the reservation on payment success.
    pub fn confirm(&mut self) -> Result<(), ReservationError> {
        if !self.status.can_confirm() {
            return Err(ReservationError::InvalidStatusTransition {
                current: self.status,
                action: "confirm",
            });
        }
        self.status = ReservationStatus::Confirmed;
        self.touch();
        Ok(())
    }

    /// Releases the reservation (cancellation, verification failure, refund).
    pub fn release(&mut self) -> Result<(), ReservationError> {
        if !self.status.can_release() {
            return Err(ReservationError::InvalidStatusTransition {
                current: self.status,
                action: "release",
            });
        }
        self.status = ReservationStatus::Released;
        self.touch();
        Ok(())
    }

    /// Expires the reservation; driven by the external scheduler queue.
    pub fn expire(&mut self) -> Result<(), ReservationError> {
        if !self.status.can_release() {
            return Err(ReservationError::InvalidStatusTransition {
                current: self.status,
                action: "expire",
            });
        }
        self.status = ReservationStatus::Expired;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
