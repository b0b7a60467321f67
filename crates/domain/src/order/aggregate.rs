//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CartId, OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{Money, OrderError, OrderStatus, ShippingDetails};

/// Order aggregate capturing checkout intent and payment lifecycle.
///
/// The order is created by checkout (an external collaborator) in
/// `PendingPayment` and reaches a settlement-terminal status here. All
/// mutation goes through the named transition methods; callers never set
/// the status directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    cart_id: CartId,
    total: Money,
    status: OrderStatus,
    shipping: Option<ShippingDetails>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order awaiting payment.
    pub fn pending(user_id: UserId, cart_id: CartId, total: Money) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            user_id,
            cart_id,
            total,
            status: OrderStatus::PendingPayment,
            shipping: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstructs an order from persisted state.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: OrderId,
        user_id: UserId,
        cart_id: CartId,
        total: Money,
        status: OrderStatus,
        shipping: Option<ShippingDetails>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            cart_id,
            total,
            status,
            shipping,
            created_at,
            updated_at,
        }
    }

    /// Returns the order ID.
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Returns the owning user's ID.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the originating cart's ID.
    pub fn cart_id(&self) -> CartId {
        self.cart_id
    }

    /// Returns the items total (excluding shipping).
    pub fn total(&self) -> &Money {
        &self.total
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns the persisted shipping details, if any.
    pub fn shipping(&self) -> Option<&ShippingDetails> {
        self.shipping.as_ref()
    }

    /// Returns the persisted shipping amount in minor units, if known.
    pub fn shipping_amount_minor(&self) -> Option<i64> {
        self.shipping.as_ref().and_then(|s| s.amount_minor)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Marks the order paid. Allowed only from `PendingPayment`.
    pub fn mark_paid(&mut self) -> Result<(), OrderError> {
        if !self.status.can_mark_paid() {
            return Err(OrderError::InvalidStatusTransition {
                current: self.status,
                action: "mark paid",
            });
        }
        self.status = OrderStatus::Paid;
        self.touch();
        Ok(())
    }

    /// Marks the payment failed. Not allowed once paid or refunded.
    pub fn mark_payment_failed(&mut self) -> Result<(), OrderError> {
        if !self.status.can_mark_payment_failed() {
            return Err(OrderError::InvalidStatusTransition {
                current: self.status,
                action: "mark payment failed",
            });
        }
        self.status = OrderStatus::PaymentFailed;
        self.touch();
        Ok(())
    }

    /// Marks the order refunded. Allowed only from `Paid`.
    pub fn mark_refunded(&mut self) -> Result<(), OrderError> {
        if !self.status.can_mark_refunded() {
            return Err(OrderError::InvalidStatusTransition {
                current: self.status,
                action: "mark refunded",
            });
        }
        self.status = OrderStatus::Refunded;
        self.touch();
        Ok(())
    }

    /// Cancels the order. Not allowed once paid or refunded.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidStatusTransition {
                current: self.status,
                action: "cancel",
            });
        }
        self.status = OrderStatus::Cancelled;
        self.touch();
        Ok(())
    }

    /// Replaces the shipping details.
    ///
    /// Allowed in any status: a `checkout.session.completed` event may arrive
    /// after a payment-intent event already settled the order, and the
    /// shipping block it carries must still be persisted.
    pub fn set_shipping(&mut self, shipping: ShippingDetails) {
        self.shipping = Some(shipping);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
