//! Order settlement state machine.

use serde::{Deserialize, Serialize};

/// The payment-settlement status of an order.
///
/// Status transitions:
/// ```text
/// PendingPayment ──┬──► Paid ──► Refunded
///                  ├──► PaymentFailed
///                  └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Checkout created the order; awaiting payment confirmation.
    #[default]
    PendingPayment,

    /// Payment verified and settled (may still be refunded).
    Paid,

    /// Payment failed or amount verification rejected (terminal state).
    PaymentFailed,

    /// A paid order was refunded (terminal state).
    Refunded,

    /// Order was cancelled before settlement (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order can be marked paid from this status.
    pub fn can_mark_paid(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment)
    }

    /// Returns true if the order can be marked payment-failed from this status.
    pub fn can_mark_payment_failed(&self) -> bool {
        !matches!(self, OrderStatus::Paid | OrderStatus::Refunded)
    }

    /// Returns true if the order can be refunded from this status.
    pub fn can_mark_refunded(&self) -> bool {
        matches!(self, OrderStatus::Paid)
    }

    /// Returns true if the order can be cancelled from this status.
    pub fn can_cancel(&self) -> bool {
        !matches!(self, OrderStatus::Paid | OrderStatus::Refunded)
    }

    /// Returns true if this is a settlement-terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid
                | OrderStatus::PaymentFailed
                | OrderStatus::Refunded
                | OrderStatus::Cancelled
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
            OrderStatus::Refunded => "REFUNDED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
