//! Inventory command and event payloads.
//!
//! Commands arrive as JSON on one queue per action; the action itself is a
//! tagged value dispatched through an explicit match, not inferred from any
//! framework binding.

use chrono::{DateTime, Utc};
use common::{OrderId, VariantId};
use serde::{Deserialize, Serialize};

/// Idempotency scope for the inventory command queues.
pub const SCOPE_INVENTORY: &str = "amqp:inventory";
/// Idempotency scope for the payment event queue.
pub const SCOPE_PAYMENTS: &str = "amqp:payments";

/// Which inventory command a queue carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryAction {
    Reserve,
    Confirm,
    Release,
}

impl InventoryAction {
    /// The queue this action is consumed from.
    pub fn queue(&self) -> &'static str {
        match self {
            InventoryAction::Reserve => messaging::topology::Q_INVENTORY_RESERVE,
            InventoryAction::Confirm => messaging::topology::Q_INVENTORY_CONFIRM,
            InventoryAction::Release => messaging::topology::Q_INVENTORY_RELEASE,
        }
    }

    /// The routing key commands for this action are published with.
    pub fn routing_key(&self) -> &'static str {
        match self {
            InventoryAction::Reserve => messaging::topology::RK_INVENTORY_RESERVE,
            InventoryAction::Confirm => messaging::topology::RK_INVENTORY_CONFIRM,
            InventoryAction::Release => messaging::topology::RK_INVENTORY_RELEASE,
        }
    }
}

/// One line of a reserve command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveItem {
    pub variant_id: VariantId,
    pub quantity: u32,
}

/// `inventory.reserve.request` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveCommand {
    pub order_id: OrderId,
    pub items: Vec<ReserveItem>,
    pub expires_at: DateTime<Utc>,
}

/// `inventory.confirm.request` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmCommand {
    pub order_id: OrderId,
}

/// `inventory.release.request` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseCommand {
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Why a reservation is being released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseReason {
    VerificationFailed,
    PaymentFailed,
    Refunded,
    Expired,
}

impl ReleaseReason {
    /// Wire representation of the reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseReason::VerificationFailed => "VERIFICATION_FAILED",
            ReleaseReason::PaymentFailed => "PAYMENT_FAILED",
            ReleaseReason::Refunded => "REFUNDED",
            ReleaseReason::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One rejected line of the `inventory.rejected` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedItem {
    pub variant_id: VariantId,
    pub requested: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_command_wire_shape() {
        let order_id = OrderId::new();
        let variant_id = VariantId::new();
        let json = serde_json::json!({
            "order_id": order_id.to_string(),
            "items": [{"variant_id": variant_id.to_string(), "quantity": 2}],
            "expires_at": "2026-01-01T00:00:00Z",
        });

        let cmd: ReserveCommand = serde_json::from_value(json).unwrap();
        assert_eq!(cmd.order_id, order_id);
        assert_eq!(cmd.items.len(), 1);
        assert_eq!(cmd.items[0].variant_id, variant_id);
        assert_eq!(cmd.items[0].quantity, 2);
    }

    #[test]
    fn test_release_command_reason_is_optional() {
        let json = serde_json::json!({"order_id": OrderId::new().to_string()});
        let cmd: ReleaseCommand = serde_json::from_value(json).unwrap();
        assert!(cmd.reason.is_none());
    }

    #[test]
    fn test_release_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&ReleaseReason::VerificationFailed).unwrap(),
            "\"VERIFICATION_FAILED\""
        );
        assert_eq!(ReleaseReason::Refunded.to_string(), "REFUNDED");
    }

    #[test]
    fn test_action_queue_and_routing_key() {
        assert_eq!(InventoryAction::Reserve.queue(), "q.inventory.reservation");
        assert_eq!(
            InventoryAction::Reserve.routing_key(),
            "inventory.reserve.request"
        );
        assert_eq!(InventoryAction::Confirm.queue(), "q.inventory.confirm");
        assert_eq!(InventoryAction::Release.queue(), "q.inventory.release");
    }

    #[test]
    fn test_reserve_command_missing_expiry_is_an_error() {
        let json = serde_json::json!({
            "order_id": OrderId::new().to_string(),
            "items": [],
        });
        assert!(serde_json::from_value::<ReserveCommand>(json).is_err());
    }
}
