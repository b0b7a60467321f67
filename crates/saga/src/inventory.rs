//! Inventory reservation command handler.
//!
//! Consumes reserve/confirm/release commands from their queues and drives
//! the reservation state machine against the atomic stock port. Handler
//! errors dead-letter the message immediately; this queue family has no
//! retry ladder.

use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::{InventoryReservation, ReservationItem, ReservationStatus};
use messaging::topology::EX_INVENTORY_EVENTS;
use messaging::{InboundMessage, MessageHandler, MessagingError, OutboxStore, ProcessedEventStore};
use uuid::Uuid;

use crate::commands::{
    ConfirmCommand, InventoryAction, RejectedItem, ReleaseCommand, ReserveCommand,
    SCOPE_INVENTORY,
};
use crate::error::Result;
use crate::ports::{AuditLog, ReservationRepository, StockAdjuster};

/// Handles the three inventory commands.
///
/// Each command is idempotency-gated on the broker message id: a redelivered
/// command acknowledges without side effects. The gate is marked only after
/// successful handling, so a crash mid-way retries the delivery. The
/// status guards on the aggregate make the retry safe for confirm/release,
/// while reserve may re-attempt per-item locks (see the pinning tests).
pub struct InventoryCommandHandler<R, S, O, P, A> {
    reservations: R,
    stock: S,
    outbox: O,
    processed: P,
    audit: A,
}

impl<R, S, O, P, A> InventoryCommandHandler<R, S, O, P, A>
where
    R: ReservationRepository,
    S: StockAdjuster,
    O: OutboxStore,
    P: ProcessedEventStore,
    A: AuditLog,
{
    /// Creates a new handler.
    pub fn new(reservations: R, stock: S, outbox: O, processed: P, audit: A) -> Self {
        Self {
            reservations,
            stock,
            outbox,
            processed,
            audit,
        }
    }

    /// Handles one delivery for the given action.
    #[tracing::instrument(skip(self, msg), fields(queue = %msg.queue))]
    pub async fn handle(&self, action: InventoryAction, msg: &InboundMessage) -> Result<()> {
        let message_id = msg
            .message_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if self
            .processed
            .already_processed(SCOPE_INVENTORY, &message_id)
            .await?
        {
            return Ok(());
        }

        let payload: serde_json::Value = msg.json()?;
        if payload.get("order_id").and_then(|v| v.as_str()).is_none() {
            // No order context; drop the message.
            return Ok(());
        }

        match action {
            InventoryAction::Reserve => {
                let cmd: ReserveCommand = serde_json::from_value(payload)?;
                self.reserve(cmd).await?;
            }
            InventoryAction::Confirm => {
                let cmd: ConfirmCommand = serde_json::from_value(payload)?;
                self.confirm(cmd.order_id).await?;
            }
            InventoryAction::Release => {
                let cmd: ReleaseCommand = serde_json::from_value(payload)?;
                self.release(cmd.order_id, cmd.reason).await?;
            }
        }

        self.processed
            .mark_processed(SCOPE_INVENTORY, &message_id)
            .await?;
        Ok(())
    }

    /// Attempts the per-item stock locks and persists the reservation as
    /// RESERVED only when every lock succeeded. Locks taken before a later
    /// item failed are not rolled back.
    async fn reserve(&self, cmd: ReserveCommand) -> Result<()> {
        let order_id = cmd.order_id;
        let items: Vec<ReservationItem> = cmd
            .items
            .iter()
            .filter(|item| item.quantity > 0)
            .map(|item| ReservationItem::new(item.variant_id, item.quantity))
            .collect();

        let mut reservation =
            InventoryReservation::pending(order_id, items.clone(), cmd.expires_at);

        let mut rejected = Vec::new();
        for item in &items {
            if !self.stock.try_reserve(item.variant_id, item.quantity).await? {
                rejected.push(RejectedItem {
                    variant_id: item.variant_id,
                    requested: item.quantity,
                });
            }
        }

        if rejected.is_empty() {
            reservation.mark_reserved()?;
            self.reservations.save(&reservation).await?;
            self.outbox
                .enqueue(
                    EX_INVENTORY_EVENTS,
                    "inventory.reserved",
                    serde_json::json!({"order_id": order_id}),
                    serde_json::json!({"order_id": order_id}),
                )
                .await?;
            self.audit
                .record("inventory_reserved", serde_json::json!({"order_id": order_id}))
                .await?;
            metrics::counter!("reserve_success").increment(1);
            tracing::info!(%order_id, "inventory_reserved");
        } else {
            self.outbox
                .enqueue(
                    EX_INVENTORY_EVENTS,
                    "inventory.rejected",
                    serde_json::json!({"order_id": order_id}),
                    serde_json::json!({
                        "order_id": order_id,
                        "rejected_items": rejected,
                    }),
                )
                .await?;
            self.audit
                .record(
                    "inventory_rejected",
                    serde_json::json!({"order_id": order_id, "count": rejected.len()}),
                )
                .await?;
            metrics::counter!("reserve_reject").increment(1);
            tracing::warn!(%order_id, count = rejected.len(), "inventory_rejected");
        }
        Ok(())
    }

    /// Decrements reserved and total stock, only when the reservation is
    /// RESERVED. Missing reservation or any other status is a no-op.
    async fn confirm(&self, order_id: OrderId) -> Result<()> {
        let Some(mut reservation) = self.reservations.find_by_order(order_id).await? else {
            self.skipped("inventory_confirm_skipped", order_id).await?;
            return Ok(());
        };
        if reservation.status() != ReservationStatus::Reserved {
            self.skipped("inventory_confirm_skipped", order_id).await?;
            return Ok(());
        }

        for item in reservation.items().to_vec() {
            self.stock
                .decrement_reserved(item.variant_id, item.quantity)
                .await?;
            self.stock
                .decrement_total_stock(item.variant_id, item.quantity)
                .await?;
        }
        reservation.confirm()?;
        self.reservations.save(&reservation).await?;

        self.outbox
            .enqueue(
                EX_INVENTORY_EVENTS,
                "inventory.confirmed",
                serde_json::json!({"order_id": order_id}),
                serde_json::json!({"order_id": order_id}),
            )
            .await?;
        self.audit
            .record("inventory_confirmed", serde_json::json!({"order_id": order_id}))
            .await?;
        metrics::counter!("reserve_confirm").increment(1);
        tracing::info!(%order_id, "inventory_confirmed");
        Ok(())
    }

    /// Decrements the reserved counter only (total stock untouched), when
    /// the reservation is PENDING or RESERVED. No-op otherwise.
    async fn release(&self, order_id: OrderId, reason: Option<String>) -> Result<()> {
        let Some(mut reservation) = self.reservations.find_by_order(order_id).await? else {
            self.skipped("inventory_release_skipped", order_id).await?;
            return Ok(());
        };
        if !reservation.status().can_release() {
            self.skipped("inventory_release_skipped", order_id).await?;
            return Ok(());
        }

        for item in reservation.items().to_vec() {
            self.stock
                .decrement_reserved(item.variant_id, item.quantity)
                .await?;
        }
        reservation.release()?;
        self.reservations.save(&reservation).await?;

        let payload = serde_json::json!({"order_id": order_id, "reason": reason});
        self.outbox
            .enqueue(EX_INVENTORY_EVENTS, "inventory.released", payload.clone(), payload)
            .await?;
        self.audit
            .record(
                "inventory_released",
                serde_json::json!({"order_id": order_id, "reason": reason}),
            )
            .await?;
        metrics::counter!("reserve_release").increment(1);
        tracing::info!(%order_id, ?reason, "inventory_released");
        Ok(())
    }

    async fn skipped(&self, kind: &str, order_id: OrderId) -> Result<()> {
        self.audit
            .record(kind, serde_json::json!({"order_id": order_id}))
            .await?;
        metrics::counter!("reserve_noop").increment(1);
        Ok(())
    }
}

/// Binds one inventory queue to the shared command handler.
pub struct InventoryQueueSubscriber<R, S, O, P, A> {
    handler: Arc<InventoryCommandHandler<R, S, O, P, A>>,
    action: InventoryAction,
}

impl<R, S, O, P, A> InventoryQueueSubscriber<R, S, O, P, A> {
    /// Creates a subscriber dispatching to the given action.
    pub fn new(
        handler: Arc<InventoryCommandHandler<R, S, O, P, A>>,
        action: InventoryAction,
    ) -> Self {
        Self { handler, action }
    }
}

#[async_trait]
impl<R, S, O, P, A> MessageHandler for InventoryQueueSubscriber<R, S, O, P, A>
where
    R: ReservationRepository,
    S: StockAdjuster,
    O: OutboxStore,
    P: ProcessedEventStore,
    A: AuditLog,
{
    async fn handle(&self, msg: &InboundMessage) -> messaging::Result<()> {
        self.handler
            .handle(self.action, msg)
            .await
            .map_err(|e| MessagingError::Handler(e.to_string()))
    }
}
