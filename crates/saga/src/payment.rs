//! Payment event reconciler.
//!
//! Consumes normalized payment events, verifies amounts, drives order
//! status transitions and emits the compensating inventory commands plus
//! email jobs. Ordering across queues is not guaranteed, so every branch
//! checks the order's current status before acting; an event arriving in
//! the wrong status is a silent no-op, not an error.

use async_trait::async_trait;
use common::OrderId;
use domain::OrderStatus;
use messaging::topology::EX_INVENTORY_COMMANDS;
use messaging::{InboundMessage, MessageHandler, MessagingError, OutboxStore, ProcessedEventStore};

use crate::commands::{ReleaseReason, SCOPE_PAYMENTS};
use crate::email::EmailJob;
use crate::envelope::PaymentEventEnvelope;
use crate::error::{Result, SagaError};
use crate::ports::{AuditLog, CartRepository, EmailEnqueuer, OrderRepository, UserDirectory};

/// Reconciles payment events with order state.
///
/// Idempotency-gated on the gateway event id when present, else the broker
/// message id; a delivery carrying neither is processed unguarded.
pub struct PaymentReconciler<O, C, U, X, P, A, E> {
    orders: O,
    carts: C,
    users: U,
    outbox: X,
    processed: P,
    audit: A,
    email: E,
}

impl<O, C, U, X, P, A, E> PaymentReconciler<O, C, U, X, P, A, E>
where
    O: OrderRepository,
    C: CartRepository,
    U: UserDirectory,
    X: OutboxStore,
    P: ProcessedEventStore,
    A: AuditLog,
    E: EmailEnqueuer,
{
    /// Creates a new reconciler.
    pub fn new(orders: O, carts: C, users: U, outbox: X, processed: P, audit: A, email: E) -> Self {
        Self {
            orders,
            carts,
            users,
            outbox,
            processed,
            audit,
            email,
        }
    }

    /// Processes one payment event delivery.
    #[tracing::instrument(skip(self, msg), fields(queue = %msg.queue))]
    pub async fn process(&self, msg: &InboundMessage) -> Result<()> {
        let envelope: PaymentEventEnvelope = msg.json()?;

        let Some(order_id_str) = envelope
            .order_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        else {
            // No order context; ignore.
            return Ok(());
        };

        let key = envelope
            .stripe_event_id
            .clone()
            .or_else(|| msg.message_id.clone());
        if let Some(key) = &key {
            if self.processed.already_processed(SCOPE_PAYMENTS, key).await? {
                return Ok(());
            }
        }

        let order_id = OrderId::parse(order_id_str)
            .map_err(|e| SagaError::InvalidPayload(format!("order_id: {e}")))?;
        let Some(mut order) = self.orders.find(order_id).await? else {
            // Unknown order; acknowledged and dropped.
            return Ok(());
        };

        // Always persist shipping from session-completed events, even past
        // PENDING_PAYMENT: a payment-intent event may have settled the order
        // before the session event carrying the shipping block arrived.
        if envelope.is_session_completed() && envelope.has_shipping_fields() {
            order.set_shipping(envelope.shipping_details());
            self.orders.save(&order).await?;
        }

        if envelope.is_success() {
            if order.status() == OrderStatus::PendingPayment
                && !self.settle(&mut order, &envelope).await?
            {
                // Verification failed: acknowledged but deliberately not
                // marked processed; a replay re-runs and no-ops on the
                // now-failed status.
                return Ok(());
            }
        } else if envelope.is_refund() {
            if order.status() == OrderStatus::Paid {
                self.refund(&mut order, &envelope).await?;
            }
        } else if envelope.is_failure() {
            if order.status() == OrderStatus::PendingPayment {
                self.fail(&mut order).await?;
            }
        }

        if let Some(key) = &key {
            self.processed.mark_processed(SCOPE_PAYMENTS, key).await?;
        }
        Ok(())
    }

    /// Verifies the amount and either settles the order or compensates.
    /// Returns false when verification failed and the delivery should not
    /// be marked processed.
    async fn settle(
        &self,
        order: &mut domain::Order,
        envelope: &PaymentEventEnvelope,
    ) -> Result<bool> {
        let order_id = order.id();
        let expected_items_minor = order.total().minor();
        let event_shipping_minor = envelope.shipping_amount_minor;
        let persisted_shipping_minor = order.shipping_amount_minor();
        let expected_shipping_minor = event_shipping_minor
            .or(persisted_shipping_minor)
            .unwrap_or(0);
        let have_shipping_info =
            event_shipping_minor.is_some() || persisted_shipping_minor.is_some();
        let expected_total_minor = expected_items_minor + expected_shipping_minor;

        let ok_amount = match envelope.amount_minor {
            None => true, // nothing to verify
            // Shipping unknown to both sides: defer the strict check to a
            // later session-completed event.
            Some(_) if !have_shipping_info => true,
            Some(amount) => amount == expected_total_minor,
        };
        let ok_currency = envelope
            .currency
            .as_deref()
            .map(|c| order.total().currency().matches(c))
            .unwrap_or(true);

        if !(ok_amount && ok_currency) {
            order.mark_payment_failed()?;
            self.orders.save(order).await?;
            self.enqueue_release(order_id, ReleaseReason::VerificationFailed)
                .await?;
            self.audit
                .record(
                    "payment_verification_failed",
                    serde_json::json!({
                        "order_id": order_id,
                        "expected_minor": expected_total_minor,
                        "got_minor": envelope.amount_minor,
                        "currency": envelope.currency,
                    }),
                )
                .await?;
            metrics::counter!("payment_verification_fail").increment(1);
            tracing::warn!(
                %order_id,
                stripe_event_id = ?envelope.stripe_event_id,
                "payment_verification_failed"
            );
            return Ok(false);
        }

        if envelope.has_shipping_fields() {
            order.set_shipping(envelope.shipping_details());
        }
        order.mark_paid()?;
        self.orders.save(order).await?;

        // Reservation is looked up by order id downstream.
        self.outbox
            .enqueue(
                EX_INVENTORY_COMMANDS,
                "inventory.confirm.request",
                serde_json::json!({"order_id": order_id}),
                serde_json::json!({"order_id": order_id}),
            )
            .await?;

        if let Some(mut cart) = self.carts.find(order.cart_id()).await? {
            cart.checkout();
            self.carts.save(&cart).await?;
        }

        self.audit
            .record(
                "payment_verified",
                serde_json::json!({
                    "order_id": order_id,
                    "stripe_event_id": envelope.stripe_event_id,
                    "amount_minor": envelope.amount_minor.unwrap_or(expected_total_minor),
                    "currency": envelope
                        .currency
                        .clone()
                        .unwrap_or_else(|| order.total().currency().as_str().to_string()),
                }),
            )
            .await?;
        metrics::counter!("payment_success").increment(1);
        tracing::info!(%order_id, "payment_succeeded");

        if let Some(user) = self.users.find(order.user_id()).await? {
            self.email
                .enqueue(EmailJob::OrderPaid {
                    to: user.email,
                    order_id,
                    amount_minor: expected_total_minor,
                    currency: order.total().currency().as_str().to_string(),
                })
                .await?;
        }
        Ok(true)
    }

    async fn refund(
        &self,
        order: &mut domain::Order,
        envelope: &PaymentEventEnvelope,
    ) -> Result<()> {
        let order_id = order.id();
        order.mark_refunded()?;
        self.orders.save(order).await?;
        self.enqueue_release(order_id, ReleaseReason::Refunded).await?;
        self.audit
            .record("payment_refunded", serde_json::json!({"order_id": order_id}))
            .await?;
        metrics::counter!("payment_refund").increment(1);
        tracing::info!(%order_id, stripe_event_id = ?envelope.stripe_event_id, "payment_refunded");

        if let Some(user) = self.users.find(order.user_id()).await? {
            self.email
                .enqueue(EmailJob::OrderRefunded {
                    to: user.email,
                    order_id,
                    amount_minor: order.total().minor(),
                    currency: order.total().currency().as_str().to_string(),
                })
                .await?;
        }
        Ok(())
    }

    async fn fail(&self, order: &mut domain::Order) -> Result<()> {
        let order_id = order.id();
        order.mark_payment_failed()?;
        self.orders.save(order).await?;
        self.enqueue_release(order_id, ReleaseReason::PaymentFailed)
            .await?;
        self.audit
            .record("payment_failed", serde_json::json!({"order_id": order_id}))
            .await?;
        metrics::counter!("payment_failed").increment(1);
        tracing::warn!(%order_id, "payment_failed");

        if let Some(user) = self.users.find(order.user_id()).await? {
            self.email
                .enqueue(EmailJob::PaymentFailed {
                    to: user.email,
                    order_id,
                    reason: ReleaseReason::PaymentFailed.as_str().to_string(),
                })
                .await?;
        }
        Ok(())
    }

    async fn enqueue_release(&self, order_id: OrderId, reason: ReleaseReason) -> Result<()> {
        let payload = serde_json::json!({
            "order_id": order_id,
            "reason": reason.as_str(),
        });
        self.outbox
            .enqueue(
                EX_INVENTORY_COMMANDS,
                "inventory.release.request",
                payload.clone(),
                payload,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<O, C, U, X, P, A, E> MessageHandler for PaymentReconciler<O, C, U, X, P, A, E>
where
    O: OrderRepository,
    C: CartRepository,
    U: UserDirectory,
    X: OutboxStore,
    P: ProcessedEventStore,
    A: AuditLog,
    E: EmailEnqueuer,
{
    async fn handle(&self, msg: &InboundMessage) -> messaging::Result<()> {
        self.process(msg)
            .await
            .map_err(|e| MessagingError::Handler(e.to_string()))
    }
}
