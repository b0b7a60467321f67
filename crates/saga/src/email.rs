//! Transactional email jobs.
//!
//! Jobs are emitted through the outbox on `email.exchange` (sharing the
//! local-transaction guarantee with the order mutation that produced them),
//! travel their per-kind queue, and are retried through the delay ladder on
//! send failure.

use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use messaging::topology::EX_EMAIL;
use messaging::{InboundMessage, MessageHandler, MessagingError, OutboxStore};
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::ports::{EmailEnqueuer, EmailSender};

/// Email kinds with a declared queue family, in topology order.
pub const EMAIL_KINDS: &[&str] = &["order_paid", "order_refunded", "payment_failed"];

/// A transactional email job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmailJob {
    OrderPaid {
        to: String,
        order_id: OrderId,
        amount_minor: i64,
        currency: String,
    },
    OrderRefunded {
        to: String,
        order_id: OrderId,
        amount_minor: i64,
        currency: String,
    },
    PaymentFailed {
        to: String,
        order_id: OrderId,
        reason: String,
    },
}

impl EmailJob {
    /// The job kind as it appears in queue names and the wire tag.
    pub fn kind(&self) -> &'static str {
        match self {
            EmailJob::OrderPaid { .. } => "order_paid",
            EmailJob::OrderRefunded { .. } => "order_refunded",
            EmailJob::PaymentFailed { .. } => "payment_failed",
        }
    }

    /// Routing key on the email exchange.
    pub fn routing_key(&self) -> String {
        format!("email.{}", self.kind())
    }

    /// Main queue carrying this kind.
    pub fn queue(&self) -> String {
        format!("{}.q", self.routing_key())
    }

    /// Recipient address.
    pub fn to(&self) -> &str {
        match self {
            EmailJob::OrderPaid { to, .. }
            | EmailJob::OrderRefunded { to, .. }
            | EmailJob::PaymentFailed { to, .. } => to,
        }
    }
}

/// Enqueues email jobs through the transactional outbox.
pub struct OutboxEmailEnqueuer<O> {
    outbox: O,
}

impl<O> OutboxEmailEnqueuer<O>
where
    O: OutboxStore,
{
    /// Creates an enqueuer over the given outbox.
    pub fn new(outbox: O) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl<O> EmailEnqueuer for OutboxEmailEnqueuer<O>
where
    O: OutboxStore,
{
    async fn enqueue(&self, job: EmailJob) -> Result<(), SagaError> {
        let routing_key = job.routing_key();
        let payload = serde_json::to_value(&job)?;
        self.outbox
            .enqueue(EX_EMAIL, &routing_key, serde_json::json!({}), payload)
            .await?;
        metrics::counter!("email_enqueued").increment(1);
        Ok(())
    }
}

/// Consumes email queues and dispatches jobs to the mail sender.
///
/// Subscribed with the ladder retry policy: a provider outage parks the job
/// on the next delay rung instead of dead-lettering it immediately.
pub struct EmailJobHandler<S> {
    sender: Arc<S>,
}

impl<S> EmailJobHandler<S>
where
    S: EmailSender,
{
    /// Creates a handler over the given sender.
    pub fn new(sender: Arc<S>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl<S> MessageHandler for EmailJobHandler<S>
where
    S: EmailSender,
{
    async fn handle(&self, msg: &InboundMessage) -> messaging::Result<()> {
        let job: EmailJob = msg
            .json()
            .map_err(|e| MessagingError::Handler(format!("bad email job: {e}")))?;

        self.sender
            .send(&job)
            .await
            .map_err(|e| MessagingError::Handler(e.to_string()))?;

        metrics::counter!("email_sent").increment(1);
        tracing::info!(kind = job.kind(), attempt = msg.attempt(), "email sent");
        Ok(())
    }
}
