//! Broker abstraction consumed by the handlers.
//!
//! Handler logic subscribes by queue name and never sees a broker client
//! type; the same handlers run against the in-memory broker in tests and
//! the AMQP broker in the worker.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::{InboundMessage, OutboundMessage};
use crate::retry::RetryPolicy;
use crate::topology::Topology;

/// A message handler bound to a queue.
///
/// Returning `Ok(())` acknowledges the delivery. Malformed or irrelevant
/// messages are acknowledged-and-dropped by returning `Ok(())` without side
/// effects; only infrastructure failures should surface as `Err`, which
/// hands the delivery to the subscription's [`RetryPolicy`].
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: &InboundMessage) -> Result<()>;
}

/// Per-subscription consumer options.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeOptions {
    /// Broker prefetch (bounded in-flight deliveries per consumer).
    pub prefetch: u16,
    /// What to do when the handler fails.
    pub retry: RetryPolicy,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            prefetch: 10,
            retry: RetryPolicy::DeadLetter,
        }
    }
}

impl SubscribeOptions {
    /// Immediate dead-letter on failure (inventory and payment queues).
    pub fn dead_letter() -> Self {
        Self::default()
    }

    /// Ladder-retried (email queues).
    pub fn ladder() -> Self {
        Self {
            prefetch: 10,
            retry: RetryPolicy::standard_ladder(),
        }
    }
}

/// A message broker: declarations, publishing and queue subscriptions.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Declares every exchange, queue and binding in the topology.
    /// Idempotent; safe to run on every startup.
    async fn declare(&self, topology: &Topology) -> Result<()>;

    /// Publishes a message to an exchange.
    async fn publish(&self, msg: OutboundMessage) -> Result<()>;

    /// Subscribes a handler to a queue.
    async fn subscribe(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        options: SubscribeOptions,
    ) -> Result<()>;
}
