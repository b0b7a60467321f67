//! Transactional outbox.
//!
//! Handlers record outgoing commands/events in the same local transaction as
//! the aggregate mutation that produced them; the relay publishes pending
//! rows to the broker until acknowledged. Downstream idempotency gates
//! absorb the duplicates this at-least-once loop can produce.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::broker::MessageBroker;
use crate::error::Result;
use crate::message::OutboundMessage;

/// A recorded outgoing message awaiting publication.
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub exchange: String,
    pub routing_key: String,
    pub headers: serde_json::Value,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub attempts: i32,
}

impl OutboxMessage {
    /// Creates a new unpublished message.
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        headers: serde_json::Value,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            headers,
            payload,
            created_at: Utc::now(),
            published_at: None,
            attempts: 0,
        }
    }
}

/// Storage port for the outbox.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Records an outgoing message. Must be invoked inside the same local
    /// transaction as the state change that produced it; implementations
    /// backed by a database expose a transactional variant for that.
    async fn enqueue(
        &self,
        exchange: &str,
        routing_key: &str,
        headers: serde_json::Value,
        payload: serde_json::Value,
    ) -> Result<()>;

    /// Returns up to `limit` unpublished messages, oldest first.
    async fn find_unpublished(&self, limit: usize) -> Result<Vec<OutboxMessage>>;

    /// Persists publication state (published timestamp or bumped attempts).
    async fn save(&self, msg: &OutboxMessage) -> Result<()>;
}

/// In-memory outbox for tests and the demo worker.
#[derive(Clone, Default)]
pub struct InMemoryOutbox {
    messages: Arc<RwLock<Vec<OutboxMessage>>>,
}

impl InMemoryOutbox {
    /// Creates a new empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded message, published or not.
    pub fn all(&self) -> Vec<OutboxMessage> {
        self.messages.read().unwrap().clone()
    }

    /// Returns recorded messages matching an exchange and routing key.
    pub fn recorded(&self, exchange: &str, routing_key: &str) -> Vec<OutboxMessage> {
        self.messages
            .read()
            .unwrap()
            .iter()
            .filter(|m| m.exchange == exchange && m.routing_key == routing_key)
            .cloned()
            .collect()
    }

    /// Returns the number of unpublished messages.
    pub fn unpublished_count(&self) -> usize {
        self.messages
            .read()
            .unwrap()
            .iter()
            .filter(|m| m.published_at.is_none())
            .count()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutbox {
    async fn enqueue(
        &self,
        exchange: &str,
        routing_key: &str,
        headers: serde_json::Value,
        payload: serde_json::Value,
    ) -> Result<()> {
        let msg = OutboxMessage::new(exchange, routing_key, headers, payload);
        self.messages.write().unwrap().push(msg);
        Ok(())
    }

    async fn find_unpublished(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
        let messages = self.messages.read().unwrap();
        let mut pending: Vec<OutboxMessage> = messages
            .iter()
            .filter(|m| m.published_at.is_none())
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn save(&self, msg: &OutboxMessage) -> Result<()> {
        let mut messages = self.messages.write().unwrap();
        if let Some(existing) = messages.iter_mut().find(|m| m.id == msg.id) {
            *existing = msg.clone();
        }
        Ok(())
    }
}

/// Publishes pending outbox rows to the broker.
pub struct OutboxRelay<S, B> {
    store: S,
    broker: B,
    poll_interval: Duration,
    batch_size: usize,
}

impl<S, B> OutboxRelay<S, B>
where
    S: OutboxStore,
    B: MessageBroker,
{
    /// Creates a relay with the given polling cadence.
    pub fn new(store: S, broker: B, poll_interval: Duration) -> Self {
        Self {
            store,
            broker,
            poll_interval,
            batch_size: 100,
        }
    }

    /// Runs one publish pass over pending messages.
    ///
    /// A publish failure bumps the row's attempt counter and leaves it
    /// unpublished for the next pass; the broker therefore sees each row at
    /// least once. Returns the number of rows published this pass.
    #[tracing::instrument(skip(self))]
    pub async fn publish_pending(&self) -> Result<usize> {
        let batch = self.store.find_unpublished(self.batch_size).await?;
        let mut published = 0;

        for mut msg in batch {
            let headers = match msg.headers.as_object() {
                Some(map) => map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                None => Default::default(),
            };
            let outbound = OutboundMessage {
                exchange: msg.exchange.clone(),
                routing_key: msg.routing_key.clone(),
                // Stable per row: re-publishes dedupe downstream.
                message_id: Some(msg.id.to_string()),
                headers,
                payload: serde_json::to_vec(&msg.payload)?,
            };

            match self.broker.publish(outbound).await {
                Ok(()) => {
                    msg.published_at = Some(Utc::now());
                    published += 1;
                    metrics::counter!("outbox_published").increment(1);
                }
                Err(error) => {
                    msg.attempts += 1;
                    metrics::counter!("outbox_publish_failed").increment(1);
                    tracing::warn!(id = %msg.id, %error, attempts = msg.attempts, "outbox publish failed");
                }
            }
            self.store.save(&msg).await?;
        }

        Ok(published)
    }

    /// Polls forever. Intended to be spawned as a background task.
    pub async fn run(&self) {
        loop {
            if let Err(error) = self.publish_pending().await {
                tracing::error!(%error, "outbox relay pass failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
