//! In-memory broker implementation for tests.
//!
//! Honors the declared topology: topic-pattern routing, dead-letter
//! arguments and the parking-lot retry ladder all behave as they do on a
//! real broker, minus the clock: TTL expiry is driven explicitly through
//! [`InMemoryBroker::expire`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::broker::{MessageBroker, MessageHandler, SubscribeOptions};
use crate::error::{MessagingError, Result};
use crate::message::{InboundMessage, OutboundMessage, X_ATTEMPT, X_ORIGIN_QUEUE};
use crate::topology::{ExchangeKind, ExchangeSpec, QueueSpec, Topology};

/// Matches an AMQP topic pattern against a routing key.
///
/// `*` matches exactly one dot-separated segment, `#` matches zero or more.
fn topic_match(pattern: &str, routing_key: &str) -> bool {
    fn match_segments(pattern: &[&str], key: &[&str]) -> bool {
        match (pattern.first(), key.first()) {
            (None, None) => true,
            (Some(&"#"), _) => {
                // '#' absorbs zero or more segments.
                match_segments(&pattern[1..], key)
                    || (!key.is_empty() && match_segments(pattern, &key[1..]))
            }
            (Some(&"*"), Some(_)) => match_segments(&pattern[1..], &key[1..]),
            (Some(&p), Some(&k)) if p == k => match_segments(&pattern[1..], &key[1..]),
            _ => false,
        }
    }

    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_segments(&pattern, &key)
}

struct Subscription {
    handler: Arc<dyn MessageHandler>,
    options: SubscribeOptions,
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeSpec>,
    queues: HashMap<String, QueueSpec>,
    bindings: Vec<(String, String, String)>, // (queue, exchange, routing_key)
    pending: HashMap<String, VecDeque<InboundMessage>>,
    subscriptions: HashMap<String, Subscription>,
}

impl BrokerState {
    /// Routes a message to every queue it reaches, enqueuing a delivery per
    /// queue. Returns the number of queues hit.
    fn route(&mut self, msg: &OutboundMessage) -> Result<usize> {
        let message_id = msg
            .message_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Default exchange: the routing key names a queue directly.
        if msg.exchange.is_empty() {
            if !self.queues.contains_key(&msg.routing_key) {
                return Err(MessagingError::UnknownQueue(msg.routing_key.clone()));
            }
            let queue = msg.routing_key.clone();
            self.enqueue(&queue, msg, message_id);
            return Ok(1);
        }

        let exchange = self
            .exchanges
            .get(&msg.exchange)
            .ok_or_else(|| MessagingError::UnknownExchange(msg.exchange.clone()))?;
        let kind = exchange.kind;

        let targets: Vec<String> = self
            .bindings
            .iter()
            .filter(|(_, ex, rk)| {
                ex == &msg.exchange
                    && match kind {
                        ExchangeKind::Direct => rk == &msg.routing_key,
                        ExchangeKind::Topic => topic_match(rk, &msg.routing_key),
                    }
            })
            .map(|(queue, _, _)| queue.clone())
            .collect();

        for queue in &targets {
            self.enqueue(queue, msg, message_id.clone());
        }
        Ok(targets.len())
    }

    fn enqueue(&mut self, queue: &str, msg: &OutboundMessage, message_id: String) {
        self.pending
            .entry(queue.to_string())
            .or_default()
            .push_back(InboundMessage {
                queue: queue.to_string(),
                routing_key: msg.routing_key.clone(),
                message_id: Some(message_id),
                headers: msg.headers.clone(),
                payload: msg.payload.clone(),
            });
    }

    /// Applies a queue's dead-letter arguments to a delivery.
    /// A message on a queue with no dead-letter exchange is dropped.
    fn dead_letter(&mut self, msg: InboundMessage) -> Result<()> {
        let Some(spec) = self.queues.get(&msg.queue) else {
            return Ok(());
        };
        let Some(dlx) = spec.dead_letter_exchange.clone() else {
            return Ok(());
        };
        let routing_key = spec
            .dead_letter_routing_key
            .clone()
            .unwrap_or_else(|| msg.routing_key.clone());

        let outbound = OutboundMessage {
            exchange: dlx,
            routing_key,
            message_id: msg.message_id,
            headers: msg.headers,
            payload: msg.payload,
        };
        self.route(&outbound)?;
        Ok(())
    }
}

/// In-memory message broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<RwLock<BrokerState>>,
}

impl InMemoryBroker {
    /// Creates a new empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers queued messages to subscribed handlers until every
    /// subscribed queue is drained. Handler failures are fed through the
    /// subscription's retry policy, exactly like the real consumer runtime.
    ///
    /// Returns the number of deliveries attempted.
    pub async fn deliver_all(&self) -> Result<usize> {
        let mut delivered = 0;

        loop {
            let next = {
                let mut state = self.state.write().await;
                let queue = state
                    .subscriptions
                    .keys()
                    .find(|q| {
                        state
                            .pending
                            .get(q.as_str())
                            .is_some_and(|msgs| !msgs.is_empty())
                    })
                    .cloned();

                match queue {
                    Some(queue) => {
                        let msg = state
                            .pending
                            .get_mut(&queue)
                            .and_then(|msgs| msgs.pop_front());
                        let subscription = state.subscriptions.get(&queue);
                        match (msg, subscription) {
                            (Some(msg), Some(sub)) => {
                                Some((msg, sub.handler.clone(), sub.options))
                            }
                            _ => None,
                        }
                    }
                    None => None,
                }
            };

            let Some((msg, handler, options)) = next else {
                break;
            };
            delivered += 1;

            if let Err(error) = handler.handle(&msg).await {
                tracing::warn!(queue = %msg.queue, %error, "handler failed, applying retry policy");
                self.apply_failure(msg, options).await?;
            }
        }

        Ok(delivered)
    }

    /// Simulates TTL expiry: every message parked on `queue` is re-routed
    /// through the queue's dead-letter arguments.
    pub async fn expire(&self, queue: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let msgs: Vec<InboundMessage> = state
            .pending
            .get_mut(queue)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default();
        let count = msgs.len();
        for msg in msgs {
            state.dead_letter(msg)?;
        }
        Ok(count)
    }

    /// Returns the number of messages parked on a queue.
    pub async fn queue_depth(&self, queue: &str) -> usize {
        self.state
            .read()
            .await
            .pending
            .get(queue)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Drains a queue without delivering, for assertions on parked messages.
    pub async fn take(&self, queue: &str) -> Vec<InboundMessage> {
        let mut state = self.state.write().await;
        state
            .pending
            .get_mut(queue)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    async fn apply_failure(&self, msg: InboundMessage, options: SubscribeOptions) -> Result<()> {
        let attempt = msg.attempt() + 1;
        let mut state = self.state.write().await;

        if let Some(retry_queue) = options.retry.retry_queue(&msg.queue, attempt) {
            let outbound = OutboundMessage {
                exchange: String::new(),
                routing_key: retry_queue,
                message_id: msg.message_id,
                headers: msg.headers,
                payload: msg.payload,
            }
            .with_header(X_ATTEMPT, serde_json::json!(attempt))
            .with_header(X_ORIGIN_QUEUE, serde_json::json!(msg.queue));
            state.route(&outbound)?;
        } else {
            state.dead_letter(msg)?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare(&self, topology: &Topology) -> Result<()> {
        let mut state = self.state.write().await;
        for exchange in &topology.exchanges {
            state
                .exchanges
                .insert(exchange.name.clone(), exchange.clone());
        }
        for queue in &topology.queues {
            state.queues.insert(queue.name.clone(), queue.clone());
            state.pending.entry(queue.name.clone()).or_default();
        }
        for binding in &topology.bindings {
            let entry = (
                binding.queue.clone(),
                binding.exchange.clone(),
                binding.routing_key.clone(),
            );
            if !state.bindings.contains(&entry) {
                state.bindings.push(entry);
            }
        }
        Ok(())
    }

    async fn publish(&self, msg: OutboundMessage) -> Result<()> {
        let mut state = self.state.write().await;
        state.route(&msg)?;
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        options: SubscribeOptions,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.queues.contains_key(queue) {
            return Err(MessagingError::UnknownQueue(queue.to_string()));
        }
        state
            .subscriptions
            .insert(queue.to_string(), Subscription { handler, options });
        Ok(())
    }
}
