//! Broker-facing subsystem for the order-fulfillment saga.
//!
//! This crate owns everything between the handlers and the wire:
//! - declarative topology (exchanges, queues, dead-letter routing, the
//!   TTL-based retry ladder)
//! - the `MessageBroker` abstraction with in-memory and AMQP implementations
//! - the retry policy applied around subscriptions
//! - the transactional outbox and its relay
//! - the idempotent processed-event gate

pub mod amqp;
pub mod broker;
pub mod error;
pub mod memory;
pub mod message;
pub mod outbox;
pub mod postgres;
pub mod processed;
pub mod retry;
pub mod topology;

pub use amqp::{AmqpBroker, AmqpConfig};
pub use broker::{MessageBroker, MessageHandler, SubscribeOptions};
pub use error::{MessagingError, Result};
pub use memory::InMemoryBroker;
pub use message::{Headers, InboundMessage, OutboundMessage, X_ATTEMPT, X_ORIGIN_QUEUE};
pub use outbox::{InMemoryOutbox, OutboxMessage, OutboxRelay, OutboxStore};
pub use postgres::{PostgresOutbox, PostgresProcessedEvents};
pub use processed::{InMemoryProcessedEvents, ProcessedEventStore};
pub use retry::{RETRY_DELAYS_MS, RetryPolicy};
pub use topology::{
    BindingSpec, ExchangeKind, ExchangeSpec, QueueSpec, Topology, email_topology,
    inventory_topology, payments_topology,
};
