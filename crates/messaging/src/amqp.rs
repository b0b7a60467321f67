//! AMQP (RabbitMQ) broker implementation.
//!
//! Declarations come from the same [`Topology`] data the in-memory broker
//! consumes; nothing here is queue-specific. Consumers use manual
//! acknowledgement: `Ok` acks, `Err` feeds the subscription's retry policy
//! (ladder re-publish or reject-without-requeue).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool_lapin::{Manager, Pool, PoolError};
use futures::StreamExt;
use lapin::{
    BasicProperties, Channel, ExchangeKind as LapinExchangeKind,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable, ShortString},
};
use tracing::{debug, error, info};

use crate::broker::{MessageBroker, MessageHandler, SubscribeOptions};
use crate::error::{MessagingError, Result};
use crate::message::{Headers, InboundMessage, OutboundMessage, X_ATTEMPT, X_ORIGIN_QUEUE};
use crate::topology::{ExchangeKind, Topology};

/// Configuration for the AMQP connection.
#[derive(Clone, Debug)]
pub struct AmqpConfig {
    /// AMQP connection URL (e.g., amqp://localhost:5672).
    pub url: String,
    /// Connection pool size.
    pub pool_size: usize,
}

impl AmqpConfig {
    /// Creates a config with the default pool size.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: 10,
        }
    }
}

/// AMQP message broker backed by a lapin connection pool.
#[derive(Clone)]
pub struct AmqpBroker {
    pool: Pool,
}

impl AmqpBroker {
    /// Creates a new AMQP broker and verifies connectivity.
    pub async fn connect(config: AmqpConfig) -> Result<Self> {
        let manager = Manager::new(config.url.clone(), Default::default());
        let pool = Pool::builder(manager)
            .max_size(config.pool_size)
            .build()
            .map_err(|e| MessagingError::Connection(format!("Failed to create pool: {e}")))?;

        // Verify connection before handing the broker out.
        pool.get()
            .await
            .map_err(|e| MessagingError::Connection(format!("Failed to connect: {e}")))?;

        info!(url = %config.url, "Connected to AMQP");
        Ok(Self { pool })
    }

    /// Gets a channel from the pool.
    async fn get_channel(&self) -> Result<Channel> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            MessagingError::Connection(format!("Failed to get connection from pool: {e}"))
        })?;

        conn.create_channel()
            .await
            .map_err(|e| MessagingError::Connection(format!("Failed to create channel: {e}")))
    }

    /// Converts wire headers to an AMQP field table.
    fn to_field_table(headers: &Headers) -> FieldTable {
        let mut table = BTreeMap::new();
        for (key, value) in headers {
            let amqp_value = match value {
                serde_json::Value::String(s) => AMQPValue::LongString(s.clone().into()),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => AMQPValue::LongLongInt(i),
                    None => AMQPValue::LongString(n.to_string().into()),
                },
                serde_json::Value::Bool(b) => AMQPValue::Boolean(*b),
                other => AMQPValue::LongString(other.to_string().into()),
            };
            table.insert(ShortString::from(key.as_str()), amqp_value);
        }
        FieldTable::from(table)
    }

    /// Converts an AMQP field table to wire headers.
    fn from_field_table(table: &FieldTable) -> Headers {
        let mut headers = Headers::new();
        for (key, value) in table.inner() {
            let json = match value {
                AMQPValue::LongString(s) => std::str::from_utf8(s.as_bytes())
                    .ok()
                    .map(|s| serde_json::Value::String(s.to_string())),
                AMQPValue::ShortShortInt(i) => Some(serde_json::json!(i)),
                AMQPValue::ShortInt(i) => Some(serde_json::json!(i)),
                AMQPValue::LongInt(i) => Some(serde_json::json!(i)),
                AMQPValue::LongLongInt(i) => Some(serde_json::json!(i)),
                AMQPValue::Boolean(b) => Some(serde_json::json!(b)),
                _ => None,
            };
            if let Some(json) = json {
                headers.insert(key.to_string(), json);
            }
        }
        headers
    }

    /// Handles one delivery: run the handler, then ack / park / dead-letter
    /// according to the subscription's retry policy.
    async fn process_delivery(
        channel: &Channel,
        queue: &str,
        delivery: lapin::message::Delivery,
        handler: &Arc<dyn MessageHandler>,
        options: SubscribeOptions,
    ) {
        let msg = InboundMessage {
            queue: queue.to_string(),
            routing_key: delivery.routing_key.to_string(),
            message_id: delivery
                .properties
                .message_id()
                .as_ref()
                .map(|id| id.as_str().to_string()),
            headers: delivery
                .properties
                .headers()
                .as_ref()
                .map(Self::from_field_table)
                .unwrap_or_default(),
            payload: delivery.data.clone(),
        };

        match handler.handle(&msg).await {
            Ok(()) => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!(error = %e, "Failed to ack message");
                }
            }
            Err(handler_error) => {
                let attempt = msg.attempt() + 1;
                match options.retry.retry_queue(queue, attempt) {
                    Some(retry_queue) => {
                        // Park on the TTL queue via the default exchange;
                        // expiry dead-letters back to the origin.
                        let mut headers = msg.headers.clone();
                        headers.insert(X_ATTEMPT.to_string(), serde_json::json!(attempt));
                        headers
                            .insert(X_ORIGIN_QUEUE.to_string(), serde_json::json!(queue));

                        let properties = BasicProperties::default()
                            .with_content_type("application/json".into())
                            .with_delivery_mode(2)
                            .with_headers(Self::to_field_table(&headers));

                        let parked = channel
                            .basic_publish(
                                "",
                                &retry_queue,
                                BasicPublishOptions::default(),
                                &delivery.data,
                                properties,
                            )
                            .await;

                        match parked {
                            Ok(_) => {
                                debug!(
                                    queue = %queue,
                                    retry_queue = %retry_queue,
                                    attempt,
                                    error = %handler_error,
                                    "Handler failed, parked for retry"
                                );
                                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                                    error!(error = %e, "Failed to ack retried message");
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "Failed to park message, rejecting");
                                let _ = delivery
                                    .reject(BasicRejectOptions { requeue: false })
                                    .await;
                            }
                        }
                    }
                    None => {
                        debug!(
                            queue = %queue,
                            error = %handler_error,
                            "Handler failed, dead-lettering"
                        );
                        let _ = delivery
                            .reject(BasicRejectOptions { requeue: false })
                            .await;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl MessageBroker for AmqpBroker {
    async fn declare(&self, topology: &Topology) -> Result<()> {
        let channel = self.get_channel().await?;

        for exchange in &topology.exchanges {
            let kind = match exchange.kind {
                ExchangeKind::Topic => LapinExchangeKind::Topic,
                ExchangeKind::Direct => LapinExchangeKind::Direct,
            };
            channel
                .exchange_declare(
                    &exchange.name,
                    kind,
                    ExchangeDeclareOptions {
                        durable: exchange.durable,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    MessagingError::Connection(format!("Failed to declare exchange: {e}"))
                })?;
        }

        for queue in &topology.queues {
            let mut args = BTreeMap::new();
            if let Some(dlx) = &queue.dead_letter_exchange {
                args.insert(
                    ShortString::from("x-dead-letter-exchange"),
                    AMQPValue::LongString(dlx.clone().into()),
                );
            }
            if let Some(routing_key) = &queue.dead_letter_routing_key {
                args.insert(
                    ShortString::from("x-dead-letter-routing-key"),
                    AMQPValue::LongString(routing_key.clone().into()),
                );
            }
            if let Some(ttl) = queue.message_ttl {
                args.insert(
                    ShortString::from("x-message-ttl"),
                    AMQPValue::LongInt(ttl as i32),
                );
            }

            channel
                .queue_declare(
                    &queue.name,
                    QueueDeclareOptions {
                        durable: queue.durable,
                        ..Default::default()
                    },
                    FieldTable::from(args),
                )
                .await
                .map_err(|e| {
                    MessagingError::Connection(format!("Failed to declare queue: {e}"))
                })?;
        }

        for binding in &topology.bindings {
            channel
                .queue_bind(
                    &binding.queue,
                    &binding.exchange,
                    &binding.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| MessagingError::Connection(format!("Failed to bind queue: {e}")))?;
        }

        info!(
            exchanges = topology.exchanges.len(),
            queues = topology.queues.len(),
            bindings = topology.bindings.len(),
            "Declared AMQP topology"
        );
        Ok(())
    }

    async fn publish(&self, msg: OutboundMessage) -> Result<()> {
        let channel = self.get_channel().await?;

        let mut properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2); // persistent
        if let Some(id) = &msg.message_id {
            properties = properties.with_message_id(id.as_str().into());
        }
        if !msg.headers.is_empty() {
            properties = properties.with_headers(Self::to_field_table(&msg.headers));
        }

        let confirm = channel
            .basic_publish(
                &msg.exchange,
                &msg.routing_key,
                BasicPublishOptions::default(),
                &msg.payload,
                properties,
            )
            .await
            .map_err(|e| MessagingError::Publish(format!("Failed to publish: {e}")))?;

        confirm
            .await
            .map_err(|e| MessagingError::Publish(format!("Publish confirmation failed: {e}")))?;

        debug!(
            exchange = %msg.exchange,
            routing_key = %msg.routing_key,
            "Published message"
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        options: SubscribeOptions,
    ) -> Result<()> {
        let channel = self.get_channel().await?;
        channel
            .basic_qos(options.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| MessagingError::Subscribe(format!("Failed to set prefetch: {e}")))?;

        let mut consumer = channel
            .basic_consume(
                queue,
                &format!("{queue}-consumer"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::Subscribe(format!("Failed to start consumer: {e}")))?;

        info!(queue = %queue, prefetch = options.prefetch, "Consumer started");

        let queue = queue.to_string();
        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        Self::process_delivery(&channel, &queue, delivery, &handler, options)
                            .await;
                    }
                    Err(e) => {
                        error!(queue = %queue, error = %e, "Consumer delivery error");
                        break;
                    }
                }
            }
            info!(queue = %queue, "Consumer stream ended");
        });

        Ok(())
    }
}
