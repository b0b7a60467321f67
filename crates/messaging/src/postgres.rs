//! PostgreSQL-backed outbox and processed-event stores.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::error::Result;
use crate::outbox::{OutboxMessage, OutboxStore};
use crate::processed::ProcessedEventStore;

/// PostgreSQL-backed outbox store.
#[derive(Clone)]
pub struct PostgresOutbox {
    pool: PgPool,
}

impl PostgresOutbox {
    /// Creates a new outbox store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Records a message inside an open transaction.
    ///
    /// This is the variant handlers use so the outbox row commits or rolls
    /// back together with the aggregate mutation.
    pub async fn enqueue_with(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        exchange: &str,
        routing_key: &str,
        headers: serde_json::Value,
        payload: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_messages (id, exchange, routing_key, headers, payload, created_at, attempts)
            VALUES ($1, $2, $3, $4, $5, $6, 0)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(exchange)
        .bind(routing_key)
        .bind(headers)
        .bind(payload)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    fn row_to_message(row: PgRow) -> Result<OutboxMessage> {
        Ok(OutboxMessage {
            id: row.try_get("id")?,
            exchange: row.try_get("exchange")?,
            routing_key: row.try_get("routing_key")?,
            headers: row.try_get("headers")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            published_at: row.try_get("published_at")?,
            attempts: row.try_get("attempts")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PostgresOutbox {
    async fn enqueue(
        &self,
        exchange: &str,
        routing_key: &str,
        headers: serde_json::Value,
        payload: serde_json::Value,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        self.enqueue_with(&mut tx, exchange, routing_key, headers, payload)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_unpublished(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, exchange, routing_key, headers, payload, created_at, published_at, attempts
            FROM outbox_messages
            WHERE published_at IS NULL
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_message).collect()
    }

    async fn save(&self, msg: &OutboxMessage) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_messages
            SET published_at = $2, attempts = $3
            WHERE id = $1
            "#,
        )
        .bind(msg.id)
        .bind(msg.published_at)
        .bind(msg.attempts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// PostgreSQL-backed processed-event gate.
#[derive(Clone)]
pub struct PostgresProcessedEvents {
    pool: PgPool,
}

impl PostgresProcessedEvents {
    /// Creates a new gate over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedEventStore for PostgresProcessedEvents {
    async fn already_processed(&self, scope: &str, key: &str) -> Result<bool> {
        let exists: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM processed_events WHERE scope = $1 AND key = $2",
        )
        .bind(scope)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(exists.is_some())
    }

    async fn mark_processed(&self, scope: &str, key: &str) -> Result<()> {
        // Replayed marks are expected; the composite key absorbs them.
        sqlx::query(
            r#"
            INSERT INTO processed_events (scope, key, processed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (scope, key) DO NOTHING
            "#,
        )
        .bind(scope)
        .bind(key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
