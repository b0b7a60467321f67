//! Messaging error types.

use thiserror::Error;

/// Errors that can occur in the messaging subsystem.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// Failed to connect to the broker.
    #[error("Broker connection error: {0}")]
    Connection(String),

    /// Failed to publish a message.
    #[error("Publish error: {0}")]
    Publish(String),

    /// Failed to set up or run a subscription.
    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// A message referenced an exchange that was never declared.
    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    /// A subscription referenced a queue that was never declared.
    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    /// A message handler failed; the retry policy decides what happens next.
    #[error("Handler error: {0}")]
    Handler(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error from a Postgres-backed store.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convenience type alias for messaging results.
pub type Result<T> = std::result::Result<T, MessagingError>;
