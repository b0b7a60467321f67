//! Saga error types.

use domain::{OrderError, ReservationError};
use messaging::MessagingError;
use thiserror::Error;

/// Errors that can occur while handling saga messages.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A message payload could not be interpreted.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Order aggregate rejected a transition.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Reservation aggregate rejected a transition.
    #[error("Reservation error: {0}")]
    Reservation(#[from] ReservationError),

    /// A port (repository, stock adjuster, cart, user directory) failed.
    #[error("Port error: {0}")]
    Port(String),

    /// Messaging subsystem error (outbox, idempotency gate).
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
