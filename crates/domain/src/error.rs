//! Domain error types.

use thiserror::Error;

use crate::inventory::ReservationError;
use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the order aggregate.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// An error occurred in the reservation aggregate.
    #[error("Reservation error: {0}")]
    Reservation(#[from] ReservationError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
