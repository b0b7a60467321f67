//! Inventory reservation aggregate and related types.

mod reservation;
mod status;

pub use reservation::{InventoryReservation, ReservationItem};
pub use status::ReservationStatus;

use thiserror::Error;

/// Errors that can occur during reservation operations.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// Reservation is not in an allowed source status for the transition.
    #[error("Invalid status transition: cannot {action} from {current} status")]
    InvalidStatusTransition {
        current: ReservationStatus,
        action: &'static str,
    },
}
