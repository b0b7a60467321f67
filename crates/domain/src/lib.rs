//! Domain layer for the order-fulfillment system.
//!
//! This crate provides the aggregates mutated by the message-driven saga:
//! - Order with its payment-settlement state machine and shipping details
//! - InventoryReservation with its reserve/confirm/release lifecycle
//!
//! Aggregates are mutated exclusively through named transition methods that
//! guard the allowed source states; invalid transitions are errors, never
//! silent corruption.

pub mod error;
pub mod inventory;
pub mod order;

pub use error::DomainError;
pub use inventory::{
    InventoryReservation, ReservationError, ReservationItem, ReservationStatus,
};
pub use order::{CurrencyCode, Money, Order, OrderError, OrderStatus, ShippingDetails};
