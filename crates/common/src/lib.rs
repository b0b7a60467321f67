//! Shared identifier types for the order-fulfillment system.

pub mod types;

pub use types::{CartId, OrderId, ReservationId, UserId, VariantId};
