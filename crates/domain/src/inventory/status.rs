//! Reservation state machine.

use serde::{Deserialize, Serialize};

/// The status of an inventory reservation in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ──► Reserved ──► Confirmed
///    │            │
///    ├────────────┴──► Released
///    └────────────┴──► Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Created by the reserve command; stock not yet locked.
    #[default]
    Pending,

    /// Every item's stock lock succeeded.
    Reserved,

    /// Payment settled; reserved and total stock decremented (terminal).
    Confirmed,

    /// Released by cancellation, verification failure or refund (terminal).
    Released,

    /// Released by the external expiry scheduler (terminal).
    Expired,
}

impl ReservationStatus {
    /// Returns true if the reservation can be marked reserved.
    pub fn can_reserve(&self) -> bool {
        matches!(self, ReservationStatus::Pending)
    }

    /// Returns true if the reservation can be confirmed.
    pub fn can_confirm(&self) -> bool {
        matches!(self, ReservationStatus::Reserved)
    }

    /// Returns true if the reservation can be released or expired.
    pub fn can_release(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Reserved)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Confirmed
                | ReservationStatus::Released
                | ReservationStatus::Expired
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Reserved => "RESERVED",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Released => "RELEASED",
            ReservationStatus::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
