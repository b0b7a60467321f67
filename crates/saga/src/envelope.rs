//! Normalized payment event envelope.
//!
//! The gateway adapter verifies the webhook signature and flattens the
//! provider object into this shape; the reconciler never sees provider SDK
//! types. Event classification is substring-based on the provider's type
//! string (`checkout.session.completed`, `payment_intent.succeeded`,
//! `charge.refunded`, `payment_intent.payment_failed`, ...).

use domain::ShippingDetails;
use serde::{Deserialize, Serialize};

/// Flattened payment event as published on `payments.events`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentEventEnvelope {
    pub stripe_event_id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub order_id: Option<String>,
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub shipping_amount_minor: Option<i64>,
    pub shipping_currency: Option<String>,
    pub shipping_rate_id: Option<String>,
    pub shipping_name: Option<String>,
    pub shipping_phone: Option<String>,
    pub shipping_address_line1: Option<String>,
    pub shipping_address_line2: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_state: Option<String>,
    pub shipping_postal_code: Option<String>,
    pub shipping_country: Option<String>,
}

impl PaymentEventEnvelope {
    fn type_contains(&self, needle: &str) -> bool {
        self.event_type
            .as_deref()
            .is_some_and(|t| t.contains(needle))
    }

    /// True for checkout-session-completed events, which carry the
    /// authoritative shipping block.
    pub fn is_session_completed(&self) -> bool {
        self.type_contains("checkout.session.completed")
    }

    /// True for success/completion events.
    pub fn is_success(&self) -> bool {
        self.type_contains("succeeded") || self.type_contains("completed")
    }

    /// True for refund events.
    pub fn is_refund(&self) -> bool {
        self.type_contains("refunded")
    }

    /// True for failure events.
    pub fn is_failure(&self) -> bool {
        self.type_contains("failed")
    }

    /// True when the envelope carries any shipping information worth
    /// persisting onto the order.
    pub fn has_shipping_fields(&self) -> bool {
        self.shipping_amount_minor.is_some()
            || self.shipping_currency.is_some()
            || self.shipping_rate_id.is_some()
            || self.shipping_name.is_some()
            || self.shipping_phone.is_some()
            || self.shipping_address_line1.is_some()
    }

    /// Builds the shipping block to persist onto the order.
    pub fn shipping_details(&self) -> ShippingDetails {
        ShippingDetails {
            rate_id: self.shipping_rate_id.clone(),
            amount_minor: self.shipping_amount_minor,
            currency: self.shipping_currency.clone(),
            name: self.shipping_name.clone(),
            phone: self.shipping_phone.clone(),
            address_line1: self.shipping_address_line1.clone(),
            address_line2: self.shipping_address_line2.clone(),
            city: self.shipping_city.clone(),
            state: self.shipping_state.clone(),
            postal_code: self.shipping_postal_code.clone(),
            country: self.shipping_country.clone(),
        }
    }
}
