//! Square Payment Session Model
//!
//! Staging record for the hosted-checkout path. Created before the buyer is
//! redirected to Square, then updated as `payment.*` / `order.*` webhook
//! events arrive. Resolves "which puppy/customer does this event belong to".

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A Square hosted-checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentSession {
    /// Session record ID
    pub id: Uuid,

    /// Puppy the checkout is for
    pub puppy_id: Uuid,

    /// Buyer account, if any (guest checkout allowed)
    pub user_id: Option<Uuid>,

    /// Checkout amount in USD (full price; Square path has no split)
    pub amount: Decimal,

    /// Lowercased processor payment status ("pending", "completed", ...)
    pub status: String,

    /// Payment provider label
    pub payment_provider: String,

    /// Processor payment-link ID returned at checkout creation
    pub session_id: String,

    /// Processor order ID backing the payment link; webhook payments
    /// reference this, not the link ID
    pub order_id: Option<String>,

    /// Processor payment ID, once a payment event has arrived
    pub payment_id: Option<String>,

    pub customer_email: String,

    /// Blob of checkout URL, billing address and merged webhook payloads
    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentSession {
    pub fn new(
        puppy_id: Uuid,
        user_id: Option<Uuid>,
        amount: Decimal,
        session_id: impl Into<String>,
        order_id: Option<String>,
        customer_email: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            puppy_id,
            user_id,
            amount,
            status: "pending".into(),
            payment_provider: "square".into(),
            session_id: session_id.into(),
            order_id,
            payment_id: None,
            customer_email: customer_email.into(),
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_session_is_pending() {
        let session = PaymentSession::new(
            Uuid::new_v4(),
            None,
            dec!(2000),
            "plink_123",
            Some("order_456".into()),
            "buyer@example.com",
            serde_json::json!({"checkout_url": "https://square.link/x"}),
        );
        assert_eq!(session.status, "pending");
        assert_eq!(session.payment_provider, "square");
        assert!(session.payment_id.is_none());
    }
}
