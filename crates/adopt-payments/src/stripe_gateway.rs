//! Stripe Gateway
//!
//! Wraps the Stripe client for the payment-element flow: resolve-or-create
//! customers by email, create payment intents carrying the reattachment
//! metadata, and verify webhook signatures.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use stripe::{
    Client, CreateCustomer, CreatePaymentIntent, CreatePaymentIntentAutomaticPaymentMethods,
    Currency, Customer, CustomerId, ListCustomers, PaymentIntent,
};
use uuid::Uuid;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook signature timestamp
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// A freshly created payment intent
#[derive(Clone, Debug)]
pub struct CreatedIntent {
    /// Processor intent ID (`pi_...`)
    pub id: String,

    /// Client secret for the browser-side payment element
    pub client_secret: String,
}

/// Stripe client wrapper
pub struct StripeGateway {
    client: Client,
    webhook_secret: String,
}

impl StripeGateway {
    /// Create a new Stripe gateway
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;

        Ok(Self::new(&secret_key, &webhook_secret))
    }

    /// Resolve a processor customer by email, creating one if none exists.
    ///
    /// Lookup-then-create keeps repeat buyers on a single customer record.
    pub async fn find_or_create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        phone: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Result<String> {
        let mut list_params = ListCustomers::new();
        list_params.email = Some(email);
        list_params.limit = Some(1);

        let existing = Customer::list(&self.client, &list_params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        if let Some(customer) = existing.data.first() {
            tracing::info!(customer_id = %customer.id, "Found existing Stripe customer");
            return Ok(customer.id.to_string());
        }

        let mut metadata = HashMap::new();
        metadata.insert(
            "adopt_user_id".to_string(),
            user_id.map_or_else(|| "guest".to_string(), |id| id.to_string()),
        );

        let mut create_params = CreateCustomer::new();
        create_params.email = Some(email);
        create_params.name = name;
        create_params.phone = phone;
        create_params.metadata = Some(metadata);

        let customer = Customer::create(&self.client, create_params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        tracing::info!(customer_id = %customer.id, "Created new Stripe customer");
        Ok(customer.id.to_string())
    }

    /// Create a payment intent in USD minor units.
    ///
    /// `metadata` is the sole mechanism by which the webhook reattaches the
    /// event to local state; it must carry `purchase_id` / `puppy_id` /
    /// `payment_type`.
    pub async fn create_payment_intent(
        &self,
        amount_cents: i64,
        customer_id: &str,
        metadata: HashMap<String, String>,
    ) -> Result<CreatedIntent> {
        let customer: CustomerId = customer_id
            .parse()
            .map_err(|_| PaymentError::Stripe(format!("invalid customer id: {customer_id}")))?;

        let mut params = CreatePaymentIntent::new(amount_cents, Currency::USD);
        params.customer = Some(customer);
        params.metadata = Some(metadata);
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            enabled: true,
            ..Default::default()
        });

        let intent = PaymentIntent::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let client_secret = intent
            .client_secret
            .ok_or_else(|| PaymentError::Stripe("No client secret returned".into()))?;

        Ok(CreatedIntent {
            id: intent.id.to_string(),
            client_secret,
        })
    }

    /// Verify a `stripe-signature` header against the raw request body.
    pub fn verify_signature(&self, payload: &[u8], header: &str) -> Result<()> {
        verify_stripe_signature(
            &self.webhook_secret,
            payload,
            header,
            chrono::Utc::now().timestamp(),
        )
    }
}

/// Check a `t=<ts>,v1=<hex>` header: HMAC-SHA256 over `"{t}.{body}"` with
/// the signing secret, rejecting timestamps older than the tolerance.
pub fn verify_stripe_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now_unix: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| PaymentError::WebhookSignature("missing timestamp".into()))?;
    if candidates.is_empty() {
        return Err(PaymentError::WebhookSignature("missing v1 signature".into()));
    }
    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(PaymentError::WebhookSignature(
            "timestamp outside tolerance".into(),
        ));
    }

    for candidate in candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| PaymentError::WebhookSignature(e.to_string()))?;
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(PaymentError::WebhookSignature("signature mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let now = 1_700_000_000;
        let header = format!("t={},v1={}", now, sign(payload, SECRET, now));
        assert!(verify_stripe_signature(SECRET, payload, &header, now).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let now = 1_700_000_000;
        let header = format!("t={},v1={}", now, sign(payload, "whsec_other", now));
        assert!(verify_stripe_signature(SECRET, payload, &header, now).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = b"{}";
        let signed_at = 1_700_000_000;
        let header = format!("t={},v1={}", signed_at, sign(payload, SECRET, signed_at));
        let now = signed_at + SIGNATURE_TOLERANCE_SECS + 1;
        assert!(verify_stripe_signature(SECRET, payload, &header, now).is_err());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let payload = br#"{"amount":50000}"#;
        let now = 1_700_000_000;
        let header = format!("t={},v1={}", now, sign(payload, SECRET, now));
        assert!(
            verify_stripe_signature(SECRET, br#"{"amount":1}"#, &header, now).is_err()
        );
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(verify_stripe_signature(SECRET, b"{}", "v1=abcd", 0).is_err());
        assert!(verify_stripe_signature(SECRET, b"{}", "t=123", 123).is_err());
        assert!(verify_stripe_signature(SECRET, b"{}", "", 0).is_err());
    }
}
