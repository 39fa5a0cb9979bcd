//! Square Gateway
//!
//! Hosted-checkout integration: builds payment links against the Square
//! REST API. Unlike the Stripe path there is no client secret; the buyer is
//! redirected to Square's hosted page and confirmation arrives only via
//! webhook. Credentials come from the integration-settings record, not the
//! environment, so staff can rotate them without a deploy.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use adopt_core::IntegrationSettings;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

const SQUARE_VERSION: &str = "2024-01-18";

/// Which Square environment the credentials target
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SquareEnvironment {
    Sandbox,
    Production,
}

impl SquareEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            SquareEnvironment::Sandbox => "https://connect.squareupsandbox.com",
            SquareEnvironment::Production => "https://connect.squareup.com",
        }
    }
}

/// Credential blob stored under `service_name = "square"`
#[derive(Clone, Debug, Deserialize)]
struct CredentialBlob {
    application_id: Option<String>,
    access_token: Option<String>,
    location_id: Option<String>,
    webhook_signature_key: Option<String>,
}

/// Decoded Square credentials
#[derive(Clone, Debug)]
pub struct SquareCredentials {
    pub application_id: String,
    pub access_token: String,
    pub location_id: String,
    pub webhook_signature_key: Option<String>,
    pub environment: SquareEnvironment,
}

impl SquareCredentials {
    /// Decode a settings row into credentials.
    pub fn from_settings(settings: &IntegrationSettings) -> Result<Self> {
        let blob: CredentialBlob = serde_json::from_value(settings.credentials.clone())
            .map_err(|e| PaymentError::Config(format!("bad Square credentials: {e}")))?;

        let (Some(application_id), Some(access_token)) = (blob.application_id, blob.access_token)
        else {
            return Err(PaymentError::Config("Square credentials not found".into()));
        };

        let environment = match settings.environment.as_str() {
            "production" => SquareEnvironment::Production,
            _ => SquareEnvironment::Sandbox,
        };

        Ok(Self {
            application_id,
            access_token,
            location_id: blob.location_id.unwrap_or_default(),
            webhook_signature_key: blob.webhook_signature_key,
            environment,
        })
    }
}

/// Billing details collected at checkout, pre-populated onto the hosted page
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

/// A created hosted-checkout link
#[derive(Clone, Debug)]
pub struct PaymentLink {
    /// Payment-link ID
    pub id: String,

    /// URL to redirect the buyer to
    pub url: String,

    /// Backing order ID; webhook payment events reference this
    pub order_id: Option<String>,
}

#[derive(Serialize)]
struct CreatePaymentLinkBody {
    idempotency_key: String,
    order: OrderBody,
    payment_options: PaymentOptionsBody,
    checkout_options: CheckoutOptionsBody,
    pre_populate_buyer_email: String,
    pre_populate_shipping_address: ShippingAddressBody,
}

#[derive(Serialize)]
struct OrderBody {
    location_id: String,
    line_items: Vec<LineItemBody>,
}

#[derive(Serialize)]
struct LineItemBody {
    name: String,
    quantity: String,
    base_price_money: MoneyBody,
}

#[derive(Serialize)]
struct MoneyBody {
    amount: i64,
    currency: &'static str,
}

#[derive(Serialize)]
struct PaymentOptionsBody {
    accept_partial_authorization: bool,
}

#[derive(Serialize)]
struct CheckoutOptionsBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_url: Option<String>,
    merchant_support_email: String,
}

#[derive(Serialize)]
struct ShippingAddressBody {
    first_name: String,
    last_name: String,
    address_line_1: String,
    locality: String,
    administrative_district_level_1: String,
    postal_code: String,
    country: &'static str,
}

#[derive(Deserialize)]
struct PaymentLinkResponse {
    payment_link: Option<PaymentLinkObject>,
}

#[derive(Deserialize)]
struct PaymentLinkObject {
    id: String,
    url: String,
    order_id: Option<String>,
}

/// Square REST client
pub struct SquareGateway {
    http: reqwest::Client,
    credentials: SquareCredentials,
}

impl SquareGateway {
    pub fn new(credentials: SquareCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
        }
    }

    pub fn credentials(&self) -> &SquareCredentials {
        &self.credentials
    }

    /// Create a hosted-checkout payment link for the full adoption price.
    ///
    /// On API rejection the processor's error body is surfaced verbatim.
    pub async fn create_payment_link(
        &self,
        puppy_id: Uuid,
        puppy_name: &str,
        amount_cents: i64,
        customer_email: &str,
        billing: &BillingInfo,
        redirect_url: Option<String>,
    ) -> Result<PaymentLink> {
        let body = CreatePaymentLinkBody {
            idempotency_key: format!("{}-{}", puppy_id, Utc::now().timestamp_millis()),
            order: OrderBody {
                location_id: self.credentials.location_id.clone(),
                line_items: vec![LineItemBody {
                    name: format!("Puppy Adoption - {puppy_name}"),
                    quantity: "1".into(),
                    base_price_money: MoneyBody {
                        amount: amount_cents,
                        currency: "USD",
                    },
                }],
            },
            payment_options: PaymentOptionsBody {
                accept_partial_authorization: false,
            },
            checkout_options: CheckoutOptionsBody {
                redirect_url,
                merchant_support_email: customer_email.to_string(),
            },
            pre_populate_buyer_email: billing.email.clone(),
            pre_populate_shipping_address: ShippingAddressBody {
                first_name: billing.first_name.clone(),
                last_name: billing.last_name.clone(),
                address_line_1: billing.address.clone(),
                locality: billing.city.clone(),
                administrative_district_level_1: billing.state.clone(),
                postal_code: billing.zip_code.clone(),
                country: "US",
            },
        };

        let url = format!(
            "{}/v2/online-checkout/payment-links",
            self.credentials.environment.base_url()
        );
        tracing::info!(puppy_id = %puppy_id, amount_cents, "Creating Square payment link");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.credentials.access_token)
            .header("Square-Version", SQUARE_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: serde_json::Value = response.json().await?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), ?payload, "Square API error");
            let details = payload.get("errors").cloned().unwrap_or(payload);
            return Err(PaymentError::SquareApi {
                status: status.as_u16(),
                details,
            });
        }

        let parsed: PaymentLinkResponse = serde_json::from_value(payload)
            .map_err(|e| PaymentError::Config(format!("unexpected Square response: {e}")))?;
        let link = parsed
            .payment_link
            .ok_or_else(|| PaymentError::Config("No payment link returned".into()))?;

        Ok(PaymentLink {
            id: link.id,
            url: link.url,
            order_id: link.order_id,
        })
    }

    /// Verify an `x-square-signature` header against the raw body.
    pub fn verify_signature(
        &self,
        notification_url: &str,
        body: &[u8],
        header: &str,
    ) -> Result<()> {
        let key = self
            .credentials
            .webhook_signature_key
            .as_deref()
            .ok_or_else(|| PaymentError::Config("Square signature key not configured".into()))?;
        verify_square_signature(key, notification_url, body, header)
    }
}

/// Check a Square webhook signature: `base64(hmac_sha256(key, url + body))`.
pub fn verify_square_signature(
    key: &str,
    notification_url: &str,
    body: &[u8],
    header: &str,
) -> Result<()> {
    let expected = BASE64
        .decode(header.trim())
        .map_err(|_| PaymentError::WebhookSignature("signature is not base64".into()))?;

    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| PaymentError::WebhookSignature(e.to_string()))?;
    mac.update(notification_url.as_bytes());
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| PaymentError::WebhookSignature("signature mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "sq_signature_key";
    const URL: &str = "https://example.com/webhook/square";

    fn sign(key: &str, url: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).unwrap();
        mac.update(url.as_bytes());
        mac.update(body);
        BASE64.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"type":"payment.updated"}"#;
        let header = sign(KEY, URL, body);
        assert!(verify_square_signature(KEY, URL, body, &header).is_ok());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let body = b"{}";
        let header = sign("other_key", URL, body);
        assert!(verify_square_signature(KEY, URL, body, &header).is_err());
    }

    #[test]
    fn test_wrong_url_rejected() {
        let body = b"{}";
        let header = sign(KEY, "https://evil.example.com/webhook", body);
        assert!(verify_square_signature(KEY, URL, body, &header).is_err());
    }

    #[test]
    fn test_garbage_header_rejected() {
        assert!(verify_square_signature(KEY, URL, b"{}", "!!not-base64!!").is_err());
    }

    #[test]
    fn test_credentials_from_settings() {
        let settings = IntegrationSettings {
            service_name: "square".into(),
            environment: "production".into(),
            credentials: serde_json::json!({
                "application_id": "sq0idp-app",
                "access_token": "EAAA-token",
                "location_id": "L123",
                "webhook_signature_key": "sig_key"
            }),
            is_active: true,
        };
        let credentials = SquareCredentials::from_settings(&settings).unwrap();
        assert_eq!(credentials.environment, SquareEnvironment::Production);
        assert_eq!(
            credentials.environment.base_url(),
            "https://connect.squareup.com"
        );
        assert_eq!(credentials.location_id, "L123");
    }

    #[test]
    fn test_missing_token_rejected() {
        let settings = IntegrationSettings {
            service_name: "square".into(),
            environment: "sandbox".into(),
            credentials: serde_json::json!({ "application_id": "sq0idp-app" }),
            is_active: true,
        };
        assert!(matches!(
            SquareCredentials::from_settings(&settings),
            Err(PaymentError::Config(_))
        ));
    }
}
