//! HTTP Handlers

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use adopt_core::{
    money, AdoptionStore, AuthUser, Payment, PaymentSession, Purchase, PurchaseStatus,
    TokenVerifier,
};
use adopt_payments::{
    parse_square_event, parse_stripe_event, BillingInfo, IntentOutcome, IntentRequest,
    PaymentError, PaymentIntentCreator, SquareCredentials, SquareGateway, SquareWebhookIngestor,
    StripeWebhookIngestor,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub square_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

/// Map a payment error onto the HTTP surface
fn payment_error(e: &PaymentError) -> ApiError {
    match e {
        PaymentError::Validation(msg) => {
            api_error(StatusCode::BAD_REQUEST, msg.clone(), "VALIDATION_ERROR")
        }
        PaymentError::PurchaseNotFound(_) => api_error(
            StatusCode::NOT_FOUND,
            e.user_message(),
            "PURCHASE_NOT_FOUND",
        ),
        PaymentError::Config(_) => api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            e.user_message(),
            "PAYMENTS_DISABLED",
        ),
        _ => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.user_message(),
            "PAYMENT_ERROR",
        ),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SquareCheckoutRequest {
    /// Full adoption price in USD; the Square path has no deposit split
    pub amount: Decimal,
    pub puppy_name: String,
    pub puppy_id: Uuid,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub customer_email: String,
    pub billing_info: BillingInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SquareCheckoutResponse {
    pub success: bool,
    pub checkout_url: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SquareErrorResponse {
    pub error: String,
    pub details: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SalesSummary {
    /// Sum of all ledger rows
    pub total_revenue: Decimal,

    /// Purchase counts keyed by status label
    pub purchases_by_status: HashMap<String, usize>,

    /// Average total price over fully-paid purchases
    pub average_sale_price: Option<Decimal>,

    pub payment_count: usize,
}

#[derive(Debug, Serialize)]
pub struct PurchaseWithPayments {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub payments: Vec<Payment>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let square_configured = state
        .store
        .integration_settings("square")
        .map(|s| s.is_some())
        .unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.stripe.is_some(),
        square_configured,
    })
}

/// Resolve the optional bearer token to an account; guests pass through
fn resolve_auth(state: &AppState, headers: &HeaderMap) -> Option<AuthUser> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))?;

    match state.auth.verify(token) {
        Ok(user) => {
            if let Some(ref user) = user {
                tracing::info!(user_id = %user.id, email = %user.email, "User authenticated");
            }
            user
        }
        Err(e) => {
            tracing::warn!(error = %e, "Token verification failed");
            None
        }
    }
}

/// Create a Stripe payment intent for a deposit or balance payment
pub async fn create_payment_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<IntentRequest>,
) -> Result<Json<IntentOutcome>, ApiError> {
    let stripe = state.stripe.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })?;

    let auth = resolve_auth(&state, &headers);
    let creator = PaymentIntentCreator::new(stripe.clone(), state.store.clone());

    let outcome = creator.create(payload, auth.as_ref()).await.map_err(|e| {
        tracing::error!(error = %e, "Payment intent creation failed");
        payment_error(&e)
    })?;

    Ok(Json(outcome))
}

/// Stripe webhook endpoint
///
/// Anything other than a 2xx tells the processor to retry, so recognized,
/// already-processed and harmless-unknown events all ack with 200.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stripe = state.stripe.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "Missing Stripe signature",
                "MISSING_SIGNATURE",
            )
        })?;

    stripe
        .verify_signature(body.as_bytes(), signature)
        .map_err(|e| {
            tracing::warn!(error = %e, "Webhook signature failed");
            api_error(StatusCode::BAD_REQUEST, "Invalid signature", "INVALID_SIGNATURE")
        })?;

    let event = parse_stripe_event(body.as_bytes()).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse webhook body");
        api_error(StatusCode::BAD_REQUEST, "Invalid payload", "INVALID_PAYLOAD")
    })?;

    let ingestor = StripeWebhookIngestor::new(state.store.clone());
    ingestor.handle(event).await.map_err(|e| {
        tracing::error!(error = %e, "Webhook processing error");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook processing failed",
            "WEBHOOK_ERROR",
        )
    })?;

    Ok(Json(serde_json::json!({ "received": true })))
}

/// Build a Square gateway from the stored integration settings
fn square_gateway(state: &AppState) -> Result<SquareGateway, (StatusCode, Json<SquareErrorResponse>)> {
    let settings = state
        .store
        .integration_settings("square")
        .ok()
        .flatten()
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(SquareErrorResponse {
                    error: "Square payment not configured".into(),
                    details: serde_json::Value::Null,
                }),
            )
        })?;

    let credentials = SquareCredentials::from_settings(&settings).map_err(|e| {
        tracing::error!(error = %e, "Square credentials invalid");
        (
            StatusCode::BAD_REQUEST,
            Json(SquareErrorResponse {
                error: "Square credentials not found".into(),
                details: serde_json::Value::Null,
            }),
        )
    })?;

    Ok(SquareGateway::new(credentials))
}

/// Create a Square hosted-checkout payment link
pub async fn square_checkout(
    State(state): State<AppState>,
    Json(payload): Json<SquareCheckoutRequest>,
) -> Result<Json<SquareCheckoutResponse>, (StatusCode, Json<SquareErrorResponse>)> {
    let gateway = square_gateway(&state)?;

    let amount_cents = money::to_cents(payload.amount).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(SquareErrorResponse {
                error: format!("invalid amount: {}", payload.amount),
                details: serde_json::Value::Null,
            }),
        )
    })?;

    let redirect_url = state
        .public_origin
        .as_ref()
        .map(|origin| format!("{origin}/checkout/success"));

    let link = gateway
        .create_payment_link(
            payload.puppy_id,
            &payload.puppy_name,
            amount_cents,
            &payload.customer_email,
            &payload.billing_info,
            redirect_url,
        )
        .await
        .map_err(|e| match e {
            PaymentError::SquareApi { status, details } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST),
                Json(SquareErrorResponse {
                    error: "Failed to create checkout session".into(),
                    details,
                }),
            ),
            other => {
                tracing::error!(error = %other, "Square checkout error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(SquareErrorResponse {
                        error: other.user_message().into(),
                        details: serde_json::Value::Null,
                    }),
                )
            }
        })?;

    let session = PaymentSession::new(
        payload.puppy_id,
        payload.user_id,
        payload.amount,
        link.id.clone(),
        link.order_id.clone(),
        payload.billing_info.email.clone(),
        serde_json::json!({
            "checkout_url": link.url,
            "billing_info": payload.billing_info,
        }),
    );
    // The payment link exists processor-side; a failed session insert is
    // logged, not surfaced
    if let Err(e) = state.store.insert_session(&session) {
        tracing::error!(error = %e, session_id = %link.id, "Failed to store payment session");
    }

    Ok(Json(SquareCheckoutResponse {
        success: true,
        checkout_url: link.url,
        session_id: link.id,
    }))
}

/// Square webhook endpoint
pub async fn square_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let gateway = square_gateway(&state).map_err(|_| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Square payment not configured",
            "PAYMENTS_DISABLED",
        )
    })?;

    let notification_url = state.square_notification_url.as_deref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Square webhook URL not configured",
            "PAYMENTS_DISABLED",
        )
    })?;

    let signature = headers
        .get("x-square-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "Missing Square signature",
                "MISSING_SIGNATURE",
            )
        })?;

    gateway
        .verify_signature(notification_url, body.as_bytes(), signature)
        .map_err(|e| {
            tracing::warn!(error = %e, "Webhook signature failed");
            api_error(StatusCode::BAD_REQUEST, "Invalid signature", "INVALID_SIGNATURE")
        })?;

    let event = parse_square_event(body.as_bytes()).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse webhook body");
        api_error(StatusCode::BAD_REQUEST, "Invalid payload", "INVALID_PAYLOAD")
    })?;

    let ingestor = SquareWebhookIngestor::new(state.store.clone());
    ingestor.handle(event).await.map_err(|e| {
        tracing::error!(error = %e, "Webhook processing error");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook processing failed",
            "WEBHOOK_ERROR",
        )
    })?;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Sales summary for the admin dashboard (read-only aggregation)
pub async fn admin_sales(State(state): State<AppState>) -> Result<Json<SalesSummary>, ApiError> {
    let summary = sales_summary(state.store.as_ref()).map_err(|e| {
        tracing::error!(error = %e, "Sales summary failed");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load sales data",
            "STORE_ERROR",
        )
    })?;
    Ok(Json(summary))
}

fn sales_summary<S: AdoptionStore>(store: &S) -> adopt_core::Result<SalesSummary> {
    let payments = store.payments()?;
    let purchases = store.purchases()?;

    let total_revenue: Decimal = payments.iter().map(|p| p.amount).sum();

    let mut purchases_by_status: HashMap<String, usize> = HashMap::new();
    for purchase in &purchases {
        *purchases_by_status
            .entry(purchase.status.to_string())
            .or_insert(0) += 1;
    }

    let fully_paid: Vec<&Purchase> = purchases
        .iter()
        .filter(|p| p.status == PurchaseStatus::FullyPaid)
        .collect();
    let average_sale_price = if fully_paid.is_empty() {
        None
    } else {
        let total: Decimal = fully_paid.iter().map(|p| p.total_price).sum();
        Some(total / Decimal::from(fully_paid.len()))
    };

    Ok(SalesSummary {
        total_revenue,
        purchases_by_status,
        average_sale_price,
        payment_count: payments.len(),
    })
}

/// Purchase listing with attached ledger rows (read-only)
pub async fn admin_purchases(
    State(state): State<AppState>,
) -> Result<Json<Vec<PurchaseWithPayments>>, ApiError> {
    let purchases = state.store.purchases().map_err(|e| {
        tracing::error!(error = %e, "Purchase listing failed");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load purchases",
            "STORE_ERROR",
        )
    })?;

    let mut rows = Vec::with_capacity(purchases.len());
    for purchase in purchases {
        let payments = state.store.payments_for(purchase.id).map_err(|e| {
            tracing::error!(error = %e, "Payment listing failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load payments",
                "STORE_ERROR",
            )
        })?;
        rows.push(PurchaseWithPayments { purchase, payments });
    }

    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use adopt_core::{MemoryAdoptionStore, Purchase};
    use rust_decimal_macros::dec;

    #[test]
    fn test_sales_summary_aggregates() {
        let store = MemoryAdoptionStore::new();

        let mut first = Purchase::new_deposit(
            Uuid::new_v4(),
            None,
            "Jane Doe",
            "jane@example.com",
            None,
            dec!(2000),
            dec!(500),
            "cus_1",
        );
        first.status = PurchaseStatus::FullyPaid;
        store.create_purchase(&first).unwrap();

        let second = Purchase::new_deposit(
            Uuid::new_v4(),
            None,
            "Sam Roe",
            "sam@example.com",
            None,
            dec!(1000),
            dec!(250),
            "cus_2",
        );
        store.create_purchase(&second).unwrap();

        store
            .record_payment(&Payment::new(first.id, dec!(500), "card", "pi_1", "Deposit"))
            .unwrap();
        store
            .record_payment(&Payment::new(first.id, dec!(1500), "card", "pi_2", "Balance"))
            .unwrap();

        let summary = sales_summary(&store).unwrap();
        assert_eq!(summary.total_revenue, dec!(2000));
        assert_eq!(summary.payment_count, 2);
        assert_eq!(summary.average_sale_price, Some(dec!(2000)));
        assert_eq!(summary.purchases_by_status.get("fully_paid"), Some(&1));
        assert_eq!(summary.purchases_by_status.get("deposit_pending"), Some(&1));
    }

    #[test]
    fn test_square_checkout_request_shape() {
        let request: SquareCheckoutRequest = serde_json::from_str(
            r#"{
                "amount": 1800,
                "puppyName": "Maple",
                "puppyId": "3f2c3f9e-2f63-4f1c-9d15-0c6d6f1b7a10",
                "customerEmail": "buyer@example.com",
                "billingInfo": {
                    "firstName": "Sam",
                    "lastName": "Roe",
                    "email": "buyer@example.com",
                    "phone": "555-0100",
                    "address": "1 Main St",
                    "city": "Austin",
                    "state": "TX",
                    "zipCode": "78701"
                }
            }"#,
        )
        .unwrap();
        assert!(request.user_id.is_none());
        assert_eq!(request.amount, dec!(1800));
    }
}
