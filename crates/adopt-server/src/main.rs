//! Puppy-Adoption Payment Server
//!
//! Axum-based server exposing the Stripe payment-intent and Square
//! hosted-checkout APIs, their webhook endpoints, and admin sales views.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adopt_core::{AdoptionStore, IntegrationSettings, MemoryAdoptionStore, MemoryTokenVerifier};
use adopt_payments::StripeGateway;

use crate::handlers::{
    admin_purchases, admin_sales, create_payment_intent, health_check, square_checkout,
    square_webhook, stripe_webhook,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Initialize storage
    let store = Arc::new(MemoryAdoptionStore::new());
    let auth = Arc::new(MemoryTokenVerifier::new());

    // Initialize Stripe
    let stripe = StripeGateway::from_env().ok();

    if stripe.is_some() {
        tracing::info!("✓ Stripe configured");
    } else {
        tracing::warn!("⚠ Stripe not configured - card payments disabled");
        tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
    }

    // Seed Square settings from the environment when present. Square
    // credentials otherwise come from the integration-settings table.
    if let Ok(access_token) = std::env::var("SQUARE_ACCESS_TOKEN") {
        let settings = IntegrationSettings {
            service_name: "square".into(),
            environment: std::env::var("SQUARE_ENVIRONMENT")
                .unwrap_or_else(|_| "sandbox".into()),
            credentials: serde_json::json!({
                "application_id": std::env::var("SQUARE_APP_ID").unwrap_or_default(),
                "access_token": access_token,
                "location_id": std::env::var("SQUARE_LOCATION_ID").unwrap_or_default(),
                "webhook_signature_key": std::env::var("SQUARE_WEBHOOK_SIGNATURE_KEY").ok(),
            }),
            is_active: true,
        };
        store.upsert_integration_settings(&settings)?;
        tracing::info!("✓ Square configured from environment");
    } else if store.integration_settings("square")?.is_none() {
        tracing::warn!("⚠ Square not configured - hosted checkout disabled");
        tracing::warn!("  Set SQUARE_ACCESS_TOKEN and SQUARE_APP_ID in .env");
    }

    // Build application state
    let state = AppState {
        store,
        auth,
        stripe: stripe.map(Arc::new),
        public_origin: std::env::var("PUBLIC_ORIGIN").ok(),
        square_notification_url: std::env::var("SQUARE_NOTIFICATION_URL").ok(),
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        // Health
        .route("/health", get(health_check))
        // Payments
        .route("/api/payments/stripe/intent", post(create_payment_intent))
        .route("/api/payments/square/checkout", post(square_checkout))
        // Webhooks
        .route("/webhook/stripe", post(stripe_webhook))
        .route("/webhook/square", post(square_webhook))
        // Admin
        .route("/api/admin/sales", get(admin_sales))
        .route("/api/admin/purchases", get(admin_purchases))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🐶 adoption payment server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                       - Health check");
    tracing::info!("  POST /api/payments/stripe/intent   - Create payment intent");
    tracing::info!("  POST /api/payments/square/checkout - Create hosted checkout");
    tracing::info!("  POST /webhook/stripe               - Stripe events");
    tracing::info!("  POST /webhook/square               - Square events");
    tracing::info!("  GET  /api/admin/sales              - Sales summary");
    tracing::info!("  GET  /api/admin/purchases          - Purchases with ledger");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
