//! Application State

use std::sync::Arc;

use adopt_core::{MemoryAdoptionStore, MemoryTokenVerifier};
use adopt_payments::StripeGateway;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Durable adoption state (puppies, purchases, ledger, sessions)
    pub store: Arc<MemoryAdoptionStore>,

    /// Optional bearer-token resolution for account linkage
    pub auth: Arc<MemoryTokenVerifier>,

    /// Stripe gateway (None if not configured)
    pub stripe: Option<Arc<StripeGateway>>,

    /// Public site origin, used for hosted-checkout redirect URLs
    pub public_origin: Option<String>,

    /// Externally visible URL of the Square webhook endpoint; part of the
    /// signed payload on that path
    pub square_notification_url: Option<String>,
}
