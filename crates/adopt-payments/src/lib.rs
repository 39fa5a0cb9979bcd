//! # adopt-payments
//!
//! Payment processing for the puppy-adoption store across two processors.
//!
//! ## Stripe (payment element)
//!
//! **Flow:** checkout wizard -> payment intent -> embedded payment element
//! -> `payment_intent.*` webhook
//!
//! Supports the deposit/balance split: a first deposit creates the purchase
//! record and reserves the puppy on confirmation; the balance payment
//! completes the sale. The intent's metadata is the only thread connecting
//! the webhook back to local state.
//!
//! ## Square (hosted checkout)
//!
//! **Flow:** checkout form -> payment link -> redirect to Square's hosted
//! page -> `payment.*` / `order.*` webhooks
//!
//! Full-price only, staged through a payment-session record that resolves
//! which puppy and buyer a webhook event belongs to.
//!
//! Webhook delivery is at-least-once and unordered on both paths. Ingestors
//! consume provider event IDs atomically before applying anything, ledger
//! inserts dedupe on processor payment IDs, and every status write is
//! guarded on the expected prior state.

mod error;
mod intent;
mod square_gateway;
mod square_webhook;
mod stripe_gateway;
mod stripe_webhook;

pub use error::{PaymentError, Result};
pub use intent::{IntentOutcome, IntentRequest, PaymentIntentCreator};
pub use square_gateway::{
    verify_square_signature, BillingInfo, PaymentLink, SquareCredentials, SquareEnvironment,
    SquareGateway,
};
pub use square_webhook::{
    parse_event as parse_square_event, SquareEvent, SquareWebhookIngestor,
};
pub use stripe_gateway::{verify_stripe_signature, CreatedIntent, StripeGateway};
pub use stripe_webhook::{
    parse_event as parse_stripe_event, StripeEvent, StripeWebhookIngestor, WebhookOutcome,
};
