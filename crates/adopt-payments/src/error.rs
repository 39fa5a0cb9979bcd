//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Square API rejection, carrying the processor's error details verbatim
    #[error("Square API error (status {status})")]
    SquareApi {
        status: u16,
        details: serde_json::Value,
    },

    /// Square transport failure
    #[error("Square request failed: {0}")]
    SquareTransport(#[from] reqwest::Error),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Request rejected before any processor call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Balance payment referenced a purchase that does not exist
    #[error("Purchase not found: {0}")]
    PurchaseNotFound(String),

    /// Configuration error (missing key, missing settings row)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] adopt_core::StoreError),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::Stripe(_)
                | PaymentError::SquareTransport(_)
                | PaymentError::Store(_)
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Stripe(_) | PaymentError::SquareApi { .. } => {
                "Payment processing failed. Please try again."
            }
            PaymentError::SquareTransport(_) => "Payment service is unreachable. Please try again.",
            PaymentError::Validation(_) => "Some required checkout information is missing.",
            PaymentError::PurchaseNotFound(_) => "We couldn't find that purchase.",
            PaymentError::Config(_) => "Payments are not configured.",
            _ => "An error occurred processing your request.",
        }
    }
}
