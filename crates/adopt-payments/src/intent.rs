//! Payment Intent Creation (Stripe path)
//!
//! Drives the deposit/balance split: resolves the customer, creates the
//! purchase row for first deposits, and creates the processor intent whose
//! metadata lets the webhook reattach state later.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use adopt_core::{money, AdoptionStore, AuthUser, PaymentType, Purchase};

use crate::error::{PaymentError, Result};
use crate::stripe_gateway::StripeGateway;

/// Checkout request for the payment-element flow
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    pub puppy_id: Uuid,
    pub puppy_name: String,

    /// Full adoption price in USD
    pub puppy_price: Decimal,

    /// Deposit portion in USD
    pub deposit_amount: Decimal,

    #[serde(default = "default_payment_type")]
    pub payment_type: PaymentType,

    /// Required for balance payments; optional retry handle for deposits
    #[serde(default)]
    pub purchase_id: Option<Uuid>,

    /// Required unless the caller is authenticated
    #[serde(default)]
    pub customer_email: Option<String>,

    #[serde(default)]
    pub customer_name: Option<String>,

    #[serde(default)]
    pub customer_phone: Option<String>,
}

fn default_payment_type() -> PaymentType {
    PaymentType::Deposit
}

/// Everything the browser needs to mount the payment element
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentOutcome {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub purchase_id: Uuid,
    pub customer_id: String,
}

/// Orchestrates payment-intent creation against the store and the gateway
pub struct PaymentIntentCreator<S> {
    gateway: Arc<StripeGateway>,
    store: Arc<S>,
}

impl<S: AdoptionStore> PaymentIntentCreator<S> {
    pub fn new(gateway: Arc<StripeGateway>, store: Arc<S>) -> Self {
        Self { gateway, store }
    }

    /// Create a payment intent for a deposit or balance payment.
    ///
    /// Validation failures reject before any processor call. A store failure
    /// after the intent exists is logged, never rolled back against the
    /// processor.
    pub async fn create(
        &self,
        request: IntentRequest,
        auth: Option<&AuthUser>,
    ) -> Result<IntentOutcome> {
        // The session email wins over the request body
        let email = auth
            .map(|user| user.email.clone())
            .or_else(|| request.customer_email.clone())
            .ok_or_else(|| PaymentError::Validation("Customer email is required".into()))?;

        let amount = match request.payment_type {
            PaymentType::Deposit => request.deposit_amount,
            PaymentType::Balance => request.puppy_price - request.deposit_amount,
        };
        let amount_cents = money::to_cents(amount)
            .ok_or_else(|| PaymentError::Validation(format!("invalid amount: {amount}")))?;

        tracing::info!(
            puppy_id = %request.puppy_id,
            payment_type = request.payment_type.as_str(),
            %amount,
            amount_cents,
            "Creating payment intent"
        );

        // Balance payments never create purchases implicitly
        let purchase_id = match (request.payment_type, request.purchase_id) {
            (PaymentType::Balance, None) => {
                return Err(PaymentError::PurchaseNotFound(
                    "balance payment requires a purchase id".into(),
                ));
            }
            (PaymentType::Balance, Some(id)) => {
                if self.store.purchase(id)?.is_none() {
                    return Err(PaymentError::PurchaseNotFound(id.to_string()));
                }
                Some(id)
            }
            (PaymentType::Deposit, existing) => existing,
        };

        let customer_id = self
            .gateway
            .find_or_create_customer(
                &email,
                request.customer_name.as_deref(),
                request.customer_phone.as_deref(),
                auth.map(|user| user.id),
            )
            .await?;

        if let Some(user) = auth {
            self.store.cache_stripe_customer(user.id, &customer_id)?;
        }

        let purchase_id = match purchase_id {
            Some(id) => id,
            None => {
                let purchase = Purchase::new_deposit(
                    request.puppy_id,
                    auth.map(|user| user.id),
                    request.customer_name.clone().unwrap_or_default(),
                    email.clone(),
                    request.customer_phone.clone(),
                    request.puppy_price,
                    request.deposit_amount,
                    customer_id.clone(),
                );
                self.store.create_purchase(&purchase)?;
                tracing::info!(purchase_id = %purchase.id, "Created purchase record");
                purchase.id
            }
        };

        let mut metadata = HashMap::new();
        metadata.insert("purchase_id".to_string(), purchase_id.to_string());
        metadata.insert("puppy_id".to_string(), request.puppy_id.to_string());
        metadata.insert("puppy_name".to_string(), request.puppy_name.clone());
        metadata.insert(
            "payment_type".to_string(),
            request.payment_type.as_str().to_string(),
        );
        metadata.insert("customer_email".to_string(), email.clone());

        let intent = self
            .gateway
            .create_payment_intent(amount_cents, &customer_id, metadata)
            .await?;

        // The intent already exists processor-side; a failed linkage must
        // not surface as a payment failure
        if let Err(e) = self.store.link_payment_intent(purchase_id, &intent.id) {
            tracing::error!(
                purchase_id = %purchase_id,
                payment_intent_id = %intent.id,
                error = %e,
                "Failed to link payment intent to purchase"
            );
        }

        tracing::info!(
            payment_intent_id = %intent.id,
            purchase_id = %purchase_id,
            "Created payment intent"
        );

        Ok(IntentOutcome {
            client_secret: intent.client_secret,
            payment_intent_id: intent.id,
            purchase_id,
            customer_id,
        })
    }
}
