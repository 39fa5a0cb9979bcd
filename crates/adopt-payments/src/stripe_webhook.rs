//! Stripe Webhook Ingestor
//!
//! Applies payment lifecycle transitions from `payment_intent.*` events.
//! Delivery is at-least-once and unordered, so every effect is guarded:
//! event IDs are consumed atomically up front, ledger inserts dedupe on the
//! processor intent ID, and status updates are conditional on the expected
//! prior state.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use adopt_core::{
    money, AdoptionStore, Payment, PaymentType, PurchaseStatus, StoreError, TransitionOutcome,
};

use crate::error::{PaymentError, Result};

/// Raw Stripe event envelope
#[derive(Clone, Debug, Deserialize)]
pub struct StripeEvent {
    /// Provider event ID (`evt_...`), the dedupe key
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    pub data: StripeEventData,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// The slice of a payment-intent object the ingestor needs
#[derive(Debug, Deserialize)]
struct IntentObject {
    id: String,

    #[serde(default)]
    amount: i64,

    #[serde(default)]
    metadata: HashMap<String, String>,

    #[serde(default)]
    payment_method_types: Vec<String>,

    #[serde(default)]
    last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Deserialize)]
struct LastPaymentError {
    message: Option<String>,
}

/// How an event was absorbed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Transitions applied
    Applied,

    /// Event ID seen before; nothing re-applied
    AlreadyProcessed,

    /// Recognized-but-harmless or unroutable event; acked without effect
    Ignored,
}

/// Parse a raw webhook body into an event envelope
pub fn parse_event(body: &[u8]) -> Result<StripeEvent> {
    serde_json::from_slice(body).map_err(|e| PaymentError::WebhookParse(e.to_string()))
}

/// Webhook handler for the Stripe path
pub struct StripeWebhookIngestor<S> {
    store: Arc<S>,
}

impl<S: AdoptionStore> StripeWebhookIngestor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Process one event. Unrecognized types are acked and ignored; the
    /// processor retries anything that does not get a 2xx.
    pub async fn handle(&self, event: StripeEvent) -> Result<WebhookOutcome> {
        tracing::info!(event_id = %event.id, event_type = %event.event_type, "Processing Stripe webhook");

        match event.event_type.as_str() {
            "payment_intent.succeeded" | "payment_intent.payment_failed" => {}
            other => {
                tracing::debug!(event_type = %other, "Unhandled webhook event");
                return Ok(WebhookOutcome::Ignored);
            }
        }

        if !self.store.mark_event_processed("stripe", &event.id)? {
            tracing::info!(event_id = %event.id, "Event already processed, skipping");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let intent: IntentObject = serde_json::from_value(event.data.object)
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        match event.event_type.as_str() {
            "payment_intent.succeeded" => self.handle_succeeded(&intent),
            _ => self.handle_failed(&intent),
        }
    }

    fn handle_succeeded(&self, intent: &IntentObject) -> Result<WebhookOutcome> {
        let Some(purchase_id) = intent
            .metadata
            .get("purchase_id")
            .and_then(|id| Uuid::parse_str(id).ok())
        else {
            tracing::warn!(
                payment_intent_id = %intent.id,
                "No purchase_id in metadata, skipping database update"
            );
            return Ok(WebhookOutcome::Ignored);
        };

        // Anything that is not an explicit deposit settles the balance
        let payment_type = if intent.metadata.get("payment_type").map(String::as_str)
            == Some("deposit")
        {
            PaymentType::Deposit
        } else {
            PaymentType::Balance
        };

        let amount = money::from_cents(intent.amount);
        let payment_method = intent
            .payment_method_types
            .first()
            .map_or("card", String::as_str);

        let payment = Payment::new(
            purchase_id,
            amount,
            payment_method,
            intent.id.clone(),
            payment_type.ledger_note(),
        );
        match self.store.record_payment(&payment)? {
            TransitionOutcome::Applied => {
                tracing::info!(purchase_id = %purchase_id, %amount, "Created payment record");
            }
            outcome => {
                tracing::warn!(
                    payment_intent_id = %intent.id,
                    ?outcome,
                    "Payment record not inserted"
                );
            }
        }

        if let Some(purchase) = self.store.purchase(purchase_id)? {
            let paid: rust_decimal::Decimal = self
                .store
                .payments_for(purchase_id)?
                .iter()
                .map(|p| p.amount)
                .sum();
            if paid > purchase.total_price {
                tracing::warn!(
                    purchase_id = %purchase_id,
                    %paid,
                    total_price = %purchase.total_price,
                    "Ledger total exceeds purchase price"
                );
            }
        }

        let (from, to): (&[PurchaseStatus], PurchaseStatus) = match payment_type {
            PaymentType::Deposit => (
                &[PurchaseStatus::DepositPending, PurchaseStatus::PaymentFailed],
                PurchaseStatus::DepositPaid,
            ),
            PaymentType::Balance => (&[PurchaseStatus::DepositPaid], PurchaseStatus::FullyPaid),
        };
        match self.store.advance_purchase(purchase_id, from, to) {
            Ok(TransitionOutcome::Applied) => {
                tracing::info!(purchase_id = %purchase_id, status = %to, "Updated purchase status");
            }
            Ok(outcome) => {
                tracing::warn!(purchase_id = %purchase_id, ?outcome, "Purchase status not advanced");
            }
            Err(StoreError::NotFound { .. }) => {
                tracing::warn!(purchase_id = %purchase_id, "Purchase row missing for webhook event");
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(puppy_id) = intent
            .metadata
            .get("puppy_id")
            .and_then(|id| Uuid::parse_str(id).ok())
        {
            let adopted_by = self
                .store
                .purchase(purchase_id)?
                .and_then(|p| p.customer_id);
            let result = match payment_type {
                PaymentType::Deposit => self.store.mark_reserved(puppy_id),
                PaymentType::Balance => self.store.mark_sold(puppy_id, adopted_by),
            };
            match result {
                Ok(TransitionOutcome::Applied) => {
                    tracing::info!(puppy_id = %puppy_id, "Updated puppy status");
                }
                Ok(outcome) => {
                    tracing::warn!(puppy_id = %puppy_id, ?outcome, "Puppy status not advanced");
                }
                Err(StoreError::NotFound { .. }) => {
                    tracing::warn!(puppy_id = %puppy_id, "Puppy row missing for webhook event");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(WebhookOutcome::Applied)
    }

    fn handle_failed(&self, intent: &IntentObject) -> Result<WebhookOutcome> {
        tracing::warn!(
            payment_intent_id = %intent.id,
            error = intent
                .last_payment_error
                .as_ref()
                .and_then(|e| e.message.as_deref()),
            "Payment failed"
        );

        let Some(purchase_id) = intent
            .metadata
            .get("purchase_id")
            .and_then(|id| Uuid::parse_str(id).ok())
        else {
            return Ok(WebhookOutcome::Ignored);
        };

        // Puppy status is left untouched on failure
        match self.store.advance_purchase(
            purchase_id,
            &[PurchaseStatus::DepositPending],
            PurchaseStatus::PaymentFailed,
        ) {
            Ok(outcome) => {
                tracing::info!(purchase_id = %purchase_id, ?outcome, "Marked purchase failed");
                Ok(WebhookOutcome::Applied)
            }
            Err(StoreError::NotFound { .. }) => {
                tracing::warn!(purchase_id = %purchase_id, "Purchase row missing for failed payment");
                Ok(WebhookOutcome::Ignored)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adopt_core::{MemoryAdoptionStore, Puppy, PuppyStatus, Purchase};
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<MemoryAdoptionStore>, Puppy, Purchase) {
        let store = Arc::new(MemoryAdoptionStore::new());
        let puppy = Puppy::new("Biscuit", "Golden Retriever", dec!(2000));
        store.insert_puppy(&puppy).unwrap();
        let purchase = Purchase::new_deposit(
            puppy.id,
            None,
            "Jane Doe",
            "jane@example.com",
            None,
            dec!(2000),
            dec!(500),
            "cus_test",
        );
        store.create_purchase(&purchase).unwrap();
        (store, puppy, purchase)
    }

    fn succeeded_event(
        event_id: &str,
        intent_id: &str,
        amount_cents: i64,
        purchase_id: Uuid,
        puppy_id: Uuid,
        payment_type: &str,
    ) -> StripeEvent {
        parse_event(
            serde_json::json!({
                "id": event_id,
                "type": "payment_intent.succeeded",
                "data": { "object": {
                    "id": intent_id,
                    "amount": amount_cents,
                    "payment_method_types": ["card"],
                    "metadata": {
                        "purchase_id": purchase_id.to_string(),
                        "puppy_id": puppy_id.to_string(),
                        "puppy_name": "Biscuit",
                        "payment_type": payment_type,
                        "customer_email": "jane@example.com"
                    }
                }}
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap()
    }

    fn failed_event(event_id: &str, intent_id: &str, purchase_id: Uuid) -> StripeEvent {
        parse_event(
            serde_json::json!({
                "id": event_id,
                "type": "payment_intent.payment_failed",
                "data": { "object": {
                    "id": intent_id,
                    "metadata": { "purchase_id": purchase_id.to_string() },
                    "last_payment_error": { "message": "card declined" }
                }}
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_deposit_success_reserves_puppy() {
        let (store, puppy, purchase) = setup();
        let ingestor = StripeWebhookIngestor::new(store.clone());

        let event = succeeded_event("evt_1", "pi_1", 50000, purchase.id, puppy.id, "deposit");
        assert_eq!(ingestor.handle(event).await.unwrap(), WebhookOutcome::Applied);

        let purchase = store.purchase(purchase.id).unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::DepositPaid);

        let puppy = store.puppy(puppy.id).unwrap().unwrap();
        assert_eq!(puppy.status, PuppyStatus::Reserved);

        let payments = store.payments_for(purchase.id).unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, dec!(500));
    }

    #[tokio::test]
    async fn test_balance_after_deposit_completes_sale() {
        let (store, puppy, purchase) = setup();
        let ingestor = StripeWebhookIngestor::new(store.clone());

        let deposit = succeeded_event("evt_1", "pi_1", 50000, purchase.id, puppy.id, "deposit");
        ingestor.handle(deposit).await.unwrap();

        let balance = succeeded_event("evt_2", "pi_2", 150000, purchase.id, puppy.id, "balance");
        assert_eq!(
            ingestor.handle(balance).await.unwrap(),
            WebhookOutcome::Applied
        );

        let purchase = store.purchase(purchase.id).unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::FullyPaid);

        let puppy = store.puppy(puppy.id).unwrap().unwrap();
        assert_eq!(puppy.status, PuppyStatus::Sold);

        let payments = store.payments_for(purchase.id).unwrap();
        assert_eq!(payments.len(), 2);
        let total: rust_decimal::Decimal = payments.iter().map(|p| p.amount).sum();
        assert_eq!(total, dec!(2000));
    }

    #[tokio::test]
    async fn test_redelivered_event_is_no_op() {
        let (store, puppy, purchase) = setup();
        let ingestor = StripeWebhookIngestor::new(store.clone());

        let event = succeeded_event("evt_1", "pi_1", 50000, purchase.id, puppy.id, "deposit");
        ingestor.handle(event.clone()).await.unwrap();
        assert_eq!(
            ingestor.handle(event).await.unwrap(),
            WebhookOutcome::AlreadyProcessed
        );

        assert_eq!(store.payments_for(purchase.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_intent_under_new_event_id_does_not_duplicate_ledger() {
        let (store, puppy, purchase) = setup();
        let ingestor = StripeWebhookIngestor::new(store.clone());

        let first = succeeded_event("evt_1", "pi_1", 50000, purchase.id, puppy.id, "deposit");
        ingestor.handle(first).await.unwrap();
        let second = succeeded_event("evt_2", "pi_1", 50000, purchase.id, puppy.id, "deposit");
        ingestor.handle(second).await.unwrap();

        assert_eq!(store.payments_for(purchase.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_payment_leaves_puppy_untouched() {
        let (store, puppy, purchase) = setup();
        let ingestor = StripeWebhookIngestor::new(store.clone());

        let before = store.puppy(puppy.id).unwrap().unwrap().status;
        let event = failed_event("evt_1", "pi_1", purchase.id);
        assert_eq!(ingestor.handle(event).await.unwrap(), WebhookOutcome::Applied);

        let purchase = store.purchase(purchase.id).unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::PaymentFailed);
        assert_eq!(store.puppy(puppy.id).unwrap().unwrap().status, before);
    }

    #[tokio::test]
    async fn test_deposit_retry_after_failure_succeeds() {
        let (store, puppy, purchase) = setup();
        let ingestor = StripeWebhookIngestor::new(store.clone());

        ingestor
            .handle(failed_event("evt_1", "pi_1", purchase.id))
            .await
            .unwrap();
        let retry = succeeded_event("evt_2", "pi_2", 50000, purchase.id, puppy.id, "deposit");
        ingestor.handle(retry).await.unwrap();

        let purchase = store.purchase(purchase.id).unwrap().unwrap();
        assert_eq!(purchase.status, PurchaseStatus::DepositPaid);
    }

    #[tokio::test]
    async fn test_unrecognized_event_ignored() {
        let (store, _, _) = setup();
        let ingestor = StripeWebhookIngestor::new(store);

        let event = parse_event(
            serde_json::json!({
                "id": "evt_x",
                "type": "charge.refunded",
                "data": { "object": {} }
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();
        assert_eq!(ingestor.handle(event).await.unwrap(), WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_missing_purchase_metadata_ignored() {
        let (store, _, _) = setup();
        let ingestor = StripeWebhookIngestor::new(store);

        let event = parse_event(
            serde_json::json!({
                "id": "evt_x",
                "type": "payment_intent.succeeded",
                "data": { "object": { "id": "pi_x", "amount": 50000, "metadata": {} } }
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();
        assert_eq!(ingestor.handle(event).await.unwrap(), WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_overpayment_recorded_not_rejected() {
        let (store, puppy, purchase) = setup();
        let ingestor = StripeWebhookIngestor::new(store.clone());

        let deposit = succeeded_event("evt_1", "pi_1", 50000, purchase.id, puppy.id, "deposit");
        ingestor.handle(deposit).await.unwrap();
        // Balance overpays by $100; ledger stays append-only
        let balance = succeeded_event("evt_2", "pi_2", 160000, purchase.id, puppy.id, "balance");
        assert_eq!(
            ingestor.handle(balance).await.unwrap(),
            WebhookOutcome::Applied
        );
        assert_eq!(store.payments_for(purchase.id).unwrap().len(), 2);
    }
}
