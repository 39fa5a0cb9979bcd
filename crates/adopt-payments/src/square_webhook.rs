//! Square Webhook Ingestor
//!
//! Resolves `payment.*` and `order.*` events against the payment-session
//! staging records. A completed payment is the only thing that touches
//! puppy state, and it goes through the same `mark_sold` funnel as the
//! Stripe balance path.

use std::sync::Arc;

use serde::Deserialize;

use adopt_core::{AdoptionStore, StoreError, TransitionOutcome};

use crate::error::{PaymentError, Result};
use crate::stripe_webhook::WebhookOutcome;

/// Raw Square event envelope
#[derive(Clone, Debug, Deserialize)]
pub struct SquareEvent {
    /// Provider event ID, the dedupe key
    pub event_id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    pub data: SquareEventData,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SquareEventData {
    #[serde(default)]
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PaymentObject {
    id: String,

    #[serde(default)]
    status: String,

    order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderObject {
    id: String,
}

/// Parse a raw webhook body into an event envelope
pub fn parse_event(body: &[u8]) -> Result<SquareEvent> {
    serde_json::from_slice(body).map_err(|e| PaymentError::WebhookParse(e.to_string()))
}

/// Webhook handler for the Square path
pub struct SquareWebhookIngestor<S> {
    store: Arc<S>,
}

impl<S: AdoptionStore> SquareWebhookIngestor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, event: SquareEvent) -> Result<WebhookOutcome> {
        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            "Processing Square webhook"
        );

        match event.event_type.as_str() {
            "payment.created" | "payment.updated" | "order.created" | "order.updated" => {}
            other => {
                tracing::debug!(event_type = %other, "Unhandled webhook event");
                return Ok(WebhookOutcome::Ignored);
            }
        }

        if !self.store.mark_event_processed("square", &event.event_id)? {
            tracing::info!(event_id = %event.event_id, "Event already processed, skipping");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        if event.event_type.starts_with("payment.") {
            self.handle_payment(&event.data.object)
        } else {
            self.handle_order(&event.data.object)
        }
    }

    fn handle_payment(&self, object: &serde_json::Value) -> Result<WebhookOutcome> {
        let Some(payment_value) = object.get("payment") else {
            tracing::warn!("Payment event without payment object");
            return Ok(WebhookOutcome::Ignored);
        };
        let payment: PaymentObject = serde_json::from_value(payment_value.clone())
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        let Some(ref order_id) = payment.order_id else {
            tracing::warn!(payment_id = %payment.id, "Payment event without order id");
            return Ok(WebhookOutcome::Ignored);
        };

        let matched = self.store.update_session_payment(
            order_id,
            &payment.status.to_lowercase(),
            &payment.id,
            payment_value,
        )?;
        if !matched {
            tracing::warn!(order_id = %order_id, "No payment session for order");
            return Ok(WebhookOutcome::Ignored);
        }

        if payment.status == "COMPLETED" {
            self.complete_adoption(&payment.id)?;
        }

        Ok(WebhookOutcome::Applied)
    }

    /// Mark the puppy sold once the hosted checkout settled.
    fn complete_adoption(&self, payment_id: &str) -> Result<()> {
        let Some(session) = self.store.session_by_payment(payment_id)? else {
            tracing::warn!(payment_id = %payment_id, "Could not find payment session");
            return Ok(());
        };

        match self.store.mark_sold(session.puppy_id, session.user_id) {
            Ok(TransitionOutcome::Applied) => {
                tracing::info!(
                    puppy_id = %session.puppy_id,
                    user_id = ?session.user_id,
                    "Puppy adopted"
                );
            }
            Ok(outcome) => {
                tracing::warn!(puppy_id = %session.puppy_id, ?outcome, "Puppy status not advanced");
            }
            Err(StoreError::NotFound { .. }) => {
                tracing::warn!(puppy_id = %session.puppy_id, "Puppy row missing for adoption");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn handle_order(&self, object: &serde_json::Value) -> Result<WebhookOutcome> {
        let Some(order_value) = object.get("order") else {
            tracing::warn!("Order event without order object");
            return Ok(WebhookOutcome::Ignored);
        };
        let order: OrderObject = serde_json::from_value(order_value.clone())
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        let matched = self
            .store
            .merge_session_metadata(&order.id, "order_data", order_value)?;
        if !matched {
            tracing::warn!(order_id = %order.id, "No payment session for order");
            return Ok(WebhookOutcome::Ignored);
        }

        Ok(WebhookOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adopt_core::{MemoryAdoptionStore, PaymentSession, Puppy, PuppyStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn setup(user_id: Option<Uuid>) -> (Arc<MemoryAdoptionStore>, Puppy, PaymentSession) {
        let store = Arc::new(MemoryAdoptionStore::new());
        let puppy = Puppy::new("Maple", "Labrador", dec!(1800));
        store.insert_puppy(&puppy).unwrap();
        let session = PaymentSession::new(
            puppy.id,
            user_id,
            dec!(1800),
            "plink_1",
            Some("order_1".into()),
            "buyer@example.com",
            serde_json::json!({"checkout_url": "https://square.link/x"}),
        );
        store.insert_session(&session).unwrap();
        (store, puppy, session)
    }

    fn payment_event(event_id: &str, payment_id: &str, order_id: &str, status: &str) -> SquareEvent {
        parse_event(
            serde_json::json!({
                "event_id": event_id,
                "type": "payment.updated",
                "data": { "object": { "payment": {
                    "id": payment_id,
                    "status": status,
                    "order_id": order_id,
                    "amount_money": { "amount": 180000, "currency": "USD" }
                }}}
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_completed_payment_sells_puppy() {
        let buyer = Uuid::new_v4();
        let (store, puppy, _) = setup(Some(buyer));
        let ingestor = SquareWebhookIngestor::new(store.clone());

        let before = Utc::now();
        let event = payment_event("evt_1", "pay_1", "order_1", "COMPLETED");
        assert_eq!(ingestor.handle(event).await.unwrap(), WebhookOutcome::Applied);

        let puppy = store.puppy(puppy.id).unwrap().unwrap();
        assert_eq!(puppy.status, PuppyStatus::Sold);
        assert_eq!(puppy.adopted_by, Some(buyer));
        assert!(puppy.adopted_at.unwrap() >= before);

        let session = store.session_by_payment("pay_1").unwrap().unwrap();
        assert_eq!(session.status, "completed");
    }

    #[tokio::test]
    async fn test_pending_payment_only_updates_session() {
        let (store, puppy, _) = setup(None);
        let ingestor = SquareWebhookIngestor::new(store.clone());

        let event = payment_event("evt_1", "pay_1", "order_1", "PENDING");
        ingestor.handle(event).await.unwrap();

        assert_eq!(
            store.puppy(puppy.id).unwrap().unwrap().status,
            PuppyStatus::Available
        );
        let session = store.session_by_payment("pay_1").unwrap().unwrap();
        assert_eq!(session.status, "pending");
    }

    #[tokio::test]
    async fn test_redelivered_event_skipped() {
        let (store, _, _) = setup(None);
        let ingestor = SquareWebhookIngestor::new(store);

        let event = payment_event("evt_1", "pay_1", "order_1", "COMPLETED");
        ingestor.handle(event.clone()).await.unwrap();
        assert_eq!(
            ingestor.handle(event).await.unwrap(),
            WebhookOutcome::AlreadyProcessed
        );
    }

    #[tokio::test]
    async fn test_unknown_order_is_logged_no_op() {
        let (store, _, _) = setup(None);
        let ingestor = SquareWebhookIngestor::new(store);

        let event = payment_event("evt_1", "pay_1", "order_unknown", "COMPLETED");
        assert_eq!(ingestor.handle(event).await.unwrap(), WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_order_event_merges_metadata() {
        let (store, _, _) = setup(None);
        let ingestor = SquareWebhookIngestor::new(store.clone());

        let event = parse_event(
            serde_json::json!({
                "event_id": "evt_1",
                "type": "order.updated",
                "data": { "object": { "order": {
                    "id": "order_1",
                    "state": "OPEN",
                    "total_money": { "amount": 180000, "currency": "USD" }
                }}}
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();
        assert_eq!(ingestor.handle(event).await.unwrap(), WebhookOutcome::Applied);

        let session = store.session_by_order("order_1").unwrap().unwrap();
        assert!(session.metadata.get("order_data").is_some());
        assert_eq!(
            session.metadata.get("updated_via_webhook"),
            Some(&serde_json::Value::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_unrecognized_event_ignored() {
        let (store, _, _) = setup(None);
        let ingestor = SquareWebhookIngestor::new(store);

        let event = parse_event(
            serde_json::json!({
                "event_id": "evt_1",
                "type": "refund.created",
                "data": { "object": {} }
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();
        assert_eq!(ingestor.handle(event).await.unwrap(), WebhookOutcome::Ignored);
    }
}
