//! Adoption Store
//!
//! Storage seam over the managed relational database. Handlers only talk to
//! the `AdoptionStore` trait; the memory implementation backs development
//! and tests.
//!
//! Status mutations are state-guarded: they apply only when the row is in an
//! expected prior state and report a structured outcome instead of silently
//! overwriting. Webhook redelivery is absorbed by `mark_event_processed` and
//! by ledger dedupe on the processor payment ID.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::puppy::{Puppy, PuppyStatus};
use crate::purchase::{Payment, Purchase, PurchaseStatus};
use crate::session::PaymentSession;

/// Outcome of a guarded state transition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionOutcome {
    /// Transition applied
    Applied,

    /// Row was already in the target state (redelivered event)
    AlreadyApplied,

    /// Row was in a state the transition is not valid from
    InvalidState { current: String },
}

/// Per-environment processor credentials, one row per service
///
/// Mirrors the settings table the Square checkout loads its credentials
/// from (`service_name = "square"`), rather than the environment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntegrationSettings {
    pub service_name: String,

    /// "sandbox" or "production"
    pub environment: String,

    /// Service-specific credential blob
    pub credentials: serde_json::Value,

    pub is_active: bool,
}

/// Storage trait for all durable adoption state
pub trait AdoptionStore: Send + Sync {
    // --- puppies ---

    fn insert_puppy(&self, puppy: &Puppy) -> Result<()>;

    fn puppy(&self, id: Uuid) -> Result<Option<Puppy>>;

    /// Guarded Available -> Reserved transition (deposit confirmed)
    fn mark_reserved(&self, puppy_id: Uuid) -> Result<TransitionOutcome>;

    /// Guarded transition to Sold, stamping `adopted_by`/`adopted_at`
    fn mark_sold(&self, puppy_id: Uuid, adopted_by: Option<Uuid>) -> Result<TransitionOutcome>;

    /// Staff action; allowed from any state
    fn mark_not_for_sale(&self, puppy_id: Uuid) -> Result<TransitionOutcome>;

    // --- purchases ---

    fn create_purchase(&self, purchase: &Purchase) -> Result<()>;

    fn purchase(&self, id: Uuid) -> Result<Option<Purchase>>;

    fn purchases(&self) -> Result<Vec<Purchase>>;

    /// Persist the processor intent ID onto the purchase row
    fn link_payment_intent(&self, purchase_id: Uuid, intent_id: &str) -> Result<()>;

    /// Guarded status advance; applies only when the current status is one
    /// of `from`
    fn advance_purchase(
        &self,
        purchase_id: Uuid,
        from: &[PurchaseStatus],
        to: PurchaseStatus,
    ) -> Result<TransitionOutcome>;

    // --- payment ledger ---

    /// Append a ledger row. Deduped on `processor_payment_id`; a redelivered
    /// event reports `AlreadyApplied` instead of inserting twice.
    fn record_payment(&self, payment: &Payment) -> Result<TransitionOutcome>;

    fn payments_for(&self, purchase_id: Uuid) -> Result<Vec<Payment>>;

    fn payments(&self) -> Result<Vec<Payment>>;

    // --- square sessions ---

    fn insert_session(&self, session: &PaymentSession) -> Result<()>;

    fn session_by_order(&self, order_id: &str) -> Result<Option<PaymentSession>>;

    fn session_by_payment(&self, payment_id: &str) -> Result<Option<PaymentSession>>;

    /// Update status/payment ID on the session matching `order_id`.
    /// Returns false when no session matches (logged no-op upstream).
    fn update_session_payment(
        &self,
        order_id: &str,
        status: &str,
        payment_id: &str,
        payload: &serde_json::Value,
    ) -> Result<bool>;

    /// Merge a webhook payload into the session's metadata blob under `key`
    fn merge_session_metadata(
        &self,
        order_id: &str,
        key: &str,
        payload: &serde_json::Value,
    ) -> Result<bool>;

    // --- profiles ---

    /// Cache the processor customer ID on an authenticated user's profile
    fn cache_stripe_customer(&self, user_id: Uuid, customer_id: &str) -> Result<()>;

    fn stripe_customer_for(&self, user_id: Uuid) -> Result<Option<String>>;

    // --- integration settings ---

    fn integration_settings(&self, service_name: &str) -> Result<Option<IntegrationSettings>>;

    fn upsert_integration_settings(&self, settings: &IntegrationSettings) -> Result<()>;

    // --- webhook dedupe ---

    /// Atomic check-and-insert of a provider event ID. Returns true the
    /// first time an event is seen, false on redelivery.
    fn mark_event_processed(&self, provider: &str, event_id: &str) -> Result<bool>;
}

/// In-memory adoption store (for development and tests)
pub struct MemoryAdoptionStore {
    puppies: RwLock<HashMap<Uuid, Puppy>>,
    purchases: RwLock<HashMap<Uuid, Purchase>>,
    payments: RwLock<Vec<Payment>>,
    sessions: RwLock<HashMap<Uuid, PaymentSession>>,
    profiles: RwLock<HashMap<Uuid, String>>,
    settings: RwLock<HashMap<String, IntegrationSettings>>,
    processed_events: RwLock<HashSet<(String, String)>>,
}

impl Default for MemoryAdoptionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdoptionStore {
    pub fn new() -> Self {
        Self {
            puppies: RwLock::new(HashMap::new()),
            purchases: RwLock::new(HashMap::new()),
            payments: RwLock::new(Vec::new()),
            sessions: RwLock::new(HashMap::new()),
            profiles: RwLock::new(HashMap::new()),
            settings: RwLock::new(HashMap::new()),
            processed_events: RwLock::new(HashSet::new()),
        }
    }
}

impl AdoptionStore for MemoryAdoptionStore {
    fn insert_puppy(&self, puppy: &Puppy) -> Result<()> {
        let mut puppies = self.puppies.write().unwrap();
        puppies.insert(puppy.id, puppy.clone());
        Ok(())
    }

    fn puppy(&self, id: Uuid) -> Result<Option<Puppy>> {
        let puppies = self.puppies.read().unwrap();
        Ok(puppies.get(&id).cloned())
    }

    fn mark_reserved(&self, puppy_id: Uuid) -> Result<TransitionOutcome> {
        let mut puppies = self.puppies.write().unwrap();
        let puppy = puppies
            .get_mut(&puppy_id)
            .ok_or_else(|| StoreError::not_found("puppy", puppy_id))?;

        if puppy.status == PuppyStatus::Reserved {
            return Ok(TransitionOutcome::AlreadyApplied);
        }
        if !puppy.status.can_advance_to(PuppyStatus::Reserved) {
            return Ok(TransitionOutcome::InvalidState {
                current: puppy.status.to_string(),
            });
        }

        puppy.status = PuppyStatus::Reserved;
        Ok(TransitionOutcome::Applied)
    }

    fn mark_sold(&self, puppy_id: Uuid, adopted_by: Option<Uuid>) -> Result<TransitionOutcome> {
        let mut puppies = self.puppies.write().unwrap();
        let puppy = puppies
            .get_mut(&puppy_id)
            .ok_or_else(|| StoreError::not_found("puppy", puppy_id))?;

        if puppy.status == PuppyStatus::Sold {
            return Ok(TransitionOutcome::AlreadyApplied);
        }
        if !puppy.status.can_advance_to(PuppyStatus::Sold) {
            return Ok(TransitionOutcome::InvalidState {
                current: puppy.status.to_string(),
            });
        }

        puppy.status = PuppyStatus::Sold;
        puppy.adopted_by = adopted_by;
        puppy.adopted_at = Some(Utc::now());
        Ok(TransitionOutcome::Applied)
    }

    fn mark_not_for_sale(&self, puppy_id: Uuid) -> Result<TransitionOutcome> {
        let mut puppies = self.puppies.write().unwrap();
        let puppy = puppies
            .get_mut(&puppy_id)
            .ok_or_else(|| StoreError::not_found("puppy", puppy_id))?;

        if puppy.status == PuppyStatus::NotForSale {
            return Ok(TransitionOutcome::AlreadyApplied);
        }
        puppy.status = PuppyStatus::NotForSale;
        Ok(TransitionOutcome::Applied)
    }

    fn create_purchase(&self, purchase: &Purchase) -> Result<()> {
        let mut purchases = self.purchases.write().unwrap();
        if purchases.contains_key(&purchase.id) {
            return Err(StoreError::Conflict(format!(
                "purchase {} already exists",
                purchase.id
            )));
        }
        purchases.insert(purchase.id, purchase.clone());
        Ok(())
    }

    fn purchase(&self, id: Uuid) -> Result<Option<Purchase>> {
        let purchases = self.purchases.read().unwrap();
        Ok(purchases.get(&id).cloned())
    }

    fn purchases(&self) -> Result<Vec<Purchase>> {
        let purchases = self.purchases.read().unwrap();
        let mut rows: Vec<Purchase> = purchases.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    fn link_payment_intent(&self, purchase_id: Uuid, intent_id: &str) -> Result<()> {
        let mut purchases = self.purchases.write().unwrap();
        let purchase = purchases
            .get_mut(&purchase_id)
            .ok_or_else(|| StoreError::not_found("purchase", purchase_id))?;
        purchase.stripe_payment_intent_id = Some(intent_id.to_string());
        purchase.updated_at = Utc::now();
        Ok(())
    }

    fn advance_purchase(
        &self,
        purchase_id: Uuid,
        from: &[PurchaseStatus],
        to: PurchaseStatus,
    ) -> Result<TransitionOutcome> {
        let mut purchases = self.purchases.write().unwrap();
        let purchase = purchases
            .get_mut(&purchase_id)
            .ok_or_else(|| StoreError::not_found("purchase", purchase_id))?;

        if purchase.status == to {
            return Ok(TransitionOutcome::AlreadyApplied);
        }
        if !from.contains(&purchase.status) {
            return Ok(TransitionOutcome::InvalidState {
                current: purchase.status.to_string(),
            });
        }

        purchase.status = to;
        purchase.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied)
    }

    fn record_payment(&self, payment: &Payment) -> Result<TransitionOutcome> {
        let mut payments = self.payments.write().unwrap();

        if let Some(ref processor_id) = payment.processor_payment_id {
            let duplicate = payments
                .iter()
                .any(|p| p.processor_payment_id.as_deref() == Some(processor_id));
            if duplicate {
                return Ok(TransitionOutcome::AlreadyApplied);
            }
        }

        payments.push(payment.clone());
        Ok(TransitionOutcome::Applied)
    }

    fn payments_for(&self, purchase_id: Uuid) -> Result<Vec<Payment>> {
        let payments = self.payments.read().unwrap();
        Ok(payments
            .iter()
            .filter(|p| p.purchase_id == purchase_id)
            .cloned()
            .collect())
    }

    fn payments(&self) -> Result<Vec<Payment>> {
        let payments = self.payments.read().unwrap();
        Ok(payments.clone())
    }

    fn insert_session(&self, session: &PaymentSession) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    fn session_by_order(&self, order_id: &str) -> Result<Option<PaymentSession>> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions
            .values()
            .find(|s| s.order_id.as_deref() == Some(order_id))
            .cloned())
    }

    fn session_by_payment(&self, payment_id: &str) -> Result<Option<PaymentSession>> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions
            .values()
            .find(|s| s.payment_id.as_deref() == Some(payment_id))
            .cloned())
    }

    fn update_session_payment(
        &self,
        order_id: &str,
        status: &str,
        payment_id: &str,
        payload: &serde_json::Value,
    ) -> Result<bool> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions
            .values_mut()
            .find(|s| s.order_id.as_deref() == Some(order_id));

        let Some(session) = session else {
            return Ok(false);
        };

        session.status = status.to_string();
        session.payment_id = Some(payment_id.to_string());
        session.updated_at = Utc::now();
        if let Some(map) = session.metadata.as_object_mut() {
            map.insert("payment".into(), payload.clone());
            map.insert("updated_via_webhook".into(), serde_json::Value::Bool(true));
        }
        Ok(true)
    }

    fn merge_session_metadata(
        &self,
        order_id: &str,
        key: &str,
        payload: &serde_json::Value,
    ) -> Result<bool> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions
            .values_mut()
            .find(|s| s.order_id.as_deref() == Some(order_id));

        let Some(session) = session else {
            return Ok(false);
        };

        if let Some(map) = session.metadata.as_object_mut() {
            map.insert(key.to_string(), payload.clone());
            map.insert("updated_via_webhook".into(), serde_json::Value::Bool(true));
        }
        session.updated_at = Utc::now();
        Ok(true)
    }

    fn cache_stripe_customer(&self, user_id: Uuid, customer_id: &str) -> Result<()> {
        let mut profiles = self.profiles.write().unwrap();
        profiles.insert(user_id, customer_id.to_string());
        Ok(())
    }

    fn stripe_customer_for(&self, user_id: Uuid) -> Result<Option<String>> {
        let profiles = self.profiles.read().unwrap();
        Ok(profiles.get(&user_id).cloned())
    }

    fn integration_settings(&self, service_name: &str) -> Result<Option<IntegrationSettings>> {
        let settings = self.settings.read().unwrap();
        Ok(settings
            .get(service_name)
            .filter(|s| s.is_active)
            .cloned())
    }

    fn upsert_integration_settings(&self, settings: &IntegrationSettings) -> Result<()> {
        let mut rows = self.settings.write().unwrap();
        rows.insert(settings.service_name.clone(), settings.clone());
        Ok(())
    }

    fn mark_event_processed(&self, provider: &str, event_id: &str) -> Result<bool> {
        let mut seen = self.processed_events.write().unwrap();
        Ok(seen.insert((provider.to_string(), event_id.to_string())))
    }
}
