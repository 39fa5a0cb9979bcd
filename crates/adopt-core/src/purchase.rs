//! Purchase and Payment Ledger Models
//!
//! A `Purchase` tracks one adoption transaction through the deposit/balance
//! split. `Payment` rows are an append-only ledger written only when a
//! processor confirms success.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Days until the balance is due after a deposit
pub const BALANCE_DUE_DAYS: i64 = 14;

/// Which half of the split a payment covers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Deposit,
    Balance,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Deposit => "deposit",
            PaymentType::Balance => "balance",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(PaymentType::Deposit),
            "balance" => Some(PaymentType::Balance),
            _ => None,
        }
    }

    /// Free-text note written onto the ledger row
    pub fn ledger_note(&self) -> &'static str {
        match self {
            PaymentType::Deposit => "Deposit payment via Stripe",
            PaymentType::Balance => "Balance payment via Stripe",
        }
    }
}

/// Purchase lifecycle status
///
/// Only advances forward, except `PaymentFailed` which is reachable from
/// `DepositPending` (and can be retried back to `DepositPaid`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    DepositPending,
    DepositPaid,
    FullyPaid,
    PaymentFailed,
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::DepositPending => "deposit_pending",
            PurchaseStatus::DepositPaid => "deposit_paid",
            PurchaseStatus::FullyPaid => "fully_paid",
            PurchaseStatus::PaymentFailed => "payment_failed",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One adoption transaction
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Purchase {
    /// Purchase ID
    pub id: Uuid,

    /// Puppy being adopted
    pub puppy_id: Uuid,

    /// Account of the buyer, if authenticated (guest checkout allowed)
    pub customer_id: Option<Uuid>,

    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,

    /// Full adoption price
    pub total_price: Decimal,

    /// Deposit portion
    pub deposit_amount: Decimal,

    /// Balance still owed; `total_price - deposit_amount` at creation
    pub remaining_amount: Decimal,

    pub status: PurchaseStatus,

    /// Date the balance is due
    pub due_date: NaiveDate,

    /// Processor-side customer ID
    pub stripe_customer_id: Option<String>,

    /// Processor-side payment-intent ID; the webhook correlates on this
    pub stripe_payment_intent_id: Option<String>,

    pub notes: Option<String>,
    pub admin_notes: Option<String>,

    /// Refund bookkeeping (staff-entered)
    pub refund_amount: Option<Decimal>,
    pub refund_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Purchase {
    /// Create a new deposit-pending purchase for a deposit checkout.
    ///
    /// Balance payments never create purchases; they require an existing
    /// purchase ID.
    pub fn new_deposit(
        puppy_id: Uuid,
        customer_id: Option<Uuid>,
        customer_name: impl Into<String>,
        customer_email: impl Into<String>,
        customer_phone: Option<String>,
        total_price: Decimal,
        deposit_amount: Decimal,
        stripe_customer_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            puppy_id,
            customer_id,
            customer_name: customer_name.into(),
            customer_email: customer_email.into(),
            customer_phone,
            total_price,
            deposit_amount,
            remaining_amount: total_price - deposit_amount,
            status: PurchaseStatus::DepositPending,
            due_date: (now + Duration::days(BALANCE_DUE_DAYS)).date_naive(),
            stripe_customer_id: Some(stripe_customer_id.into()),
            stripe_payment_intent_id: None,
            notes: None,
            admin_notes: None,
            refund_amount: None,
            refund_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One confirmed payment, written by a webhook ingestor. Immutable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    /// Ledger row ID
    pub id: Uuid,

    /// Purchase this payment belongs to
    pub purchase_id: Uuid,

    /// Amount in USD
    pub amount: Decimal,

    /// Payment method as reported by the processor ("card", ...)
    pub payment_method: String,

    /// Processor payment/intent ID; ledger inserts dedupe on this
    pub processor_payment_id: Option<String>,

    /// Free-text note distinguishing deposit vs balance
    pub notes: Option<String>,

    pub payment_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        purchase_id: Uuid,
        amount: Decimal,
        payment_method: impl Into<String>,
        processor_payment_id: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            purchase_id,
            amount,
            payment_method: payment_method.into(),
            processor_payment_id: Some(processor_payment_id.into()),
            notes: Some(notes.into()),
            payment_date: now,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_deposit_purchase_amounts() {
        let purchase = Purchase::new_deposit(
            Uuid::new_v4(),
            None,
            "Jane Doe",
            "jane@example.com",
            None,
            dec!(2000),
            dec!(500),
            "cus_test",
        );
        assert_eq!(purchase.remaining_amount, dec!(1500));
        assert_eq!(purchase.status, PurchaseStatus::DepositPending);
        assert_eq!(
            purchase.due_date,
            (purchase.created_at + Duration::days(BALANCE_DUE_DAYS)).date_naive()
        );
    }

    #[test]
    fn test_payment_type_labels() {
        assert_eq!(PaymentType::from_str("deposit"), Some(PaymentType::Deposit));
        assert_eq!(PaymentType::from_str("balance"), Some(PaymentType::Balance));
        assert_eq!(PaymentType::from_str("refund"), None);
        assert_eq!(
            serde_json::to_string(&PaymentType::Balance).unwrap(),
            "\"balance\""
        );
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&PurchaseStatus::DepositPaid).unwrap(),
            "\"deposit_paid\""
        );
    }
}
