//! Puppy Listing Model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Listing status of a puppy
///
/// Payment events only move a puppy forward through
/// Available -> Reserved -> Sold. Staff can pull a puppy from sale
/// at any point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PuppyStatus {
    Available,
    Reserved,
    Sold,
    #[serde(rename = "Not For Sale")]
    NotForSale,
}

impl PuppyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PuppyStatus::Available => "Available",
            PuppyStatus::Reserved => "Reserved",
            PuppyStatus::Sold => "Sold",
            PuppyStatus::NotForSale => "Not For Sale",
        }
    }

    /// Whether a payment-driven transition to `next` is allowed from here
    pub fn can_advance_to(&self, next: PuppyStatus) -> bool {
        matches!(
            (self, next),
            (PuppyStatus::Available, PuppyStatus::Reserved)
                | (PuppyStatus::Available, PuppyStatus::Sold)
                | (PuppyStatus::Reserved, PuppyStatus::Sold)
        )
    }
}

impl std::fmt::Display for PuppyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A puppy listing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Puppy {
    /// Listing ID
    pub id: Uuid,

    /// Call name
    pub name: String,

    /// Breed label
    pub breed: String,

    /// Full adoption price in USD
    pub price: Decimal,

    /// Listing status
    pub status: PuppyStatus,

    /// Account that adopted the puppy (stamped on sale completion)
    pub adopted_by: Option<Uuid>,

    /// When the adoption completed
    pub adopted_at: Option<DateTime<Utc>>,

    /// Listing creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Puppy {
    /// Create a new available listing
    pub fn new(name: impl Into<String>, breed: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            breed: breed.into(),
            price,
            status: PuppyStatus::Available,
            adopted_by: None,
            adopted_at: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_payment_transitions() {
        assert!(PuppyStatus::Available.can_advance_to(PuppyStatus::Reserved));
        assert!(PuppyStatus::Available.can_advance_to(PuppyStatus::Sold));
        assert!(PuppyStatus::Reserved.can_advance_to(PuppyStatus::Sold));

        assert!(!PuppyStatus::Sold.can_advance_to(PuppyStatus::Reserved));
        assert!(!PuppyStatus::Reserved.can_advance_to(PuppyStatus::Reserved));
        assert!(!PuppyStatus::NotForSale.can_advance_to(PuppyStatus::Sold));
    }

    #[test]
    fn test_status_serde_labels() {
        let json = serde_json::to_string(&PuppyStatus::NotForSale).unwrap();
        assert_eq!(json, "\"Not For Sale\"");
        assert_eq!(
            serde_json::from_str::<PuppyStatus>("\"Reserved\"").unwrap(),
            PuppyStatus::Reserved
        );
    }

    #[test]
    fn test_new_listing_is_available() {
        let puppy = Puppy::new("Biscuit", "Golden Retriever", dec!(2000));
        assert_eq!(puppy.status, PuppyStatus::Available);
        assert!(puppy.adopted_at.is_none());
    }
}
