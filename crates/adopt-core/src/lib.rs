//! # adopt-core
//!
//! Domain model and storage seam for the puppy-adoption store.
//!
//! The durable state (puppies, purchases, payment ledger, Square sessions)
//! lives in a managed relational database; this crate exposes it through the
//! [`AdoptionStore`] trait so handlers stay testable against the memory
//! implementation. All monetary values are `rust_decimal::Decimal`.

mod auth;
mod error;
pub mod money;
mod puppy;
mod purchase;
mod session;
mod store;

pub use auth::{AuthUser, MemoryTokenVerifier, TokenVerifier};
pub use error::{Result, StoreError};
pub use puppy::{Puppy, PuppyStatus};
pub use purchase::{Payment, PaymentType, Purchase, PurchaseStatus, BALANCE_DUE_DAYS};
pub use session::PaymentSession;
pub use store::{AdoptionStore, IntegrationSettings, MemoryAdoptionStore, TransitionOutcome};
