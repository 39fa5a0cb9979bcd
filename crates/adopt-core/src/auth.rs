//! Bearer Token Verification
//!
//! The storefront allows guest checkout, so auth is optional everywhere.
//! When a bearer token is present it resolves to an account so the purchase
//! and the cached processor customer ID can be linked to it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// An authenticated storefront account
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

/// Token verification trait
///
/// Implement this against the identity provider; the memory implementation
/// backs tests and local development.
pub trait TokenVerifier: Send + Sync {
    /// Resolve a bearer token to an account. `Ok(None)` means the token is
    /// unknown or expired; checkout then proceeds as a guest.
    fn verify(&self, token: &str) -> Result<Option<AuthUser>>;
}

/// In-memory token verifier (for development)
pub struct MemoryTokenVerifier {
    tokens: RwLock<HashMap<String, AuthUser>>,
}

impl Default for MemoryTokenVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTokenVerifier {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, token: impl Into<String>, user: AuthUser) {
        let mut tokens = self.tokens.write().unwrap();
        tokens.insert(token.into(), user);
    }
}

impl TokenVerifier for MemoryTokenVerifier {
    fn verify(&self, token: &str) -> Result<Option<AuthUser>> {
        let tokens = self.tokens.read().unwrap();
        Ok(tokens.get(token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_token_is_guest() {
        let verifier = MemoryTokenVerifier::new();
        assert!(verifier.verify("nope").unwrap().is_none());
    }

    #[test]
    fn test_registered_token_resolves() {
        let verifier = MemoryTokenVerifier::new();
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: "jane@example.com".into(),
        };
        verifier.register("tok_abc", user.clone());
        let resolved = verifier.verify("tok_abc").unwrap().unwrap();
        assert_eq!(resolved.id, user.id);
    }
}
