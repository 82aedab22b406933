//! Durable single-use nonce tokens.
//!
//! A nonce token is a freshness anchor for pre-signed transfers. Unlike a
//! timestamp it never expires: an envelope built against a token stays
//! redeemable until the token advances, and advancing it once invalidates
//! every envelope that referenced the previous value. Advance is
//! deterministic (a hash chain over the previous value) so a token can never
//! be wound back to a value it already held.

use crate::crypto::PublicKey;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Prefix for nonce token identifiers.
pub const NONCE_ID_PREFIX: &str = "mnd_nnc_";

/// Domain tag folded into every advance, so the chain cannot collide with
/// other uses of SHA-256 in the protocol.
const ADVANCE_TAG: &[u8] = b"mandate/nonce-advance/v1";

/// Identifier of a nonce token: `mnd_nnc_<uuid-v7>`.
pub type NonceId = String;

/// The 32-byte value a token currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonceValue(#[serde(with = "serde_bytes")] [u8; 32]);

impl NonceValue {
    /// A fresh random value, for newly created tokens.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
        Self(bytes)
    }

    /// Wrap raw value bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw 32 bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// The successor value: `SHA-256(tag || current)`.
    ///
    /// One-way, so no sequence of advances revisits an earlier value.
    pub fn advance(&self) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(ADVANCE_TAG);
        hasher.update(self.0);
        Self(hasher.finalize().into())
    }
}

impl std::fmt::Display for NonceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A durable nonce token: a current value plus the single key allowed to
/// advance it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceToken {
    /// The only identity permitted to advance (consume) this token.
    pub authority: PublicKey,
    /// Current value. Envelopes cite the value they were built against.
    pub value: NonceValue,
}

/// In-memory registry of nonce tokens, keyed by ID.
#[derive(Debug, Default, Clone)]
pub struct NonceRegistry {
    tokens: HashMap<NonceId, NonceToken>,
}

impl NonceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token with a random initial value, owned by `authority`.
    /// Returns the new token's ID.
    pub fn create(&mut self, authority: PublicKey) -> NonceId {
        let id = format!("{}{}", NONCE_ID_PREFIX, uuid::Uuid::now_v7());
        self.tokens.insert(
            id.clone(),
            NonceToken {
                authority,
                value: NonceValue::random(),
            },
        );
        id
    }

    /// The token's current value.
    pub fn value(&self, id: &str) -> Result<NonceValue> {
        self.tokens
            .get(id)
            .map(|t| t.value)
            .ok_or_else(|| Error::NonceNotFound(id.to_string()))
    }

    /// The token's advance authority.
    pub fn authority(&self, id: &str) -> Result<PublicKey> {
        self.tokens
            .get(id)
            .map(|t| t.authority)
            .ok_or_else(|| Error::NonceNotFound(id.to_string()))
    }

    /// Consume the token: verify the caller holds advance authority and that
    /// `expected` is the live value, then advance.
    ///
    /// After this returns `Ok`, any envelope citing `expected` is dead.
    pub fn consume(
        &mut self,
        id: &str,
        caller: &PublicKey,
        expected: &NonceValue,
    ) -> Result<()> {
        let token = self
            .tokens
            .get_mut(id)
            .ok_or_else(|| Error::NonceNotFound(id.to_string()))?;

        if caller != &token.authority {
            return Err(Error::NonceAuthorityMismatch {
                nonce_id: id.to_string(),
            });
        }

        if expected != &token.value {
            return Err(Error::StaleNonce {
                nonce_id: id.to_string(),
            });
        }

        token.value = token.value.advance();
        Ok(())
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the registry holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
