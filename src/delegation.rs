//! Delegation records and their content-addressed store.
//!
//! A [`Delegation`] is the sole stateful entity of the protocol: who may
//! move how much of whose funds, until when. Records live at a
//! deterministic address derived by hashing a namespace tag together with
//! the two principal identities, so lookup needs no separate index and
//! creation at an occupied address fails instead of overwriting.
//!
//! Expiry is a derived condition, never written back: `now > expires_at`
//! is recomputed on every use. The only stored transition after creation is
//! revocation (`is_active = false`), which is terminal for that address
//! until the record is recreated.

use crate::crypto::PublicKey;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Namespace tag folded into every record address.
const ADDRESS_TAG: &[u8] = b"mandate/delegation/v1";

/// Deterministic address of a delegation record.
///
/// `SHA-256(tag || user || delegate || seed)`: computable by anyone holding
/// the two identities, no registry required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordAddress(#[serde(with = "serde_bytes")] [u8; 32]);

impl RecordAddress {
    /// Derive the address for a (user, delegate) pair with a seed.
    pub fn derive(user: &PublicKey, delegate: &PublicKey, seed: u8) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(ADDRESS_TAG);
        hasher.update(user.to_bytes());
        hasher.update(delegate.to_bytes());
        hasher.update([seed]);
        Self(hasher.finalize().into())
    }

    /// The raw 32 bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl std::fmt::Display for RecordAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// The authoritative delegation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Fund owner. Exclusive owner of the underlying balance.
    pub user: PublicKey,
    /// Identity authorized to invoke transfers.
    pub delegate: PublicKey,
    /// Cap on the amount of a single transfer call. There is no running
    /// total: each call is bounded independently.
    pub max_amount: u64,
    /// Absolute expiry. `None` means the record never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// False once revoked. Expiry is never stored here; it is derived.
    pub is_active: bool,
    /// Disambiguator folded into the address derivation.
    pub address_seed: u8,
}

impl Delegation {
    /// The deterministic address this record lives at.
    pub fn address(&self) -> RecordAddress {
        RecordAddress::derive(&self.user, &self.delegate, self.address_seed)
    }

    /// Whether the expiry has passed at `now`. The boundary is inclusive:
    /// a record is still usable at exactly `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }
}

/// Content-addressed store of delegation records.
///
/// `BTreeMap` keeps iteration deterministic, which keeps audit output and
/// tests stable.
#[derive(Debug, Default, Clone)]
pub struct DelegationStore {
    records: BTreeMap<RecordAddress, Delegation>,
}

impl DelegationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly created record at its deterministic address.
    ///
    /// Fails with `DelegationExists` if an **active** record already
    /// occupies the address. A revoked record may be overwritten: revocation
    /// is terminal for the old record, not for the address.
    pub fn create(&mut self, record: Delegation) -> Result<RecordAddress> {
        let address = record.address();
        if let Some(existing) = self.records.get(&address) {
            if existing.is_active {
                return Err(Error::DelegationExists {
                    address: address.to_string(),
                });
            }
        }
        self.records.insert(address, record);
        Ok(address)
    }

    /// Look up the record for a (user, delegate) pair, seed 0.
    pub fn get(&self, user: &PublicKey, delegate: &PublicKey) -> Option<&Delegation> {
        self.records.get(&RecordAddress::derive(user, delegate, 0))
    }

    /// Look up a record by its address.
    pub fn get_at(&self, address: &RecordAddress) -> Option<&Delegation> {
        self.records.get(address)
    }

    /// Mark the record revoked. Not idempotent: revoking a missing or
    /// already-inactive record fails with `NoActiveDelegation`.
    pub fn revoke(&mut self, user: &PublicKey, delegate: &PublicKey) -> Result<()> {
        let address = RecordAddress::derive(user, delegate, 0);
        match self.records.get_mut(&address) {
            Some(record) if record.is_active => {
                record.is_active = false;
                Ok(())
            }
            _ => Err(Error::NoActiveDelegation {
                user: user.fingerprint(),
            }),
        }
    }

    /// Number of records, active or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
