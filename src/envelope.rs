//! Pre-signed transfer envelopes.
//!
//! A [`TransferIntent`] names the parties, the operation, and the nonce
//! value it was built against. At signing time the intent is serialized to
//! CBOR exactly once and those bytes travel with the envelope; both
//! signatures cover the stored bytes, never a re-serialization, so the
//! signed content can never drift from the verified content.
//!
//! Signing is two-phase. The user produces a [`PresignedEnvelope`]; the
//! delegate countersigns it into a [`SignedEnvelope`], the only form the
//! ledger will redeem.

use crate::crypto::{PublicKey, Signature, SigningKey};
use crate::error::{Error, Result};
use crate::ledger::Operation;
use crate::nonce::{NonceId, NonceValue};
use crate::WIRE_VERSION;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Prefix for envelope identifiers.
pub const ENVELOPE_ID_PREFIX: &str = "mnd_env_";

/// Identifier of an envelope: `mnd_env_<uuid-v7>`.
pub type EnvelopeId = String;

/// The signed content of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    /// Wire format version, checked on verification.
    pub version: u8,
    /// Unique envelope identifier.
    pub envelope_id: EnvelopeId,
    /// Fund owner. Signs first.
    pub user: PublicKey,
    /// Authorized spender. Countersigns and redeems.
    pub delegate: PublicKey,
    /// The nonce token this intent is bound to.
    pub nonce_id: NonceId,
    /// The token value at build time. Redemption fails once it advances.
    pub nonce_value: NonceValue,
    /// The ledger operation to run at redemption.
    pub operation: Operation,
}

impl TransferIntent {
    /// Start building an intent.
    pub fn builder() -> IntentBuilder {
        IntentBuilder::default()
    }

    /// The canonical CBOR encoding both parties sign.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)?;
        Ok(buf)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let intent: TransferIntent = ciborium::de::from_reader(bytes)
            .map_err(|e| Error::MalformedEnvelope(e.to_string()))?;
        if intent.version != WIRE_VERSION {
            return Err(Error::UnsupportedVersion(intent.version));
        }
        Ok(intent)
    }
}

/// Builder for [`TransferIntent`]. Terminal method is [`IntentBuilder::sign`].
#[derive(Debug, Default)]
pub struct IntentBuilder {
    nonce: Option<(NonceId, NonceValue)>,
    parties: Option<(PublicKey, PublicKey)>,
    operation: Option<Operation>,
}

impl IntentBuilder {
    /// Bind the intent to a nonce token and its current value.
    pub fn nonce(mut self, nonce_id: NonceId, nonce_value: NonceValue) -> Self {
        self.nonce = Some((nonce_id, nonce_value));
        self
    }

    /// Set the fund owner and the spender.
    pub fn parties(mut self, user: PublicKey, delegate: PublicKey) -> Self {
        self.parties = Some((user, delegate));
        self
    }

    /// Set the operation to run at redemption.
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Serialize the intent and sign it with the user's key.
    ///
    /// The signer must be the intent's user; a delegate cannot forge the
    /// first signature.
    pub fn sign(self, signer: &SigningKey) -> Result<PresignedEnvelope> {
        let (nonce_id, nonce_value) = self
            .nonce
            .ok_or_else(|| Error::MalformedEnvelope("missing nonce binding".into()))?;
        let (user, delegate) = self
            .parties
            .ok_or_else(|| Error::MalformedEnvelope("missing parties".into()))?;
        let operation = self
            .operation
            .ok_or_else(|| Error::MalformedEnvelope("missing operation".into()))?;

        if signer.public_key() != user {
            return Err(Error::Unauthorized(format!(
                "intent must be signed by the user {}, got {}",
                user.fingerprint(),
                signer.public_key().fingerprint()
            )));
        }

        let intent = TransferIntent {
            version: WIRE_VERSION,
            envelope_id: format!("{}{}", ENVELOPE_ID_PREFIX, uuid::Uuid::now_v7()),
            user,
            delegate,
            nonce_id,
            nonce_value,
            operation,
        };

        let intent_bytes = intent.to_bytes()?;
        let user_signature = signer.sign(&intent_bytes);
        Ok(PresignedEnvelope {
            intent_bytes,
            user_signature,
        })
    }
}

/// An envelope carrying the user's signature only. Inert until the delegate
/// countersigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedEnvelope {
    /// Serialized [`TransferIntent`], the exact bytes the user signed.
    #[serde(with = "serde_bytes")]
    pub intent_bytes: Vec<u8>,
    /// User signature over `intent_bytes`.
    pub user_signature: Signature,
}

impl PresignedEnvelope {
    /// Decode the carried intent.
    pub fn intent(&self) -> Result<TransferIntent> {
        TransferIntent::from_bytes(&self.intent_bytes)
    }

    /// Countersign with the delegate's key, producing a redeemable envelope.
    ///
    /// Verifies the user signature first: a delegate never countersigns
    /// bytes the user did not sign.
    pub fn countersign(&self, signer: &SigningKey) -> Result<SignedEnvelope> {
        let intent = self.intent()?;
        intent.user.verify(&self.intent_bytes, &self.user_signature)?;

        if signer.public_key() != intent.delegate {
            return Err(Error::Unauthorized(format!(
                "countersignature requires the delegate {}, got {}",
                intent.delegate.fingerprint(),
                signer.public_key().fingerprint()
            )));
        }

        Ok(SignedEnvelope {
            intent_bytes: self.intent_bytes.clone(),
            user_signature: self.user_signature,
            delegate_signature: signer.sign(&self.intent_bytes),
        })
    }
}

/// A fully signed envelope, ready for redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Serialized [`TransferIntent`], the exact bytes both parties signed.
    #[serde(with = "serde_bytes")]
    pub intent_bytes: Vec<u8>,
    /// User signature over `intent_bytes`.
    pub user_signature: Signature,
    /// Delegate countersignature over the same bytes.
    pub delegate_signature: Signature,
}

impl SignedEnvelope {
    /// Decode the carried intent without checking signatures.
    pub fn intent(&self) -> Result<TransferIntent> {
        TransferIntent::from_bytes(&self.intent_bytes)
    }

    /// Verify both signatures and the wire version, returning the intent.
    pub fn verify(&self) -> Result<TransferIntent> {
        let intent = TransferIntent::from_bytes(&self.intent_bytes)?;
        intent
            .user
            .verify(&self.intent_bytes, &self.user_signature)
            .map_err(|e| Error::SignatureInvalid(format!("user signature: {}", e)))?;
        intent
            .delegate
            .verify(&self.intent_bytes, &self.delegate_signature)
            .map_err(|e| Error::SignatureInvalid(format!("delegate signature: {}", e)))?;
        Ok(intent)
    }

    /// SHA-256 over the intent bytes, a stable handle for logs and dedup.
    pub fn content_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(&self.intent_bytes);
        hasher.finalize().into()
    }
}
