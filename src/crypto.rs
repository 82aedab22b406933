//! Cryptographic identities for the ledger's principals.
//!
//! Every principal (user, delegate, admin) is an Ed25519 keypair. All
//! signatures include a context prefix ([`crate::SIGNATURE_CONTEXT`]) so a
//! signature produced for this protocol can never validate in another.

use crate::error::{Error, Result};
use crate::SIGNATURE_CONTEXT;
use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey as Ed25519SigningKey, Verifier, VerifyingKey,
};
use rand::rngs::OsRng;
use secrecy::{CloneableSecret, ExposeSecret, Secret, Zeroize};
use serde::{Deserialize, Serialize};

/// A signing key identifying a principal.
///
/// The private half is wrapped in `Secret` so it is zeroized on drop and
/// redacted from `Debug` output.
#[derive(Clone)]
pub struct SigningKey {
    inner: Secret<KeyWrapper>,
}

// ed25519-dalek 2.x zeroizes on drop; the wrapper only exists so secrecy
// can clone and redact the key.
struct KeyWrapper(Ed25519SigningKey);

impl Clone for KeyWrapper {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Zeroize for KeyWrapper {
    fn zeroize(&mut self) {}
}

impl CloneableSecret for KeyWrapper {}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key", &"***REDACTED***")
            .finish()
    }
}

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        Self {
            inner: Secret::new(KeyWrapper(Ed25519SigningKey::generate(&mut OsRng))),
        }
    }

    /// Restore a signing key from its 32 secret bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            inner: Secret::new(KeyWrapper(Ed25519SigningKey::from_bytes(bytes))),
        }
    }

    /// The secret key bytes. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.inner.expose_secret().0.to_bytes()
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.inner.expose_secret().0.verifying_key(),
        }
    }

    /// Sign a message under the protocol context.
    ///
    /// The signed data is `SIGNATURE_CONTEXT || message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let prefixed = prefix_message(message);
        Signature {
            inner: self.inner.expose_secret().0.sign(&prefixed),
        }
    }
}

fn prefix_message(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SIGNATURE_CONTEXT.len() + message.len());
    out.extend_from_slice(SIGNATURE_CONTEXT);
    out.extend_from_slice(message);
    out
}

/// A principal's public identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PublicKey {
    /// Parse a public key from its 32 bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let key = VerifyingKey::from_bytes(bytes)
            .map_err(|e| Error::CryptoError(e.to_string()))?;
        Ok(Self { key })
    }

    /// The raw 32 bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    /// Short hex fingerprint (first 8 bytes), for logs and events.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.to_bytes()[..8])
    }

    /// Verify a context-prefixed signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let prefixed = prefix_message(message);
        self.key
            .verify(&prefixed, &signature.inner)
            .map_err(|e| Error::SignatureInvalid(e.to_string()))
    }
}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let bytes = self.to_bytes();
        if serializer.is_human_readable() {
            serializer.serialize_str(&base64::Engine::encode(
                &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                bytes,
            ))
        } else {
            serializer.serialize_bytes(&bytes)
        }
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, &s)
                .map_err(serde::de::Error::custom)?
        } else {
            serde_bytes::ByteBuf::deserialize(deserializer)?.into_vec()
        };
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid public key length"))?;
        PublicKey::from_bytes(&arr).map_err(serde::de::Error::custom)
    }
}

/// An Ed25519 signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    inner: DalekSignature,
}

impl Signature {
    /// Parse a signature from its 64 bytes.
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self {
            inner: DalekSignature::from_bytes(bytes),
        }
    }

    /// The raw 64 bytes.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let bytes = self.to_bytes();
        if serializer.is_human_readable() {
            serializer.serialize_str(&base64::Engine::encode(
                &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                bytes,
            ))
        } else {
            serializer.serialize_bytes(&bytes)
        }
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, &s)
                .map_err(serde::de::Error::custom)?
        } else {
            serde_bytes::ByteBuf::deserialize(deserializer)?.into_vec()
        };
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid signature length"))?;
        Ok(Signature::from_bytes(&arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = SigningKey::generate();
        let sig = key.sign(b"move 500 units");
        assert!(key.public_key().verify(b"move 500 units", &sig).is_ok());
    }

    #[test]
    fn test_verify_wrong_message_fails() {
        let key = SigningKey::generate();
        let sig = key.sign(b"move 500 units");
        assert!(key.public_key().verify(b"move 501 units", &sig).is_err());
    }

    #[test]
    fn test_verify_wrong_key_fails() {
        let key = SigningKey::generate();
        let other = SigningKey::generate();
        let sig = key.sign(b"payload");
        assert!(other.public_key().verify(b"payload", &sig).is_err());
    }

    #[test]
    fn test_context_prefix_prevents_cross_protocol() {
        let key = SigningKey::generate();
        let message = b"payload";

        // A raw signature without the context prefix must not verify.
        let raw = key.inner.expose_secret().0.sign(message);
        let unprefixed = Signature { inner: raw };
        assert!(key.public_key().verify(message, &unprefixed).is_err());
    }

    #[test]
    fn test_key_roundtrip_from_bytes() {
        let key = SigningKey::generate();
        let restored = SigningKey::from_bytes(&key.secret_key_bytes());
        assert_eq!(
            key.public_key().to_bytes(),
            restored.public_key().to_bytes()
        );
    }

    #[test]
    fn test_public_key_cbor_roundtrip() {
        let pk = SigningKey::generate().public_key();
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&pk, &mut buf).unwrap();
        let back: PublicKey = ciborium::de::from_reader(buf.as_slice()).unwrap();
        assert_eq!(pk, back);
    }
}
