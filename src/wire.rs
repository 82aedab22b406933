//! Wire encoding for envelopes.
//!
//! Envelopes cross a trust boundary (user device to delegate service), so
//! decoding is defensive: the size limit is enforced on the raw bytes
//! before any parsing, and the intent's wire version is checked before the
//! content is believed.
//!
//! Binary format is CBOR; the text transport is URL-safe unpadded base64,
//! safe to paste into URLs, JSON, and shell commands.

use crate::envelope::{PresignedEnvelope, SignedEnvelope};
use crate::error::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Maximum size of an encoded envelope in bytes.
pub const MAX_ENVELOPE_SIZE: usize = 8 * 1024;

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)?;
    if buf.len() > MAX_ENVELOPE_SIZE {
        return Err(Error::EnvelopeTooLarge {
            size: buf.len(),
            max: MAX_ENVELOPE_SIZE,
        });
    }
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    // Size gate first, before the parser sees a single byte.
    if bytes.len() > MAX_ENVELOPE_SIZE {
        return Err(Error::EnvelopeTooLarge {
            size: bytes.len(),
            max: MAX_ENVELOPE_SIZE,
        });
    }
    ciborium::de::from_reader(bytes).map_err(|e| Error::MalformedEnvelope(e.to_string()))
}

impl PresignedEnvelope {
    /// Encode to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        to_cbor(self)
    }

    /// Decode from CBOR bytes, enforcing the size limit and wire version.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let envelope: Self = from_cbor(bytes)?;
        // Decoding the intent enforces structure and version; signature
        // checks stay on the redemption path.
        envelope.intent()?;
        Ok(envelope)
    }

    /// Encode to URL-safe unpadded base64.
    pub fn encode_base64(&self) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.encode()?))
    }

    /// Decode from URL-safe unpadded base64.
    pub fn decode_base64(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| Error::MalformedEnvelope(format!("invalid base64: {}", e)))?;
        Self::decode(&bytes)
    }
}

impl SignedEnvelope {
    /// Encode to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        to_cbor(self)
    }

    /// Decode from CBOR bytes, enforcing the size limit and wire version.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let envelope: Self = from_cbor(bytes)?;
        envelope.intent()?;
        Ok(envelope)
    }

    /// Encode to URL-safe unpadded base64.
    pub fn encode_base64(&self) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.encode()?))
    }

    /// Decode from URL-safe unpadded base64.
    pub fn decode_base64(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| Error::MalformedEnvelope(format!("invalid base64: {}", e)))?;
        Self::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SigningKey;
    use crate::ledger::{Asset, Operation};
    use crate::nonce::NonceValue;
    use crate::TransferIntent;

    fn signed_envelope() -> SignedEnvelope {
        let user = SigningKey::generate();
        let bot = SigningKey::generate();
        TransferIntent::builder()
            .nonce("mnd_nnc_test".into(), NonceValue::random())
            .parties(user.public_key(), bot.public_key())
            .operation(Operation::Withdraw {
                user: user.public_key(),
                asset: Asset::Native,
                amount: 42,
                destination: bot.public_key(),
            })
            .sign(&user)
            .expect("sign")
            .countersign(&bot)
            .expect("countersign")
    }

    #[test]
    fn test_base64_roundtrip_preserves_signatures() {
        let envelope = signed_envelope();
        let encoded = envelope.encode_base64().unwrap();
        let decoded = SignedEnvelope::decode_base64(&encoded).unwrap();

        assert_eq!(decoded, envelope);
        decoded.verify().unwrap();
    }

    #[test]
    fn test_base64_is_url_safe() {
        let encoded = signed_envelope().encode_base64().unwrap();
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_oversized_input_rejected_before_parsing() {
        let garbage = vec![0u8; MAX_ENVELOPE_SIZE + 1];
        let err = SignedEnvelope::decode(&garbage).unwrap_err();
        assert!(matches!(err, Error::EnvelopeTooLarge { .. }));
    }

    #[test]
    fn test_truncated_input_rejected() {
        let envelope = signed_envelope();
        let bytes = envelope.encode().unwrap();
        let err = SignedEnvelope::decode(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let err = SignedEnvelope::decode_base64("not!!valid##base64").unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
    }
}
