//! Delegate-side relay queue for pre-signed envelopes.
//!
//! The user signs an intent now; the delegate executes it later. In
//! between, the presigned envelope sits in this queue, keyed by user, in
//! its wire form. One slot per user: a newer submission replaces the older
//! one, which matches the nonce semantics (the newer envelope would be the
//! only redeemable one anyway once the token advances).

use crate::crypto::SigningKey;
use crate::envelope::{EnvelopeId, PresignedEnvelope};
use crate::error::Result;
use crate::ledger::{Ledger, LedgerEvent};
use crate::PublicKey;
use std::collections::HashMap;
use tracing::info;

/// Holds presigned envelopes until the delegate is ready to redeem.
#[derive(Debug, Default)]
pub struct RelayQueue {
    pending: HashMap<PublicKey, PresignedEnvelope>,
}

impl RelayQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a base64-encoded presigned envelope.
    ///
    /// Decodes, checks the user's signature over the intent bytes, and
    /// stores it under the intent's user. Returns the envelope ID.
    pub fn submit(&mut self, encoded: &str) -> Result<EnvelopeId> {
        let envelope = PresignedEnvelope::decode_base64(encoded)?;
        let intent = envelope.intent()?;
        intent.user.verify(&envelope.intent_bytes, &envelope.user_signature)?;

        info!(
            envelope_id = %intent.envelope_id,
            user = %intent.user.fingerprint(),
            "presigned envelope queued"
        );
        self.pending.insert(intent.user, envelope);
        Ok(intent.envelope_id)
    }

    /// The pending envelope for a user, if any.
    pub fn stored(&self, user: &PublicKey) -> Option<&PresignedEnvelope> {
        self.pending.get(user)
    }

    /// Remove and return the pending envelope for a user.
    pub fn take(&mut self, user: &PublicKey) -> Option<PresignedEnvelope> {
        self.pending.remove(user)
    }

    /// Number of queued envelopes.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Countersign and redeem the pending envelope for `user`.
    ///
    /// The envelope leaves the queue whatever the outcome: redemption
    /// consumes its nonce, so a denied envelope can never succeed on retry.
    pub fn redeem_for(
        &mut self,
        ledger: &mut Ledger,
        user: &PublicKey,
        delegate: &SigningKey,
    ) -> Result<LedgerEvent> {
        let presigned = self.take(user).ok_or_else(|| {
            crate::error::Error::MissingSignature(format!(
                "no pending envelope for user {}",
                user.fingerprint()
            ))
        })?;
        let envelope = presigned.countersign(delegate)?;
        ledger.redeem(&envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Asset, Operation};
    use crate::{Error, TransferIntent};

    struct Setup {
        user: SigningKey,
        bot: SigningKey,
        ledger: Ledger,
    }

    fn setup() -> Setup {
        let admin = SigningKey::generate();
        let user = SigningKey::generate();
        let bot = SigningKey::generate();
        let mut ledger = Ledger::new(admin.public_key());
        ledger
            .credit(&user.public_key(), &Asset::Native, 1_000)
            .unwrap();
        ledger
            .apply(
                &user.public_key(),
                Operation::Setup {
                    delegate: bot.public_key(),
                    max_amount: 500,
                    expiry_offset_secs: None,
                },
            )
            .unwrap();
        Setup { user, bot, ledger }
    }

    fn presign(s: &mut Setup, amount: u64) -> String {
        let nonce_id = s.ledger.create_nonce(s.bot.public_key());
        TransferIntent::builder()
            .nonce(nonce_id.clone(), s.ledger.nonce_value(&nonce_id).unwrap())
            .parties(s.user.public_key(), s.bot.public_key())
            .operation(Operation::Withdraw {
                user: s.user.public_key(),
                asset: Asset::Native,
                amount,
                destination: s.bot.public_key(),
            })
            .sign(&s.user)
            .unwrap()
            .encode_base64()
            .unwrap()
    }

    #[test]
    fn test_submit_then_redeem() {
        let mut s = setup();
        let encoded = presign(&mut s, 300);

        let mut queue = RelayQueue::new();
        let id = queue.submit(&encoded).unwrap();
        assert!(id.starts_with(crate::ENVELOPE_ID_PREFIX));
        assert_eq!(queue.len(), 1);

        let event = queue
            .redeem_for(&mut s.ledger, &s.user.public_key(), &s.bot)
            .unwrap();
        assert!(matches!(event, LedgerEvent::FundsWithdrawn { amount: 300, .. }));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_newer_submission_replaces_older() {
        let mut s = setup();
        let first = presign(&mut s, 100);
        let second = presign(&mut s, 200);

        let mut queue = RelayQueue::new();
        queue.submit(&first).unwrap();
        queue.submit(&second).unwrap();
        assert_eq!(queue.len(), 1);

        let event = queue
            .redeem_for(&mut s.ledger, &s.user.public_key(), &s.bot)
            .unwrap();
        assert!(matches!(event, LedgerEvent::FundsWithdrawn { amount: 200, .. }));
    }

    #[test]
    fn test_redeem_without_pending_envelope() {
        let mut s = setup();
        let mut queue = RelayQueue::new();
        let err = queue
            .redeem_for(&mut s.ledger, &s.user.public_key(), &s.bot)
            .unwrap_err();
        assert!(matches!(err, Error::MissingSignature(_)));
    }

    #[test]
    fn test_denied_redemption_still_drains_the_slot() {
        let mut s = setup();
        // Over the cap: the evaluator will deny at redemption time.
        let encoded = presign(&mut s, 900);

        let mut queue = RelayQueue::new();
        queue.submit(&encoded).unwrap();
        let err = queue
            .redeem_for(&mut s.ledger, &s.user.public_key(), &s.bot)
            .unwrap_err();
        assert!(matches!(err, Error::ExceedsMaxAmount { .. }));
        assert!(queue.is_empty());
    }
}
