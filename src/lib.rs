//! # Mandate
//!
//! Bounded, time-limited delegation of spending authority.
//!
//! A user grants a delegate (a bot or program authority) the right to move a
//! capped amount of funds out of the user's account until an expiry,
//! revocable at any time by an admin or the user. A second, independent
//! mechanism lets the user pre-sign a transfer before the delegate is ready
//! to execute it, bound to a durable single-use nonce instead of a
//! short-lived freshness token, so the signed intent can be redeemed at an
//! arbitrary later time, exactly once.
//!
//! ## Key Concepts
//!
//! - **Delegation**: the authoritative record of who may move how much of
//!   whose funds, until when. Content-addressed, at most one active record
//!   per (user, delegate) pair.
//! - **Evaluator**: a pure decision function consulted before any transfer.
//!   Expiry is never stored back; it is recomputed on every use.
//! - **Nonce Token**: a single-use, non-expiring freshness value. Consuming
//!   it invalidates every envelope built against its previous value.
//! - **Envelope**: an immutable, partially-signed transfer intent. The user
//!   signs now; the delegate countersigns and redeems later. Redemption
//!   passes two independent gates: nonce freshness and live ledger state.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mandate::{Asset, Ledger, Operation, SigningKey, TransferIntent};
//!
//! let admin = SigningKey::generate();
//! let user = SigningKey::generate();
//! let bot = SigningKey::generate();
//!
//! let mut ledger = Ledger::new(admin.public_key());
//!
//! // Admin grants the bot a bounded one-day allowance.
//! ledger.apply(&admin.public_key(), Operation::Grant {
//!     user: user.public_key(),
//!     delegate: bot.public_key(),
//!     max_amount: 1_000_000_000,
//!     duration_days: 1,
//! })?;
//!
//! // User pre-signs a sweep bound to a fresh durable nonce.
//! let nonce_id = ledger.create_nonce(bot.public_key());
//! let presigned = TransferIntent::builder()
//!     .nonce(nonce_id.clone(), ledger.nonce_value(&nonce_id)?)
//!     .parties(user.public_key(), bot.public_key())
//!     .operation(Operation::SweepAll {
//!         user: user.public_key(),
//!         asset: Asset::Native,
//!         destination: bot.public_key(),
//!     })
//!     .sign(&user)?;
//!
//! // Arbitrarily later: the bot completes and redeems it.
//! let envelope = presigned.countersign(&bot)?;
//! ledger.redeem(&envelope)?;
//! ```

pub mod audit;
pub mod crypto;
pub mod delegation;
pub mod envelope;
pub mod error;
pub mod evaluator;
pub mod ledger;
pub mod nonce;
pub mod relay;
pub mod wire;

// Re-exports for convenience
pub use crypto::{PublicKey, Signature, SigningKey};
pub use delegation::{Delegation, DelegationStore, RecordAddress};
pub use envelope::{
    EnvelopeId, IntentBuilder, PresignedEnvelope, SignedEnvelope, TransferIntent,
    ENVELOPE_ID_PREFIX,
};
pub use error::{Error, ErrorCode, Result};
pub use evaluator::evaluate;
pub use ledger::{Accounts, Asset, Ledger, LedgerEvent, Operation, TokenId};
pub use nonce::{NonceId, NonceRegistry, NonceToken, NonceValue, NONCE_ID_PREFIX};
pub use relay::RelayQueue;
pub use wire::MAX_ENVELOPE_SIZE;

/// Context string for Ed25519 signatures (prevents cross-protocol attacks).
///
/// All signatures are computed over: `SIGNATURE_CONTEXT || payload`
pub const SIGNATURE_CONTEXT: &[u8] = b"mandate-transfer-v1";

/// Current wire format version for transfer intents.
pub const WIRE_VERSION: u8 = 1;

/// Seconds per day, used to convert `duration_days` into an absolute expiry.
pub const SECONDS_PER_DAY: i64 = 86_400;
