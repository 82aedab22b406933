//! The ledger: accounts, the closed operation set, and redemption.
//!
//! All state lives here: the delegation store, the nonce registry, and the
//! per-account balances. Every mutation enters through [`Ledger::apply`]
//! (direct calls) or [`Ledger::redeem`] (pre-signed envelopes), and both are
//! atomic: every check runs before the first balance or record moves, so a
//! denial leaves the ledger untouched.

use crate::audit;
use crate::crypto::PublicKey;
use crate::delegation::{Delegation, DelegationStore};
use crate::envelope::SignedEnvelope;
use crate::error::{Error, Result};
use crate::evaluator;
use crate::nonce::{NonceId, NonceRegistry, NonceValue};
use crate::SECONDS_PER_DAY;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Identifier of a token mint, 32 opaque bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(#[serde(with = "serde_bytes")] [u8; 32]);

impl TokenId {
    /// Wrap raw mint bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw 32 bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// What kind of funds an account entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// The native unit of account.
    Native,
    /// A specific token mint.
    Token(TokenId),
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            Asset::Token(id) => write!(f, "token:{}", id),
        }
    }
}

/// Per-account, per-asset balances.
///
/// Both mutators are checked: a credit that would overflow or a debit that
/// would underflow fails without touching the entry.
#[derive(Debug, Default, Clone)]
pub struct Accounts {
    balances: HashMap<(PublicKey, Asset), u64>,
}

impl Accounts {
    /// Create an empty account table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance, zero for accounts never touched.
    pub fn balance(&self, owner: &PublicKey, asset: &Asset) -> u64 {
        self.balances.get(&(*owner, *asset)).copied().unwrap_or(0)
    }

    /// Add `amount` to the account.
    pub fn credit(&mut self, owner: &PublicKey, asset: &Asset, amount: u64) -> Result<()> {
        let entry = self.balances.entry((*owner, *asset)).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or(Error::BalanceOverflow {
                balance: *entry,
                amount,
            })?;
        Ok(())
    }

    /// Remove `amount` from the account.
    pub fn debit(&mut self, owner: &PublicKey, asset: &Asset, amount: u64) -> Result<()> {
        let entry = self.balances.entry((*owner, *asset)).or_insert(0);
        *entry = entry
            .checked_sub(amount)
            .ok_or(Error::InsufficientFunds {
                balance: *entry,
                requested: amount,
            })?;
        Ok(())
    }

    /// Move `amount` between accounts. Validates both sides before either
    /// entry changes, so a failure leaves no partial movement.
    pub fn transfer(
        &mut self,
        from: &PublicKey,
        to: &PublicKey,
        asset: &Asset,
        amount: u64,
    ) -> Result<()> {
        let from_balance = self.balance(from, asset);
        if from_balance < amount {
            return Err(Error::InsufficientFunds {
                balance: from_balance,
                requested: amount,
            });
        }
        let to_balance = self.balance(to, asset);
        if to_balance.checked_add(amount).is_none() {
            return Err(Error::BalanceOverflow {
                balance: to_balance,
                amount,
            });
        }
        self.debit(from, asset, amount)?;
        self.credit(to, asset, amount)
    }
}

/// The closed set of ledger commands.
///
/// Exhaustive dispatch in [`Ledger::apply`]: adding a variant does not
/// compile until every consumer handles it.
///
/// Externally tagged on the wire: tagged representations buffer through
/// serde's Content type, which loses the binary/text distinction the key
/// encoding depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Admin-gated: create a delegation with an expiry measured in days.
    Grant {
        user: PublicKey,
        delegate: PublicKey,
        max_amount: u64,
        duration_days: u32,
    },
    /// User-gated: create a delegation over the caller's own funds.
    /// `None` means the delegation never expires.
    Setup {
        delegate: PublicKey,
        max_amount: u64,
        expiry_offset_secs: Option<i64>,
    },
    /// Delegate returns funds to the user. Weak authorization: only the
    /// caller's identity matters, never delegation state, because this
    /// increases the user's funds instead of depleting them.
    Deposit {
        user: PublicKey,
        asset: Asset,
        amount: u64,
    },
    /// Delegate-gated: move a bounded amount out of the user's account.
    Withdraw {
        user: PublicKey,
        asset: Asset,
        amount: u64,
        destination: PublicKey,
    },
    /// User- or admin-gated: deactivate the delegation.
    Revoke { user: PublicKey, delegate: PublicKey },
    /// Delegate-gated: drain the user's entire balance of one asset.
    /// Bypasses the per-call cap but not activity, expiry, or identity.
    SweepAll {
        user: PublicKey,
        asset: Asset,
        destination: PublicKey,
    },
}

impl Operation {
    /// Short name for logs and audit records.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Grant { .. } => "grant",
            Operation::Setup { .. } => "setup",
            Operation::Deposit { .. } => "deposit",
            Operation::Withdraw { .. } => "withdraw",
            Operation::Revoke { .. } => "revoke",
            Operation::SweepAll { .. } => "sweep_all",
        }
    }
}

/// What an accepted operation did, for callers and the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    DelegationGranted {
        user: PublicKey,
        delegate: PublicKey,
        max_amount: u64,
        expires_at: Option<DateTime<Utc>>,
    },
    DelegationRevoked {
        user: PublicKey,
        delegate: PublicKey,
    },
    FundsDeposited {
        user: PublicKey,
        delegate: PublicKey,
        asset: Asset,
        amount: u64,
    },
    FundsWithdrawn {
        user: PublicKey,
        asset: Asset,
        amount: u64,
        destination: PublicKey,
    },
    FundsSwept {
        user: PublicKey,
        asset: Asset,
        amount: u64,
        destination: PublicKey,
    },
    /// The envelope's nonce was consumed. Emitted on every redemption
    /// attempt that passes the freshness gate; the operation event follows
    /// only when the ledger gate allows.
    EnvelopeConsumed {
        envelope_id: String,
        nonce_id: NonceId,
    },
}

/// `now + offset_secs` as a timestamp, or `InvalidExpiry` when the sum
/// leaves the representable range.
fn checked_expiry(now: DateTime<Utc>, offset_secs: i64) -> Result<DateTime<Utc>> {
    Duration::try_seconds(offset_secs)
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or(Error::InvalidExpiry { offset_secs })
}

/// The authoritative ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    admin: PublicKey,
    store: DelegationStore,
    nonces: NonceRegistry,
    accounts: Accounts,
}

impl Ledger {
    /// Create a ledger with one fixed admin identity.
    pub fn new(admin: PublicKey) -> Self {
        Self {
            admin,
            store: DelegationStore::new(),
            nonces: NonceRegistry::new(),
            accounts: Accounts::new(),
        }
    }

    /// The admin identity.
    pub fn admin(&self) -> &PublicKey {
        &self.admin
    }

    /// Read-only view of the delegation store.
    pub fn delegations(&self) -> &DelegationStore {
        &self.store
    }

    /// Current balance of an account.
    pub fn balance(&self, owner: &PublicKey, asset: &Asset) -> u64 {
        self.accounts.balance(owner, asset)
    }

    /// Credit an account directly. Test and bootstrap hook; the operation
    /// path for funding is [`Operation::Deposit`].
    pub fn credit(&mut self, owner: &PublicKey, asset: &Asset, amount: u64) -> Result<()> {
        self.accounts.credit(owner, asset, amount)
    }

    /// Create a durable nonce token whose advance authority is `authority`.
    pub fn create_nonce(&mut self, authority: PublicKey) -> NonceId {
        let id = self.nonces.create(authority);
        debug!(nonce_id = %id, authority = %authority.fingerprint(), "nonce token created");
        id
    }

    /// The live value of a nonce token.
    pub fn nonce_value(&self, id: &str) -> Result<NonceValue> {
        self.nonces.value(id)
    }

    /// Apply an operation on behalf of `caller`, using the wall clock.
    pub fn apply(&mut self, caller: &PublicKey, operation: Operation) -> Result<LedgerEvent> {
        self.apply_at(caller, operation, Utc::now())
    }

    /// Apply an operation at an explicit instant.
    ///
    /// The clock is a parameter so expiry behavior is testable without
    /// sleeping. All authorization checks complete before any mutation.
    pub fn apply_at(
        &mut self,
        caller: &PublicKey,
        operation: Operation,
        now: DateTime<Utc>,
    ) -> Result<LedgerEvent> {
        let op_name = operation.name();
        let event = match operation {
            Operation::Grant {
                user,
                delegate,
                max_amount,
                duration_days,
            } => {
                if caller != &self.admin {
                    return Err(Error::Unauthorized(format!(
                        "grant requires the admin key, got {}",
                        caller.fingerprint()
                    )));
                }
                let offset_secs = i64::from(duration_days) * SECONDS_PER_DAY;
                let expires_at = Some(checked_expiry(now, offset_secs)?);
                self.store.create(Delegation {
                    user,
                    delegate,
                    max_amount,
                    expires_at,
                    is_active: true,
                    address_seed: 0,
                })?;
                LedgerEvent::DelegationGranted {
                    user,
                    delegate,
                    max_amount,
                    expires_at,
                }
            }

            Operation::Setup {
                delegate,
                max_amount,
                expiry_offset_secs,
            } => {
                // Self-service: the caller is the fund owner. A missing or
                // non-positive offset means the record never expires.
                let expires_at = match expiry_offset_secs.filter(|secs| *secs > 0) {
                    Some(secs) => Some(checked_expiry(now, secs)?),
                    None => None,
                };
                self.store.create(Delegation {
                    user: *caller,
                    delegate,
                    max_amount,
                    expires_at,
                    is_active: true,
                    address_seed: 0,
                })?;
                LedgerEvent::DelegationGranted {
                    user: *caller,
                    delegate,
                    max_amount,
                    expires_at,
                }
            }

            Operation::Deposit {
                user,
                asset,
                amount,
            } => {
                // No evaluator here: returning funds needs no live
                // delegation, only the caller's own balance.
                self.accounts.transfer(caller, &user, &asset, amount)?;
                LedgerEvent::FundsDeposited {
                    user,
                    delegate: *caller,
                    asset,
                    amount,
                }
            }

            Operation::Withdraw {
                user,
                asset,
                amount,
                destination,
            } => {
                let record = self.store.get(&user, caller);
                let balance = self.accounts.balance(&user, &asset);
                evaluator::evaluate(record, now, caller, amount, balance)?;

                self.accounts.transfer(&user, &destination, &asset, amount)?;
                LedgerEvent::FundsWithdrawn {
                    user,
                    asset,
                    amount,
                    destination,
                }
            }

            Operation::Revoke { user, delegate } => {
                if caller != &user && caller != &self.admin {
                    return Err(Error::Unauthorized(format!(
                        "revoke requires the user or admin key, got {}",
                        caller.fingerprint()
                    )));
                }
                self.store.revoke(&user, &delegate)?;
                LedgerEvent::DelegationRevoked { user, delegate }
            }

            Operation::SweepAll {
                user,
                asset,
                destination,
            } => {
                let record = self.store.get(&user, caller);
                evaluator::evaluate_sweep(record, now, caller)?;

                let amount = self.accounts.balance(&user, &asset);
                self.accounts.transfer(&user, &destination, &asset, amount)?;
                LedgerEvent::FundsSwept {
                    user,
                    asset,
                    amount,
                    destination,
                }
            }
        };

        info!(
            operation = op_name,
            caller = %caller.fingerprint(),
            event = ?event,
            "operation accepted"
        );
        audit::log_event(&event);
        Ok(event)
    }

    /// Redeem a fully signed envelope, using the wall clock.
    pub fn redeem(&mut self, envelope: &SignedEnvelope) -> Result<LedgerEvent> {
        self.redeem_at(envelope, Utc::now())
    }

    /// Redeem a fully signed envelope at an explicit instant.
    ///
    /// Two independent gates, in order:
    ///
    /// 1. **Freshness**: both signatures verify over the stored intent
    ///    bytes and the cited nonce value is the live one. Passing this
    ///    gate consumes the nonce, whatever happens next.
    /// 2. **Live state**: the embedded operation runs through the normal
    ///    [`Ledger::apply_at`] path with the delegate as caller. A denial
    ///    here leaves funds and records untouched, but the nonce stays
    ///    consumed: an envelope gets exactly one redemption attempt.
    pub fn redeem_at(
        &mut self,
        envelope: &SignedEnvelope,
        now: DateTime<Utc>,
    ) -> Result<LedgerEvent> {
        let intent = envelope.verify()?;

        // The delegate must hold advance authority over the cited token.
        self.nonces
            .consume(&intent.nonce_id, &intent.delegate, &intent.nonce_value)?;

        audit::log_event(&LedgerEvent::EnvelopeConsumed {
            envelope_id: intent.envelope_id.clone(),
            nonce_id: intent.nonce_id.clone(),
        });

        match self.apply_at(&intent.delegate, intent.operation.clone(), now) {
            Ok(event) => {
                info!(envelope_id = %intent.envelope_id, "envelope redeemed");
                Ok(event)
            }
            Err(err) => {
                // The nonce is already advanced: this envelope is spent
                // even though the transfer did not happen.
                warn!(
                    envelope_id = %intent.envelope_id,
                    error = %err,
                    "redemption denied after nonce consumption"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SigningKey;

    struct Fixture {
        admin: SigningKey,
        user: SigningKey,
        bot: SigningKey,
        ledger: Ledger,
    }

    fn fixture() -> Fixture {
        let admin = SigningKey::generate();
        let user = SigningKey::generate();
        let bot = SigningKey::generate();
        let ledger = Ledger::new(admin.public_key());
        Fixture {
            admin,
            user,
            bot,
            ledger,
        }
    }

    #[test]
    fn test_grant_requires_admin() {
        let mut f = fixture();
        let op = Operation::Grant {
            user: f.user.public_key(),
            delegate: f.bot.public_key(),
            max_amount: 100,
            duration_days: 1,
        };

        let err = f.ledger.apply(&f.user.public_key(), op.clone()).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        f.ledger.apply(&f.admin.public_key(), op).unwrap();
    }

    #[test]
    fn test_setup_is_self_service() {
        let mut f = fixture();
        let event = f
            .ledger
            .apply(
                &f.user.public_key(),
                Operation::Setup {
                    delegate: f.bot.public_key(),
                    max_amount: 100,
                    expiry_offset_secs: Some(3_600),
                },
            )
            .unwrap();
        assert!(matches!(
            event,
            LedgerEvent::DelegationGranted { expires_at: Some(_), .. }
        ));
    }

    #[test]
    fn test_setup_without_offset_never_expires() {
        let mut f = fixture();
        f.ledger
            .apply(
                &f.user.public_key(),
                Operation::Setup {
                    delegate: f.bot.public_key(),
                    max_amount: 100,
                    expiry_offset_secs: None,
                },
            )
            .unwrap();

        let record = f
            .ledger
            .delegations()
            .get(&f.user.public_key(), &f.bot.public_key())
            .unwrap();
        assert_eq!(record.expires_at, None);
    }

    #[test]
    fn test_setup_with_non_positive_offset_never_expires() {
        let mut f = fixture();
        for offset in [Some(0), Some(-3_600)] {
            let event = f
                .ledger
                .apply(
                    &f.user.public_key(),
                    Operation::Setup {
                        delegate: f.bot.public_key(),
                        max_amount: 100,
                        expiry_offset_secs: offset,
                    },
                )
                .unwrap();
            assert!(
                matches!(
                    event,
                    LedgerEvent::DelegationGranted { expires_at: None, .. }
                ),
                "offset {:?} must mean no expiry",
                offset
            );
            f.ledger
                .apply(
                    &f.user.public_key(),
                    Operation::Revoke {
                        user: f.user.public_key(),
                        delegate: f.bot.public_key(),
                    },
                )
                .unwrap();
        }
    }

    #[test]
    fn test_unrepresentable_expiry_is_an_error_not_a_panic() {
        let mut f = fixture();

        let err = f
            .ledger
            .apply(
                &f.admin.public_key(),
                Operation::Grant {
                    user: f.user.public_key(),
                    delegate: f.bot.public_key(),
                    max_amount: 100,
                    duration_days: u32::MAX,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidExpiry { .. }));
        assert!(
            f.ledger
                .delegations()
                .get(&f.user.public_key(), &f.bot.public_key())
                .is_none(),
            "failed grant must not leave a record behind"
        );

        let err = f
            .ledger
            .apply(
                &f.user.public_key(),
                Operation::Setup {
                    delegate: f.bot.public_key(),
                    max_amount: 100,
                    expiry_offset_secs: Some(i64::MAX),
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidExpiry { .. }));
    }

    #[test]
    fn test_deposit_returns_funds_without_delegation_checks() {
        let mut f = fixture();
        f.ledger
            .credit(&f.bot.public_key(), &Asset::Native, 1_234)
            .unwrap();

        // No delegation exists at all; the deposit still goes through.
        f.ledger
            .apply(
                &f.bot.public_key(),
                Operation::Deposit {
                    user: f.user.public_key(),
                    asset: Asset::Native,
                    amount: 1_234,
                },
            )
            .unwrap();
        assert_eq!(f.ledger.balance(&f.user.public_key(), &Asset::Native), 1_234);
        assert_eq!(f.ledger.balance(&f.bot.public_key(), &Asset::Native), 0);
    }

    #[test]
    fn test_withdraw_moves_funds_atomically() {
        let mut f = fixture();
        f.ledger
            .credit(&f.user.public_key(), &Asset::Native, 1_000)
            .unwrap();
        f.ledger
            .apply(
                &f.user.public_key(),
                Operation::Setup {
                    delegate: f.bot.public_key(),
                    max_amount: 500,
                    expiry_offset_secs: None,
                },
            )
            .unwrap();

        f.ledger
            .apply(
                &f.bot.public_key(),
                Operation::Withdraw {
                    user: f.user.public_key(),
                    asset: Asset::Native,
                    amount: 500,
                    destination: f.bot.public_key(),
                },
            )
            .unwrap();
        assert_eq!(f.ledger.balance(&f.user.public_key(), &Asset::Native), 500);
        assert_eq!(f.ledger.balance(&f.bot.public_key(), &Asset::Native), 500);
    }

    #[test]
    fn test_denied_withdraw_leaves_balances_untouched() {
        let mut f = fixture();
        f.ledger
            .credit(&f.user.public_key(), &Asset::Native, 1_000)
            .unwrap();
        f.ledger
            .apply(
                &f.user.public_key(),
                Operation::Setup {
                    delegate: f.bot.public_key(),
                    max_amount: 500,
                    expiry_offset_secs: None,
                },
            )
            .unwrap();

        let err = f
            .ledger
            .apply(
                &f.bot.public_key(),
                Operation::Withdraw {
                    user: f.user.public_key(),
                    asset: Asset::Native,
                    amount: 900,
                    destination: f.bot.public_key(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::ExceedsMaxAmount { .. }));
        assert_eq!(f.ledger.balance(&f.user.public_key(), &Asset::Native), 1_000);
        assert_eq!(f.ledger.balance(&f.bot.public_key(), &Asset::Native), 0);
    }

    #[test]
    fn test_revoke_by_user_and_by_admin() {
        let mut f = fixture();
        let stranger = SigningKey::generate();

        f.ledger
            .apply(
                &f.user.public_key(),
                Operation::Setup {
                    delegate: f.bot.public_key(),
                    max_amount: 100,
                    expiry_offset_secs: None,
                },
            )
            .unwrap();

        let revoke = Operation::Revoke {
            user: f.user.public_key(),
            delegate: f.bot.public_key(),
        };
        let err = f
            .ledger
            .apply(&stranger.public_key(), revoke.clone())
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        f.ledger.apply(&f.admin.public_key(), revoke).unwrap();
    }

    #[test]
    fn test_sweep_bypasses_cap() {
        let mut f = fixture();
        f.ledger
            .credit(&f.user.public_key(), &Asset::Native, 10_000)
            .unwrap();
        f.ledger
            .apply(
                &f.user.public_key(),
                Operation::Setup {
                    delegate: f.bot.public_key(),
                    max_amount: 1, // far below the balance
                    expiry_offset_secs: None,
                },
            )
            .unwrap();

        let event = f
            .ledger
            .apply(
                &f.bot.public_key(),
                Operation::SweepAll {
                    user: f.user.public_key(),
                    asset: Asset::Native,
                    destination: f.bot.public_key(),
                },
            )
            .unwrap();
        assert!(matches!(event, LedgerEvent::FundsSwept { amount: 10_000, .. }));
        assert_eq!(f.ledger.balance(&f.user.public_key(), &Asset::Native), 0);
    }

    #[test]
    fn test_expired_delegation_denied_at_apply_time() {
        let mut f = fixture();
        let now = Utc::now();
        f.ledger
            .credit(&f.user.public_key(), &Asset::Native, 1_000)
            .unwrap();
        f.ledger
            .apply_at(
                &f.admin.public_key(),
                Operation::Grant {
                    user: f.user.public_key(),
                    delegate: f.bot.public_key(),
                    max_amount: 500,
                    duration_days: 1,
                },
                now,
            )
            .unwrap();

        let withdraw = Operation::Withdraw {
            user: f.user.public_key(),
            asset: Asset::Native,
            amount: 100,
            destination: f.bot.public_key(),
        };

        // Usable at exactly the expiry instant.
        f.ledger
            .apply_at(
                &f.bot.public_key(),
                withdraw.clone(),
                now + Duration::days(1),
            )
            .unwrap();

        // One second past, denied.
        let err = f
            .ledger
            .apply_at(
                &f.bot.public_key(),
                withdraw,
                now + Duration::days(1) + Duration::seconds(1),
            )
            .unwrap_err();
        assert!(matches!(err, Error::DelegationExpired { .. }));
    }

    #[test]
    fn test_token_balances_are_independent() {
        let mut f = fixture();
        let mint = TokenId::from_bytes([7u8; 32]);
        f.ledger
            .credit(&f.user.public_key(), &Asset::Token(mint), 50)
            .unwrap();
        assert_eq!(f.ledger.balance(&f.user.public_key(), &Asset::Native), 0);
        assert_eq!(
            f.ledger.balance(&f.user.public_key(), &Asset::Token(mint)),
            50
        );
    }
}
