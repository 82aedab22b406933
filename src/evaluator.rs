//! The authorization evaluator.
//!
//! A single pure function decides every transfer: given the record (if
//! any), the clock, the caller, the requested amount, and the live balance,
//! return `Ok(())` or the first failing check's denial. No side effects, no
//! partial evaluation; every input combination has a defined outcome.
//!
//! Check order (short-circuiting):
//! 1. record exists            -> `NoActiveDelegation`
//! 2. record is active         -> `DelegationRevoked`
//! 3. now <= expires_at        -> `DelegationExpired` (boundary inclusive)
//! 4. caller == delegate       -> `Unauthorized`
//! 5. amount <= max_amount     -> `ExceedsMaxAmount`
//! 6. balance >= amount        -> `InsufficientFunds`

use crate::crypto::PublicKey;
use crate::delegation::Delegation;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};

/// Decide whether `caller` may move `requested` out of the record's user
/// account holding `balance`, at time `now`.
pub fn evaluate(
    record: Option<&Delegation>,
    now: DateTime<Utc>,
    caller: &PublicKey,
    requested: u64,
    balance: u64,
) -> Result<()> {
    let record = match record {
        Some(record) => record,
        None => {
            return Err(Error::NoActiveDelegation {
                user: caller.fingerprint(),
            })
        }
    };

    if !record.is_active {
        return Err(Error::DelegationRevoked {
            user: record.user.fingerprint(),
        });
    }

    if record.is_expired(now) {
        // is_expired is only true when an expiry is set
        let expired_at = record.expires_at.unwrap_or(now);
        return Err(Error::DelegationExpired { expired_at });
    }

    if caller != &record.delegate {
        return Err(Error::Unauthorized(format!(
            "caller {} is not the delegate {}",
            caller.fingerprint(),
            record.delegate.fingerprint()
        )));
    }

    if requested > record.max_amount {
        return Err(Error::ExceedsMaxAmount {
            requested,
            max_amount: record.max_amount,
        });
    }

    if balance < requested {
        return Err(Error::InsufficientFunds {
            balance,
            requested,
        });
    }

    Ok(())
}

/// The sweep variant of the evaluator: identical gates except the
/// `max_amount` check, which sweeps deliberately bypass. Gated only by
/// record existence/activity, expiry, and caller identity.
pub fn evaluate_sweep(
    record: Option<&Delegation>,
    now: DateTime<Utc>,
    caller: &PublicKey,
) -> Result<()> {
    let record = match record {
        Some(record) => record,
        None => {
            return Err(Error::NoActiveDelegation {
                user: caller.fingerprint(),
            })
        }
    };

    if !record.is_active {
        return Err(Error::DelegationRevoked {
            user: record.user.fingerprint(),
        });
    }

    if record.is_expired(now) {
        let expired_at = record.expires_at.unwrap_or(now);
        return Err(Error::DelegationExpired { expired_at });
    }

    if caller != &record.delegate {
        return Err(Error::Unauthorized(format!(
            "caller {} is not the delegate {}",
            caller.fingerprint(),
            record.delegate.fingerprint()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SigningKey;

    fn fixture() -> (Delegation, PublicKey, DateTime<Utc>) {
        let user = SigningKey::generate().public_key();
        let delegate = SigningKey::generate().public_key();
        let now = Utc::now();
        let record = Delegation {
            user,
            delegate,
            max_amount: 1_000,
            expires_at: Some(now + chrono::Duration::hours(1)),
            is_active: true,
            address_seed: 0,
        };
        (record, delegate, now)
    }

    #[test]
    fn test_allow_when_all_checks_pass() {
        let (record, delegate, now) = fixture();
        assert!(evaluate(Some(&record), now, &delegate, 500, 2_000).is_ok());
    }

    #[test]
    fn test_missing_record_denied_first() {
        let (_, delegate, now) = fixture();
        let err = evaluate(None, now, &delegate, 500, 2_000).unwrap_err();
        assert!(matches!(err, Error::NoActiveDelegation { .. }));
    }

    #[test]
    fn test_revoked_checked_before_expiry() {
        let (mut record, delegate, now) = fixture();
        record.is_active = false;
        record.expires_at = Some(now - chrono::Duration::hours(1)); // also expired

        let err = evaluate(Some(&record), now, &delegate, 500, 2_000).unwrap_err();
        assert!(matches!(err, Error::DelegationRevoked { .. }));
    }

    #[test]
    fn test_expiry_checked_before_caller() {
        let (mut record, _, now) = fixture();
        record.expires_at = Some(now - chrono::Duration::seconds(1));
        let stranger = SigningKey::generate().public_key();

        let err = evaluate(Some(&record), now, &stranger, 500, 2_000).unwrap_err();
        assert!(matches!(err, Error::DelegationExpired { .. }));
    }

    #[test]
    fn test_wrong_caller_denied() {
        let (record, _, now) = fixture();
        let stranger = SigningKey::generate().public_key();
        let err = evaluate(Some(&record), now, &stranger, 500, 2_000).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_cap_checked_before_balance() {
        let (record, delegate, now) = fixture();
        // Both over cap and over balance: cap wins.
        let err = evaluate(Some(&record), now, &delegate, 5_000, 10).unwrap_err();
        assert!(matches!(err, Error::ExceedsMaxAmount { .. }));
    }

    #[test]
    fn test_insufficient_funds_last() {
        let (record, delegate, now) = fixture();
        let err = evaluate(Some(&record), now, &delegate, 500, 100).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientFunds {
                balance: 100,
                requested: 500
            }
        ));
    }

    #[test]
    fn test_amount_at_cap_allowed() {
        let (record, delegate, now) = fixture();
        assert!(evaluate(Some(&record), now, &delegate, 1_000, 2_000).is_ok());
    }

    #[test]
    fn test_expiry_boundary_inclusive() {
        let (mut record, delegate, now) = fixture();
        record.expires_at = Some(now);

        assert!(evaluate(Some(&record), now, &delegate, 500, 2_000).is_ok());
        let err = evaluate(
            Some(&record),
            now + chrono::Duration::seconds(1),
            &delegate,
            500,
            2_000,
        )
        .unwrap_err();
        assert!(matches!(err, Error::DelegationExpired { .. }));
    }

    #[test]
    fn test_sweep_bypasses_cap_but_not_activity() {
        let (mut record, delegate, now) = fixture();

        // Fresh record: allowed regardless of any amount notion.
        assert!(evaluate_sweep(Some(&record), now, &delegate).is_ok());

        // Revoked record: denied even though sweeps ignore the cap.
        record.is_active = false;
        let err = evaluate_sweep(Some(&record), now, &delegate).unwrap_err();
        assert!(matches!(err, Error::DelegationRevoked { .. }));
    }
}
