//! Error types for the delegation ledger.
//!
//! The authorization taxonomy is closed: every denial a caller can observe
//! maps to one of the codes below. Transport or environment failures are
//! never folded into authorization outcomes.

use thiserror::Error;

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Canonical error codes.
///
/// Code ranges:
/// - 1000-1099: wire / envelope errors
/// - 1100-1199: signature errors
/// - 1200-1299: delegation state errors
/// - 1300-1399: authorization errors
/// - 1400-1499: funds errors
/// - 1500-1599: nonce errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Wire / envelope errors (1000-1099)
    UnsupportedVersion = 1000,
    MalformedEnvelope = 1001,
    EnvelopeTooLarge = 1002,

    // Signature errors (1100-1199)
    SignatureInvalid = 1100,
    MissingSignature = 1101,

    // Delegation state errors (1200-1299)
    NoActiveDelegation = 1200,
    DelegationRevoked = 1201,
    DelegationExpired = 1202,
    DelegationExists = 1203,
    InvalidExpiry = 1204,

    // Authorization errors (1300-1399)
    Unauthorized = 1300,
    ExceedsMaxAmount = 1301,

    // Funds errors (1400-1499)
    InsufficientFunds = 1400,
    BalanceOverflow = 1401,

    // Nonce errors (1500-1599)
    NonceNotFound = 1500,
    StaleNonce = 1501,
    NonceAuthorityMismatch = 1502,
}

impl ErrorCode {
    /// The numeric code value.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Machine-readable name (kebab-case), stable across releases.
    pub fn name(self) -> &'static str {
        match self {
            Self::UnsupportedVersion => "unsupported-version",
            Self::MalformedEnvelope => "malformed-envelope",
            Self::EnvelopeTooLarge => "envelope-too-large",
            Self::SignatureInvalid => "signature-invalid",
            Self::MissingSignature => "missing-signature",
            Self::NoActiveDelegation => "no-active-delegation",
            Self::DelegationRevoked => "delegation-revoked",
            Self::DelegationExpired => "delegation-expired",
            Self::DelegationExists => "delegation-exists",
            Self::InvalidExpiry => "invalid-expiry",
            Self::Unauthorized => "unauthorized",
            Self::ExceedsMaxAmount => "exceeds-max-amount",
            Self::InsufficientFunds => "insufficient-funds",
            Self::BalanceOverflow => "balance-overflow",
            Self::NonceNotFound => "nonce-not-found",
            Self::StaleNonce => "stale-nonce",
            Self::NonceAuthorityMismatch => "nonce-authority-mismatch",
        }
    }

    /// Human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::UnsupportedVersion => "Envelope wire version not supported",
            Self::MalformedEnvelope => "Envelope could not be decoded",
            Self::EnvelopeTooLarge => "Envelope size exceeds limit",
            Self::SignatureInvalid => "Signature verification failed",
            Self::MissingSignature => "A required signature is missing",
            Self::NoActiveDelegation => "No active delegation for this user and delegate",
            Self::DelegationRevoked => "Delegation has been revoked",
            Self::DelegationExpired => "Delegation has expired",
            Self::DelegationExists => "An active delegation already occupies this address",
            Self::InvalidExpiry => "Expiry offset is outside the representable time range",
            Self::Unauthorized => "Caller is not authorized for this operation",
            Self::ExceedsMaxAmount => "Transfer amount exceeds the delegation cap",
            Self::InsufficientFunds => "Account balance is insufficient",
            Self::BalanceOverflow => "Credit would overflow the account balance",
            Self::NonceNotFound => "Nonce token does not exist",
            Self::StaleNonce => "Nonce value does not match the live token",
            Self::NonceAuthorityMismatch => "Caller does not hold nonce advance authority",
        }
    }
}

/// Errors returned by ledger, coordinator, and wire operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Wire / envelope
    // =========================================================================
    /// Envelope wire version is not supported.
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    /// Envelope bytes could not be decoded.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Envelope exceeds the wire size limit.
    #[error("envelope size {size} bytes exceeds maximum {max} bytes")]
    EnvelopeTooLarge { size: usize, max: usize },

    // =========================================================================
    // Signatures
    // =========================================================================
    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    /// A required signature slot is empty.
    #[error("missing signature: {0}")]
    MissingSignature(String),

    /// Cryptographic operation failed (bad key material, etc.).
    #[error("cryptographic error: {0}")]
    CryptoError(String),

    // =========================================================================
    // Delegation state
    // =========================================================================
    /// No delegation record exists for this (user, delegate) pair.
    #[error("no active delegation for user {user}")]
    NoActiveDelegation { user: String },

    /// The record exists but was explicitly revoked.
    #[error("delegation for user {user} has been revoked")]
    DelegationRevoked { user: String },

    /// The record exists but its expiry has passed.
    #[error("delegation expired at {expired_at}")]
    DelegationExpired {
        expired_at: chrono::DateTime<chrono::Utc>,
    },

    /// An active record already occupies the deterministic address.
    #[error("active delegation already exists at address {address}")]
    DelegationExists { address: String },

    /// The requested expiry cannot be represented as a timestamp.
    #[error("expiry offset of {offset_secs} seconds is out of range")]
    InvalidExpiry { offset_secs: i64 },

    // =========================================================================
    // Authorization
    // =========================================================================
    /// Caller identity does not satisfy the operation's capability.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Requested amount exceeds the delegation's per-call cap.
    #[error("amount {requested} exceeds delegation cap {max_amount}")]
    ExceedsMaxAmount { requested: u64, max_amount: u64 },

    // =========================================================================
    // Funds
    // =========================================================================
    /// Account does not hold the requested amount.
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: u64, requested: u64 },

    /// Credit would overflow a u64 balance.
    #[error("balance overflow crediting {amount} onto {balance}")]
    BalanceOverflow { balance: u64, amount: u64 },

    // =========================================================================
    // Nonce
    // =========================================================================
    /// No nonce token with this ID.
    #[error("nonce not found: {0}")]
    NonceNotFound(String),

    /// Envelope references a value the token no longer holds.
    #[error("stale nonce: {nonce_id} has advanced past the referenced value")]
    StaleNonce { nonce_id: String },

    /// Advance attempted by a key other than the token's authority.
    #[error("nonce authority mismatch for {nonce_id}")]
    NonceAuthorityMismatch { nonce_id: String },

    // =========================================================================
    // Serialization
    // =========================================================================
    /// CBOR serialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// CBOR deserialization failed.
    #[error("deserialization error: {0}")]
    DeserializationError(String),
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Error::DeserializationError(e.to_string())
    }
}

impl Error {
    /// Map this error to its canonical code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion(_) => ErrorCode::UnsupportedVersion,
            Self::MalformedEnvelope(_) => ErrorCode::MalformedEnvelope,
            Self::EnvelopeTooLarge { .. } => ErrorCode::EnvelopeTooLarge,
            Self::SignatureInvalid(_) => ErrorCode::SignatureInvalid,
            Self::MissingSignature(_) => ErrorCode::MissingSignature,
            Self::CryptoError(_) => ErrorCode::SignatureInvalid,
            Self::NoActiveDelegation { .. } => ErrorCode::NoActiveDelegation,
            Self::DelegationRevoked { .. } => ErrorCode::DelegationRevoked,
            Self::DelegationExpired { .. } => ErrorCode::DelegationExpired,
            Self::DelegationExists { .. } => ErrorCode::DelegationExists,
            Self::InvalidExpiry { .. } => ErrorCode::InvalidExpiry,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::ExceedsMaxAmount { .. } => ErrorCode::ExceedsMaxAmount,
            Self::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            Self::BalanceOverflow { .. } => ErrorCode::BalanceOverflow,
            Self::NonceNotFound(_) => ErrorCode::NonceNotFound,
            Self::StaleNonce { .. } => ErrorCode::StaleNonce,
            Self::NonceAuthorityMismatch { .. } => ErrorCode::NonceAuthorityMismatch,
            Self::SerializationError(_) | Self::DeserializationError(_) => {
                ErrorCode::MalformedEnvelope
            }
        }
    }

    /// Machine-readable error name (kebab-case).
    pub fn name(&self) -> &'static str {
        self.code().name()
    }

    /// Whether this error is an Evaluator denial (an authorization outcome)
    /// as opposed to a transport, wire, or nonce failure.
    pub fn is_denial(&self) -> bool {
        matches!(
            self.code().code() / 100,
            12 | 13 | 14 // delegation state, authorization, funds
        )
    }
}
