//! ADL core: attested decision ledger.
//!
//! Two cooperating components make AI decisions produced inside an attested enclave
//! verifiable by anyone:
//!
//! - [`registry::EnclaveRegistry`] tracks governance-approved code identities and the
//!   ephemeral enclave signing keys an attestation authority has bound to them.
//! - [`ledger::DecisionLedger`] canonicalizes each submitted decision into a domain-bound
//!   digest, asks the registry whether a currently valid enclave key signed it, and persists
//!   the decision exactly once.
//!
//! Both components execute serially: every state-changing call holds its component's write
//! lock for the whole check/verify/commit sequence, so a failed call leaves state untouched.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

pub mod clock;
pub mod config;
pub mod crypto;
pub mod decision;
pub mod deployment;
pub mod domain;
pub mod events;
pub mod governance;
pub mod journal;
pub mod ledger;
pub mod metrics;
pub mod registry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AdlConfig;
pub use crypto::{recover_signer, EnclaveSigningKey};
pub use decision::{ActionKind, Decision, DecisionId, DecisionSubmission};
pub use deployment::Deployment;
pub use domain::DomainSeparator;
pub use events::{Event, EventSink};
pub use ledger::DecisionLedger;
pub use registry::{DecisionVerifier, EnclaveBinding, EnclaveRegistry};

/// Unix timestamp in seconds, as observed by the host environment.
pub type Timestamp = u64;

/// 32-byte hash newtype used for digests, code identities and external references.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash32(pub [u8; 32]);

/// Hash of an audited enclave build.
pub type CodeIdentity = Hash32;

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse a 32-byte hash from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = decode_fixed_hex::<32>(s, "hash")?;
        Ok(Self(bytes))
    }

    /// First four bytes as hex, for log fields.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// 20-byte account address (last 20 bytes of Keccak-256 over an uncompressed secp256k1 key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse a 20-byte address from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = decode_fixed_hex::<20>(s, "address")?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn decode_fixed_hex<const N: usize>(s: &str, what: &str) -> Result<[u8; N]> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed)
        .map_err(|e| AdlError::InvalidInput(format!("invalid {what} hex: {e}")))?;
    if bytes.len() != N {
        return Err(AdlError::InvalidInput(format!(
            "{what} must be exactly {N} bytes, got {}",
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

// Both newtypes travel as `0x`-prefixed hex in JSON payloads and journals.
macro_rules! impl_hex_serde {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                $ty::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_hex_serde!(Hash32);
impl_hex_serde!(Address);

/// Coarse failure classes surfaced to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown or expired signer, untrusted attestation authority, unknown code identity.
    Authorization,
    /// Tampered payload. Only ever observed through a failed signature check.
    Integrity,
    /// Decision id reuse.
    Duplicate,
    /// Out-of-range enum or score, zero addresses, malformed input.
    Validation,
    /// Read of an unknown id.
    NotFound,
    /// Caller is not allowed to perform a governance action.
    Governance,
    /// Configuration, journal or lock failures.
    Internal,
}

/// Unified error type for ADL core operations.
#[derive(Debug, Error)]
pub enum AdlError {
    // Registration errors
    #[error("Registration not signed by the attestation authority (recovered {recovered:?})")]
    UntrustedAuthority { recovered: Option<Address> },

    #[error("Code identity {0} is not allowlisted")]
    UnknownCodeIdentity(CodeIdentity),

    #[error("Registration expiry {expiry} is not after current time {now}")]
    ExpiredRegistration { expiry: Timestamp, now: Timestamp },

    // Decision errors
    #[error("Decision signature is not from a registered, unexpired enclave key")]
    UnauthorizedSignature,

    #[error("Decision {0} already logged")]
    DuplicateDecision(decision::DecisionId),

    #[error("Decision {0} not found")]
    NotFound(decision::DecisionId),

    // Validation errors
    #[error("Zero address not allowed for {0}")]
    ZeroAddress(&'static str),

    #[error("Action kind {0} is out of range")]
    InvalidActionKind(u8),

    #[error("Confidence score {score} exceeds maximum {max}")]
    ConfidenceOutOfRange { score: u16, max: u16 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Governance errors
    #[error("Caller {caller} is not the owner")]
    NotOwner { caller: Address },

    #[error("No decision verifier configured")]
    VerifierNotSet,

    // Infrastructure errors
    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Journal error: {0}")]
    JournalError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

impl AdlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdlError::UntrustedAuthority { .. }
            | AdlError::UnknownCodeIdentity(_)
            | AdlError::ExpiredRegistration { .. }
            | AdlError::UnauthorizedSignature => ErrorKind::Authorization,
            AdlError::DuplicateDecision(_) => ErrorKind::Duplicate,
            AdlError::NotFound(_) => ErrorKind::NotFound,
            AdlError::ZeroAddress(_)
            | AdlError::InvalidActionKind(_)
            | AdlError::ConfidenceOutOfRange { .. }
            | AdlError::InvalidInput(_) => ErrorKind::Validation,
            AdlError::NotOwner { .. } | AdlError::VerifierNotSet => ErrorKind::Governance,
            AdlError::CryptoError(_)
            | AdlError::ConfigError(_)
            | AdlError::JournalError(_)
            | AdlError::ExecutionError(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, AdlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_hex_roundtrip_accepts_prefix() {
        let addr = Address([0xab; 20]);
        let parsed = Address::from_hex(&addr.to_hex()).expect("valid address");
        assert_eq!(parsed, addr);
        let bare = Address::from_hex(&hex::encode([0xab; 20])).expect("valid address");
        assert_eq!(bare, addr);
    }

    #[test]
    fn hash_from_hex_rejects_wrong_length() {
        let err = Hash32::from_hex(&"00".repeat(31)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn hash_serializes_as_prefixed_hex() {
        let json = serde_json::to_string(&Hash32([1u8; 32])).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "01".repeat(32)));
        let back: Hash32 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Hash32([1u8; 32]));
    }

    #[test]
    fn zero_address_detection() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]).is_zero());
    }
}
