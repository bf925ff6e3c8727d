//! Decision model and canonicalization.
//!
//! The enclave signs the canonical digest of a decision, never the raw struct. The struct
//! hash feeds a type tag, every fixed-width field, and an individual Keccak sub-hash of each
//! variable-length text field into one hashing pass. Changing any field, including free-text
//! metadata, therefore changes the digest and invalidates the signature.

use crate::domain::{type_hash, WordEncoder};
use crate::{AdlError, Address, Hash32, Result, Timestamp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Upper bound of the fixed-point confidence scale (basis points).
pub const MAX_CONFIDENCE_SCORE: u16 = 10_000;

/// Structured-data type string of a decision.
pub const DECISION_TYPE: &str = "Decision(bytes32 id,address user,uint8 actionKind,address asset,\
uint256 amount,address fromProtocol,address toProtocol,uint256 confidenceScore,string reasons,\
string dataSources,string alternatives,bytes32 externalReferenceHash,string modelReference,\
string explanationReference)";

/// Globally unique 32-byte decision identifier.
///
/// Short labels convert like a `bytes32` string literal: UTF-8 bytes, right-padded with zeros.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DecisionId(pub [u8; 32]);

impl DecisionId {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// The label this id was built from, if it is printable UTF-8 followed by zero padding.
    pub fn label(&self) -> Option<&str> {
        let end = self.0.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        if end == 0 || self.0[..end].contains(&0) {
            return None;
        }
        let s = std::str::from_utf8(&self.0[..end]).ok()?;
        if s.chars().all(|c| !c.is_control()) && !s.starts_with("0x") {
            Some(s)
        } else {
            None
        }
    }
}

impl TryFrom<&str> for DecisionId {
    type Error = AdlError;

    fn try_from(label: &str) -> Result<Self> {
        let bytes = label.as_bytes();
        if bytes.is_empty() {
            return Err(AdlError::InvalidInput("decision id is empty".into()));
        }
        if bytes.len() > 32 {
            return Err(AdlError::InvalidInput(format!(
                "decision id label exceeds 32 bytes ({} bytes)",
                bytes.len()
            )));
        }
        let mut out = [0u8; 32];
        out[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(out))
    }
}

impl FromStr for DecisionId {
    type Err = AdlError;

    /// Accepts a full `0x`-prefixed 32-byte hex id or a short label.
    fn from_str(s: &str) -> Result<Self> {
        if s.len() == 66 && s.starts_with("0x") {
            return Hash32::from_hex(s).map(|h| Self(h.0));
        }
        Self::try_from(s)
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => f.write_str(label),
            None => f.write_str(&self.to_hex()),
        }
    }
}

impl fmt::Debug for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecisionId({self})")
    }
}

impl Serialize for DecisionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DecisionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Amounts travel as decimal strings so values above `u64::MAX` survive JSON tooling.
pub mod amount_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Kind of portfolio action an AI decision proposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ActionKind {
    Rebalance = 0,
    Deposit = 1,
    Withdraw = 2,
    Swap = 3,
    Hold = 4,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Rebalance,
        ActionKind::Deposit,
        ActionKind::Withdraw,
        ActionKind::Swap,
        ActionKind::Hold,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(AdlError::InvalidActionKind(value))
    }
}

/// Caller-supplied decision payload, exactly as the enclave signed it.
///
/// `action_kind` stays a raw `u8` here because range validation is part of the ledger's
/// write path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionSubmission {
    pub id: DecisionId,
    pub user: Address,
    pub action_kind: u8,
    pub asset: Address,
    #[serde(with = "amount_string")]
    pub amount: u128,
    pub from_protocol: Address,
    pub to_protocol: Address,
    pub confidence_score: u16,
    pub reasons: String,
    pub data_sources: String,
    pub alternatives: String,
    pub external_reference_hash: Hash32,
    pub model_reference: String,
    pub explanation_reference: String,
}

/// Persisted decision. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    /// Ledger time at which the decision was logged.
    pub timestamp: Timestamp,
    pub action_kind: ActionKind,
    pub user: Address,
    pub asset: Address,
    #[serde(with = "amount_string")]
    pub amount: u128,
    pub from_protocol: Address,
    pub to_protocol: Address,
    pub confidence_score: u16,
    pub reasons: String,
    pub data_sources: String,
    pub alternatives: String,
    pub external_reference_hash: Hash32,
    pub model_reference: String,
    pub explanation_reference: String,
}

impl Decision {
    pub(crate) fn from_submission(
        submission: DecisionSubmission,
        action_kind: ActionKind,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: submission.id,
            timestamp,
            action_kind,
            user: submission.user,
            asset: submission.asset,
            amount: submission.amount,
            from_protocol: submission.from_protocol,
            to_protocol: submission.to_protocol,
            confidence_score: submission.confidence_score,
            reasons: submission.reasons,
            data_sources: submission.data_sources,
            alternatives: submission.alternatives,
            external_reference_hash: submission.external_reference_hash,
            model_reference: submission.model_reference,
            explanation_reference: submission.explanation_reference,
        }
    }
}

/// Struct hash of a decision submission (before domain wrapping).
///
/// Field order follows [`DECISION_TYPE`].
pub fn decision_struct_hash(s: &DecisionSubmission) -> Hash32 {
    WordEncoder::new()
        .hash(&type_hash(DECISION_TYPE))
        .hash(&Hash32(s.id.0))
        .address(&s.user)
        .uint(u128::from(s.action_kind))
        .address(&s.asset)
        .uint(s.amount)
        .address(&s.from_protocol)
        .address(&s.to_protocol)
        .uint(u128::from(s.confidence_score))
        .string(&s.reasons)
        .string(&s.data_sources)
        .string(&s.alternatives)
        .hash(&s.external_reference_hash)
        .string(&s.model_reference)
        .string(&s.explanation_reference)
        .keccak()
}
