//! Domain separation and canonical hashing helpers.
//!
//! Every signature in the protocol is over a structured-data digest:
//! `keccak256(0x19 || 0x01 || domain_separator || struct_hash)`.
//!
//! The domain separator binds a signature to one protocol name, version, chain and contract
//! address, so a signature produced for one deployment never verifies against another.
//! Rebinding to a new contract address is a hard version boundary: every previously issued
//! signature stops verifying.

use crate::{Address, Hash32};
use sha3::{Digest, Keccak256};

/// Fixed protocol name bound into every domain separator.
pub const PROTOCOL_NAME: &str = "AttestedDecisionLedger";

/// Fixed protocol version bound into every domain separator.
pub const PROTOCOL_VERSION: &str = "1";

/// Structured-data domain type string.
pub const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Prefix for typed-data digests.
const TYPED_DATA_PREFIX: [u8; 2] = [0x19, 0x01];

/// Keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    Hash32(hasher.finalize().into())
}

/// Sub-hash of a variable-length string field.
///
/// Dynamic fields are hashed individually before being combined so that no two distinct
/// field splits can produce the same preimage.
pub fn hash_string(s: &str) -> Hash32 {
    keccak256(s.as_bytes())
}

/// Type hash of a structured-data type string.
pub fn type_hash(type_string: &str) -> Hash32 {
    keccak256(type_string.as_bytes())
}

/// Encoder for 32-byte big-endian ABI words.
#[derive(Clone, Debug, Default)]
pub struct WordEncoder {
    buf: Vec<u8>,
}

impl WordEncoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(32 * 16),
        }
    }

    pub fn hash(&mut self, h: &Hash32) -> &mut Self {
        self.buf.extend_from_slice(&h.0);
        self
    }

    pub fn address(&mut self, a: &Address) -> &mut Self {
        self.buf.extend_from_slice(&[0u8; 12]);
        self.buf.extend_from_slice(&a.0);
        self
    }

    pub fn uint(&mut self, v: u128) -> &mut Self {
        self.buf.extend_from_slice(&[0u8; 16]);
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        let h = hash_string(s);
        self.hash(&h)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn keccak(&self) -> Hash32 {
        keccak256(&self.buf)
    }
}

/// Compute a domain separator for an arbitrary protocol name and version.
pub fn compute_domain_separator(
    name: &str,
    version: &str,
    chain_id: u64,
    verifying_contract: &Address,
) -> Hash32 {
    WordEncoder::new()
        .hash(&type_hash(DOMAIN_TYPE))
        .string(name)
        .string(version)
        .uint(u128::from(chain_id))
        .address(verifying_contract)
        .keccak()
}

/// Per-deployment domain separator.
///
/// Computed once at construction. The only way to change it is [`DomainSeparator::rebind`],
/// which the governance shell calls when a contract moves to a new address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DomainSeparator {
    chain_id: u64,
    verifying_contract: Address,
    separator: Hash32,
}

impl DomainSeparator {
    pub fn new(chain_id: u64, verifying_contract: Address) -> Self {
        let separator = compute_domain_separator(
            PROTOCOL_NAME,
            PROTOCOL_VERSION,
            chain_id,
            &verifying_contract,
        );
        Self {
            chain_id,
            verifying_contract,
            separator,
        }
    }

    pub fn separator(&self) -> Hash32 {
        self.separator
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn verifying_contract(&self) -> Address {
        self.verifying_contract
    }

    /// Wrap a struct hash into the digest that is actually signed.
    pub fn typed_data_hash(&self, struct_hash: &Hash32) -> Hash32 {
        let mut hasher = Keccak256::new();
        hasher.update(TYPED_DATA_PREFIX);
        hasher.update(self.separator.0);
        hasher.update(struct_hash.0);
        Hash32(hasher.finalize().into())
    }

    /// Recompute for a new contract address on the same chain.
    pub(crate) fn rebind(&mut self, new_contract: Address) {
        *self = Self::new(self.chain_id, new_contract);
    }
}
