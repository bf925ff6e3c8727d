//! Recoverable secp256k1 signatures.
//!
//! Enclaves and the attestation authority sign 32-byte typed-data digests. Verifiers never
//! receive a public key: the signer's address is recovered from the signature itself and then
//! looked up in the registry.
//!
//! # Security
//!
//! - `recover_signer` never panics; every malformed signature (wrong length, bad recovery id,
//!   high-`s`, off-curve) yields `None` so callers can branch on "not verified".
//! - Private key material loaded from hex is zeroized after use.
//! - Never log or expose private keys.

use crate::domain::keccak256;
use crate::{AdlError, Address, Hash32, Result};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::scalar::IsHigh;
use rand::rngs::OsRng;
use tracing::{debug, instrument};
use zeroize::Zeroize;

/// Length of a `r || s || v` signature.
pub const SIGNATURE_LEN: usize = 65;

/// 65-byte `r || s || v` signature, `v` in `{27, 28}`.
pub type SignatureBytes = [u8; SIGNATURE_LEN];

/// 32-byte secp256k1 secret scalar.
pub type PrivateKeySeed = [u8; 32];

/// secp256k1 signing key held by an enclave or the attestation authority.
#[derive(Clone)]
pub struct EnclaveSigningKey {
    signing_key: SigningKey,
}

impl EnclaveSigningKey {
    /// Generate a new random key from the operating system CSPRNG.
    ///
    /// Suitable for ephemeral enclave keys and tests. Long-lived authority keys belong in
    /// secure storage.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Load a key from its 32-byte secret scalar.
    ///
    /// Fails if the scalar is zero or not below the curve order.
    pub fn from_seed(seed: &PrivateKeySeed) -> Result<Self> {
        let signing_key = SigningKey::from_slice(seed)
            .map_err(|e| AdlError::CryptoError(format!("Invalid secret key: {e}")))?;
        Ok(Self { signing_key })
    }

    /// Load a key from a hex-encoded secret scalar (optional `0x` prefix).
    pub fn from_hex(hex_seed: &str) -> Result<Self> {
        let trimmed = hex_seed.strip_prefix("0x").unwrap_or(hex_seed);
        let mut bytes = hex::decode(trimmed)
            .map_err(|e| AdlError::CryptoError(format!("Invalid hex: {e}")))?;

        if bytes.len() != 32 {
            bytes.zeroize();
            return Err(AdlError::CryptoError(
                "Secret key must be exactly 32 bytes".into(),
            ));
        }

        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes);
        bytes.zeroize();

        let key = Self::from_seed(&seed);
        seed.zeroize();
        key
    }

    /// Hex encoding of the secret scalar. Only for operator tooling that must hand the key
    /// to an enclave.
    pub fn to_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn address(&self) -> Address {
        address_of(self.signing_key.verifying_key())
    }

    /// Sign a 32-byte digest, returning `r || s || v` with `v = 27 + recovery_id`.
    #[instrument(skip(self, digest), fields(digest = %digest.short()))]
    pub fn sign_digest(&self, digest: &Hash32) -> Result<SignatureBytes> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest.0)
            .map_err(|e| AdlError::CryptoError(format!("Signing failed: {e}")))?;

        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = 27 + recovery_id.to_byte();
        debug!("Signed digest");
        Ok(out)
    }
}

/// Derive the address of a secp256k1 public key.
pub fn address_of(verifying_key: &VerifyingKey) -> Address {
    let point = verifying_key.to_encoded_point(false);
    // Uncompressed SEC1: 0x04 || X || Y.
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash.0[12..]);
    Address(out)
}

/// Recover the signer address of `digest` from a 65-byte signature.
///
/// Accepts `v` in `{27, 28}` or the raw recovery ids `{0, 1}`.
pub fn recover_signer(digest: &Hash32, signature: &[u8]) -> Option<Address> {
    if signature.len() != SIGNATURE_LEN {
        return None;
    }
    let recovery_byte = match signature[64] {
        v @ (27 | 28) => v - 27,
        v @ (0 | 1) => v,
        _ => return None,
    };
    let recovery_id = RecoveryId::from_byte(recovery_byte)?;
    let sig = Signature::from_slice(&signature[..64]).ok()?;

    // Reject the malleable twin of every valid signature.
    if bool::from(sig.s().is_high()) {
        return None;
    }

    let verifying_key = VerifyingKey::recover_from_prehash(&digest.0, &sig, recovery_id).ok()?;
    Some(address_of(&verifying_key))
}
