//! `adl sign-registration` and `adl sign-decision` command implementations
//!
//! Both commands compute the same domain-bound digest the on-ledger components recompute, so
//! their output can be submitted as-is.

use adl_core::decision::decision_struct_hash;
use adl_core::registry::registration_struct_hash;
use adl_core::{AdlConfig, DecisionSubmission, DomainSeparator, EnclaveSigningKey, Hash32};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

use super::{parse_address, resolve_contract};

pub struct RegistrationArgs {
    pub authority_key: String,
    pub signing_key_address: String,
    pub code_identity: String,
    pub expiry: u64,
    pub chain_id: Option<u64>,
    pub registry: Option<String>,
}

#[derive(Serialize)]
struct SignedDigest {
    digest: Hash32,
    signer: String,
    signature: String,
}

impl SignedDigest {
    fn new(key: &EnclaveSigningKey, digest: Hash32) -> Result<Self> {
        let signature = key.sign_digest(&digest)?;
        Ok(Self {
            digest,
            signer: key.address().to_hex(),
            signature: format!("0x{}", hex::encode(signature)),
        })
    }
}

pub fn registration(config: &AdlConfig, args: RegistrationArgs) -> Result<()> {
    print_json(&sign_registration(config, args)?)
}

fn sign_registration(config: &AdlConfig, args: RegistrationArgs) -> Result<SignedDigest> {
    let authority =
        EnclaveSigningKey::from_hex(&args.authority_key).context("Invalid authority key")?;
    let signing_key = parse_address(&args.signing_key_address, "signing key")?;
    let code_identity = Hash32::from_hex(&args.code_identity).context("Invalid code identity")?;
    let registry =
        resolve_contract(args.registry, config.effective_registry_contract(), "registry")?;
    let chain_id = args.chain_id.unwrap_or(config.domain.chain_id);

    if let Some(expected) = config.registry.attestation_authority {
        if expected != authority.address() {
            tracing::warn!(
                configured = %expected,
                signer = %authority.address(),
                "Signing key is not the configured attestation authority"
            );
        }
    }

    let domain = DomainSeparator::new(chain_id, registry);
    let digest = domain.typed_data_hash(&registration_struct_hash(
        &signing_key,
        &code_identity,
        args.expiry,
    ));
    SignedDigest::new(&authority, digest)
}

pub fn decision(
    config: &AdlConfig,
    enclave_key: String,
    decision_path: PathBuf,
    chain_id: Option<u64>,
    ledger: Option<String>,
) -> Result<()> {
    let json = fs::read_to_string(&decision_path)
        .with_context(|| format!("Failed to read decision file: {}", decision_path.display()))?;
    let submission: DecisionSubmission =
        serde_json::from_str(&json).context("Failed to parse decision JSON")?;
    print_json(&sign_decision(config, &enclave_key, &submission, chain_id, ledger)?)
}

fn sign_decision(
    config: &AdlConfig,
    enclave_key: &str,
    submission: &DecisionSubmission,
    chain_id: Option<u64>,
    ledger: Option<String>,
) -> Result<SignedDigest> {
    let enclave = EnclaveSigningKey::from_hex(enclave_key).context("Invalid enclave key")?;
    let ledger = resolve_contract(ledger, config.effective_ledger_contract(), "ledger")?;
    let chain_id = chain_id.unwrap_or(config.domain.chain_id);

    let domain = DomainSeparator::new(chain_id, ledger);
    let digest = domain.typed_data_hash(&decision_struct_hash(submission));
    SignedDigest::new(&enclave, digest)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode output")?
    );
    Ok(())
}
