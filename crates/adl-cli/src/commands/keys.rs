//! `adl keygen` and `adl recover` command implementations

use adl_core::{recover_signer, EnclaveSigningKey, Hash32};
use anyhow::{Context, Result};

pub fn keygen(seed_hex: Option<String>) -> Result<()> {
    let key = match seed_hex {
        Some(seed) => EnclaveSigningKey::from_hex(&seed).context("Invalid seed")?,
        None => EnclaveSigningKey::generate(),
    };

    println!("🔑 secp256k1 key");
    println!("   secret:  {}", key.to_hex());
    println!("   address: {}", key.address());
    Ok(())
}

pub fn recover(digest: String, signature: String) -> Result<()> {
    let digest = Hash32::from_hex(&digest).context("Invalid digest")?;
    let signature = hex::decode(signature.trim_start_matches("0x"))
        .context("Signature is not valid hex")?;

    match recover_signer(&digest, &signature) {
        Some(signer) => {
            println!("{signer}");
            Ok(())
        }
        None => anyhow::bail!("Signature is malformed or does not recover to a key"),
    }
}
