//! `adl demo` command implementation
//!
//! Deploys a registry/ledger pair in-process with throwaway keys, then walks through
//! allowlisting, registration, one decision write and a rejected replay.

use adl_core::deployment::Deployment;
use adl_core::domain::keccak256;
use adl_core::events::{FanoutEventSink, TracingEventSink};
use adl_core::journal::{verify_journal, FileEventJournal};
use adl_core::{
    ActionKind, AdlConfig, AdlError, Address, Clock, DecisionId, DecisionSubmission,
    EnclaveSigningKey, EventSink, Hash32, SystemClock,
};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Binding lifetime granted to the demo enclave key.
const DEMO_BINDING_SECS: u64 = 3600;

pub fn run(config: &AdlConfig, journal: Option<PathBuf>) -> Result<()> {
    let owner_key = EnclaveSigningKey::generate();
    let authority = EnclaveSigningKey::generate();
    let enclave = EnclaveSigningKey::generate();
    let owner = owner_key.address();

    let mut events = FanoutEventSink::new(vec![Arc::new(TracingEventSink) as Arc<dyn EventSink>]);
    if let Some(path) = &journal {
        let file = FileEventJournal::open(path)
            .with_context(|| format!("Failed to open journal: {}", path.display()))?;
        events = events.with_durable(Arc::new(file));
    }

    let mut demo_config = config.clone();
    demo_config.registry.owner = Some(owner);
    demo_config.registry.attestation_authority = Some(authority.address());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let deployment = Deployment::from_config(&demo_config, clock.clone(), Arc::new(events))?;

    println!("🚀 ADL demo deployment");
    println!("   owner:     {owner}");
    println!("   authority: {}", authority.address());
    println!("   enclave:   {}", enclave.address());
    println!();

    // 1. Governance allowlists the enclave build.
    let identity = keccak256(b"adl-demo-enclave-build");
    deployment
        .registry
        .set_allowed_code_identity(owner, identity, true)?;
    println!("✅ Allowlisted code identity {identity}");

    // 2. The attestation authority binds the enclave key to that build.
    let expiry = clock.now() + DEMO_BINDING_SECS;
    let registration = deployment
        .registry
        .registration_hash(&enclave.address(), &identity, expiry)?;
    let authority_sig = authority.sign_digest(&registration)?;
    deployment
        .registry
        .register_enclave(enclave.address(), identity, expiry, &authority_sig)?;
    println!("✅ Registered enclave key until {expiry}");

    // 3. The enclave signs a decision and the ledger accepts it.
    let submission = DecisionSubmission {
        id: DecisionId::try_from("D1")?,
        user: Address([0x01; 20]),
        action_kind: ActionKind::Rebalance.as_u8(),
        asset: Address([0x02; 20]),
        amount: 1_000,
        from_protocol: Address([0x03; 20]),
        to_protocol: Address([0x04; 20]),
        confidence_score: 9_000,
        reasons: "Target pool APY exceeds source by 180 bps".into(),
        data_sources: "pool-apy,tvl,oracle-price".into(),
        alternatives: "hold".into(),
        external_reference_hash: Hash32::ZERO,
        model_reference: "demo-allocator".into(),
        explanation_reference: "demo://explanations/D1".into(),
    };
    let digest = deployment.ledger.canonical_hash(&submission)?;
    let signature = enclave.sign_digest(&digest)?;
    deployment
        .ledger
        .log_decision(submission.clone(), &signature)?;
    println!("✅ Logged decision {} (digest {digest})", submission.id);

    let stored = deployment.ledger.get_decision(&submission.id)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&stored).context("Failed to encode decision")?
    );

    // 4. A replay of the same id is refused.
    match deployment.ledger.log_decision(submission, &signature) {
        Err(AdlError::DuplicateDecision(id)) => println!("✅ Replay of {id} rejected"),
        Err(e) => anyhow::bail!("Replay rejected for an unexpected reason: {e}"),
        Ok(_) => anyhow::bail!("Replay was accepted"),
    }

    println!();
    println!(
        "📊 {}",
        serde_json::to_string(&deployment.metrics.snapshot())
            .context("Failed to encode metrics")?
    );

    if let Some(path) = journal {
        let head = verify_journal(&path)?;
        println!(
            "📜 Journal {}: {} records, head {}",
            path.display(),
            head.records,
            head.last_record_hash
        );
    }
    Ok(())
}
