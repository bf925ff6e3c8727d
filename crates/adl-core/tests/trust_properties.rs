//! Trust properties of the registry/ledger pair, exercised through real signatures.

use adl_core::decision::MAX_CONFIDENCE_SCORE;
use adl_core::deployment::Deployment;
use adl_core::domain::keccak256;
use adl_core::events::MemoryEventSink;
use adl_core::{
    ActionKind, AdlConfig, AdlError, Address, ManualClock, DecisionId, DecisionSubmission,
    EnclaveSigningKey, ErrorKind, Hash32, Timestamp,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

// =============================================================================
// Test Fixtures
// =============================================================================

const NOW: Timestamp = 1_700_000_000;
const OWNER: Address = Address([0x0a; 20]);

struct Harness {
    deployment: Deployment,
    clock: Arc<ManualClock>,
    authority: EnclaveSigningKey,
    enclave: EnclaveSigningKey,
    identity: Hash32,
}

fn harness_on(chain_id: u64, ledger_contract: Address) -> Harness {
    let authority = EnclaveSigningKey::from_seed(&[0x11; 32]).unwrap();
    let config = AdlConfig::builder()
        .chain_id(chain_id)
        .owner(OWNER)
        .attestation_authority(authority.address())
        .registry_contract(Address([0xaa; 20]))
        .ledger_contract(ledger_contract)
        .build()
        .unwrap();
    let clock = Arc::new(ManualClock::new(NOW));
    let deployment =
        Deployment::from_config(&config, clock.clone(), Arc::new(MemoryEventSink::new())).unwrap();
    Harness {
        deployment,
        clock,
        authority,
        enclave: EnclaveSigningKey::from_seed(&[0x22; 32]).unwrap(),
        identity: keccak256(b"audited-enclave-build"),
    }
}

fn harness() -> Harness {
    harness_on(31337, Address([0xbb; 20]))
}

impl Harness {
    fn allow_identity(&self) {
        self.deployment
            .registry
            .set_allowed_code_identity(OWNER, self.identity, true)
            .unwrap();
    }

    fn authority_signature(&self, key: Address, expiry: Timestamp) -> Vec<u8> {
        let digest = self
            .deployment
            .registry
            .registration_hash(&key, &self.identity, expiry)
            .unwrap();
        self.authority.sign_digest(&digest).unwrap().to_vec()
    }

    fn register(&self, expiry: Timestamp) {
        let sig = self.authority_signature(self.enclave.address(), expiry);
        self.deployment
            .registry
            .register_enclave(self.enclave.address(), self.identity, expiry, &sig)
            .unwrap();
    }

    fn sign(&self, key: &EnclaveSigningKey, submission: &DecisionSubmission) -> Vec<u8> {
        let digest = self.deployment.ledger.canonical_hash(submission).unwrap();
        key.sign_digest(&digest).unwrap().to_vec()
    }
}

fn submission(id: &str) -> DecisionSubmission {
    DecisionSubmission {
        id: DecisionId::try_from(id).unwrap(),
        user: Address([0x01; 20]),
        action_kind: ActionKind::Rebalance.as_u8(),
        asset: Address([0x02; 20]),
        amount: 1_000,
        from_protocol: Address([0x03; 20]),
        to_protocol: Address([0x04; 20]),
        confidence_score: 9_000,
        reasons: "higher risk-adjusted yield".into(),
        data_sources: "pool-apy,tvl".into(),
        alternatives: "hold".into(),
        external_reference_hash: Hash32([0x05; 32]),
        model_reference: "allocator-v3".into(),
        explanation_reference: "ipfs://bafy-explanation".into(),
    }
}

// =============================================================================
// Authenticity
// =============================================================================

#[test]
fn unregistered_key_cannot_log() {
    let h = harness();
    h.allow_identity();
    h.register(NOW + 3600);

    let rogue = EnclaveSigningKey::from_seed(&[0x33; 32]).unwrap();
    let s = submission("D1");
    let err = h
        .deployment
        .ledger
        .log_decision(s.clone(), &h.sign(&rogue, &s))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(!h.deployment.ledger.contains(&s.id));
}

#[test]
fn malformed_signature_is_rejected_not_errored() {
    let h = harness();
    h.allow_identity();
    h.register(NOW + 3600);

    let s = submission("D1");
    for sig in [vec![], vec![0u8; 64], vec![0u8; 65], vec![0xff; 66]] {
        let err = h.deployment.ledger.log_decision(s.clone(), &sig).unwrap_err();
        assert!(matches!(err, AdlError::UnauthorizedSignature));
    }
    assert_eq!(h.deployment.ledger.decision_count(), 0);
}

// =============================================================================
// Idempotent-once
// =============================================================================

#[test]
fn second_write_with_same_id_is_duplicate() {
    let h = harness();
    h.allow_identity();
    h.register(NOW + 3600);

    let first = submission("D1");
    h.deployment
        .ledger
        .log_decision(first.clone(), &h.sign(&h.enclave, &first))
        .unwrap();

    let mut second = submission("D1");
    second.amount = 7;
    second.reasons = "different".into();
    let err = h
        .deployment
        .ledger
        .log_decision(second.clone(), &h.sign(&h.enclave, &second))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);
    assert_eq!(h.deployment.ledger.get_decision(&first.id).unwrap().amount, 1_000);
}

#[test]
fn concurrent_submissions_of_one_id_succeed_exactly_once() {
    let h = Arc::new(harness());
    h.allow_identity();
    h.register(NOW + 3600);

    let handles: Vec<_> = (0..8u128)
        .map(|i| {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                let mut s = submission("RACE");
                s.amount = i;
                let sig = h.sign(&h.enclave, &s);
                h.deployment.ledger.log_decision(s, &sig)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, AdlError::DuplicateDecision(_))));
    assert_eq!(h.deployment.ledger.decision_count(), 1);
    assert_eq!(h.deployment.metrics.snapshot().decisions_logged, 1);
}

// =============================================================================
// Expiry enforcement
// =============================================================================

#[test]
fn expiry_has_no_grandfathering() {
    let h = harness();
    h.allow_identity();
    let expiry = NOW + 100;
    h.register(expiry);

    let early = submission("EARLY");
    h.clock.set(expiry - 1);
    h.deployment
        .ledger
        .log_decision(early.clone(), &h.sign(&h.enclave, &early))
        .unwrap();

    h.clock.set(expiry);
    let late = submission("LATE");
    let err = h
        .deployment
        .ledger
        .log_decision(late.clone(), &h.sign(&h.enclave, &late))
        .unwrap_err();
    assert!(matches!(err, AdlError::UnauthorizedSignature));
}

// =============================================================================
// Domain isolation
// =============================================================================

#[test]
fn signature_does_not_cross_deployments() {
    let a = harness_on(1, Address([0xbb; 20]));
    let b = harness_on(2, Address([0xbb; 20]));
    let c = harness_on(1, Address([0xcc; 20]));
    for h in [&a, &b, &c] {
        h.allow_identity();
        h.register(NOW + 3600);
    }

    let s = submission("D1");
    let sig_for_a = a.sign(&a.enclave, &s);
    for other in [&b, &c] {
        let err = other
            .deployment
            .ledger
            .log_decision(s.clone(), &sig_for_a)
            .unwrap_err();
        assert!(matches!(err, AdlError::UnauthorizedSignature));
    }
    a.deployment.ledger.log_decision(s, &sig_for_a).unwrap();
}

#[test]
fn registration_does_not_cross_chains() {
    let a = harness_on(1, Address([0xbb; 20]));
    let b = harness_on(2, Address([0xbb; 20]));
    a.allow_identity();
    b.allow_identity();

    let sig = a.authority_signature(a.enclave.address(), NOW + 3600);
    let err = b
        .deployment
        .registry
        .register_enclave(b.enclave.address(), b.identity, NOW + 3600, &sig)
        .unwrap_err();
    assert!(matches!(err, AdlError::UntrustedAuthority { .. }));
}

// =============================================================================
// Allowlist gating
// =============================================================================

#[test]
fn same_authority_signature_succeeds_once_identity_is_allowed() {
    let h = harness();
    let expiry = NOW + 3600;
    let sig = h.authority_signature(h.enclave.address(), expiry);
    let registry = &h.deployment.registry;

    let err = registry
        .register_enclave(h.enclave.address(), h.identity, expiry, &sig)
        .unwrap_err();
    assert!(matches!(err, AdlError::UnknownCodeIdentity(_)));
    assert!(registry.binding(&h.enclave.address()).is_none());

    h.allow_identity();
    registry
        .register_enclave(h.enclave.address(), h.identity, expiry, &sig)
        .unwrap();
    assert!(registry.is_enclave_valid(&h.enclave.address()));
}

#[test]
fn key_rotation_keeps_both_keys_valid() {
    let h = harness();
    h.allow_identity();
    h.register(NOW + 3600);

    let rotated = EnclaveSigningKey::from_seed(&[0x44; 32]).unwrap();
    let sig = h.authority_signature(rotated.address(), NOW + 7200);
    h.deployment
        .registry
        .register_enclave(rotated.address(), h.identity, NOW + 7200, &sig)
        .unwrap();

    let old = submission("OLD");
    let new = submission("NEW");
    h.deployment
        .ledger
        .log_decision(old.clone(), &h.sign(&h.enclave, &old))
        .unwrap();
    h.deployment
        .ledger
        .log_decision(new.clone(), &h.sign(&rotated, &new))
        .unwrap();
}

// =============================================================================
// Validation and governance
// =============================================================================

#[test]
fn validation_failures_leave_ledger_unchanged() {
    let h = harness();
    h.allow_identity();
    h.register(NOW + 3600);

    let mut bad_score = submission("S");
    bad_score.confidence_score = MAX_CONFIDENCE_SCORE + 1;
    let mut bad_kind = submission("K");
    bad_kind.action_kind = 200;
    let mut zero_user = submission("U");
    zero_user.user = Address::ZERO;

    for s in [bad_score, bad_kind, zero_user] {
        let sig = h.sign(&h.enclave, &s);
        let err = h.deployment.ledger.log_decision(s, &sig).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert_eq!(h.deployment.ledger.decision_count(), 0);
    assert!(h.deployment.ledger.get_decisions(0, 10).unwrap().is_empty());
}

#[test]
fn ledger_migration_voids_old_decision_signatures() {
    let h = harness();
    h.allow_identity();
    h.register(NOW + 3600);

    let s = submission("D1");
    let stale = h.sign(&h.enclave, &s);
    h.deployment
        .ledger
        .migrate_to(OWNER, Address([0xcd; 20]))
        .unwrap();

    assert!(matches!(
        h.deployment.ledger.log_decision(s.clone(), &stale),
        Err(AdlError::UnauthorizedSignature)
    ));
    let fresh = h.sign(&h.enclave, &s);
    h.deployment.ledger.log_decision(s, &fresh).unwrap();
}

// =============================================================================
// Tamper sensitivity
// =============================================================================

fn tamper(s: &mut DecisionSubmission, field: usize, salt: u8) {
    let bump = |a: &mut Address| a.0[19] ^= salt | 1;
    match field {
        0 => bump(&mut s.user),
        1 => s.action_kind = (s.action_kind + 1) % ActionKind::ALL.len() as u8,
        2 => bump(&mut s.asset),
        3 => s.amount = s.amount.wrapping_add(u128::from(salt) + 1),
        4 => bump(&mut s.from_protocol),
        5 => bump(&mut s.to_protocol),
        6 => s.confidence_score = (s.confidence_score + u16::from(salt) + 1) % (MAX_CONFIDENCE_SCORE + 1),
        7 => s.reasons.push(char::from(b'a' + salt % 26)),
        8 => s.data_sources.push(char::from(b'a' + salt % 26)),
        9 => s.alternatives.push(char::from(b'a' + salt % 26)),
        10 => s.external_reference_hash.0[0] ^= salt | 1,
        11 => s.model_reference.push(char::from(b'a' + salt % 26)),
        12 => s.explanation_reference.push(char::from(b'a' + salt % 26)),
        _ => s.id.0[31] ^= salt | 1,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn tampering_any_field_after_signing_is_rejected(field in 0usize..14, salt in any::<u8>()) {
        let h = harness();
        h.allow_identity();
        h.register(NOW + 3600);

        let signed = submission("TAMPER");
        let sig = h.sign(&h.enclave, &signed);
        let mut altered = signed.clone();
        tamper(&mut altered, field, salt);
        prop_assume!(altered != signed);

        let err = h.deployment.ledger.log_decision(altered.clone(), &sig).unwrap_err();
        prop_assert!(matches!(err, AdlError::UnauthorizedSignature));
        prop_assert!(!h.deployment.ledger.contains(&signed.id));
        prop_assert!(!h.deployment.ledger.contains(&altered.id));
        prop_assert_eq!(h.deployment.ledger.decision_count(), 0);
    }
}
