#![no_main]

use adl_core::domain::keccak256;
use adl_core::events::MemoryEventSink;
use adl_core::{
    ActionKind, AdlError, Address, Clock, DecisionId, DecisionLedger, DecisionSubmission,
    EnclaveRegistry, EnclaveSigningKey, Hash32, ManualClock,
};
use libfuzzer_sys::fuzz_target;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const OWNER: Address = Address([0x0a; 20]);
const START: u64 = 1_000_000;
const KEYS: usize = 4;
const IDENTITIES: usize = 3;

#[derive(Clone, Copy, Debug)]
enum Op {
    Allow { identity: usize, allowed: bool },
    Register { key: usize, identity: usize, expiry_delta: i64, trusted: bool },
    Revoke { key: usize },
    Advance { secs: u64 },
    Log { id: u8, key: usize, tamper: bool },
}

fn parse_ops(input: &[u8]) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut i = 0usize;

    // Bounded length keeps each run cheap; every op costs at most one signature.
    while i + 2 < input.len() && ops.len() < 128 {
        let (tag, a, b) = (input[i], input[i + 1], input[i + 2]);
        let op = match tag % 5 {
            0 => Op::Allow {
                identity: a as usize % IDENTITIES,
                allowed: b & 1 == 0,
            },
            1 => Op::Register {
                key: a as usize % KEYS,
                identity: (a as usize >> 2) % IDENTITIES,
                expiry_delta: i64::from(b as i8),
                trusted: tag & 0x80 == 0,
            },
            2 => Op::Revoke {
                key: a as usize % KEYS,
            },
            3 => Op::Advance { secs: u64::from(a) },
            _ => Op::Log {
                id: a % 32,
                key: b as usize % KEYS,
                tamper: tag & 0x80 != 0,
            },
        };
        ops.push(op);
        i += 3;
    }
    ops
}

fn submission(id: u8, key: usize) -> DecisionSubmission {
    DecisionSubmission {
        id: DecisionId([id; 32]),
        user: Address([0x01; 20]),
        action_kind: ActionKind::ALL[key % ActionKind::ALL.len()].as_u8(),
        asset: Address([0x02; 20]),
        amount: u128::from(id) * 1_000,
        from_protocol: Address([0x03; 20]),
        to_protocol: Address([0x04; 20]),
        confidence_score: 5_000,
        reasons: "fuzz".into(),
        data_sources: String::new(),
        alternatives: String::new(),
        external_reference_hash: Hash32::ZERO,
        model_reference: String::new(),
        explanation_reference: String::new(),
    }
}

fuzz_target!(|data: &[u8]| {
    let ops = parse_ops(data);

    let clock = Arc::new(ManualClock::new(START));
    let authority = EnclaveSigningKey::from_seed(&[0xa0; 32]).expect("authority key");
    let impostor = EnclaveSigningKey::from_seed(&[0xb0; 32]).expect("impostor key");
    let keys: Vec<EnclaveSigningKey> = (0..KEYS)
        .map(|i| EnclaveSigningKey::from_seed(&[i as u8 + 1; 32]).expect("enclave key"))
        .collect();
    let identities: Vec<Hash32> = (0..IDENTITIES).map(|i| keccak256(&[i as u8])).collect();

    let events = Arc::new(MemoryEventSink::new());
    let registry = Arc::new(
        EnclaveRegistry::new(OWNER, authority.address(), 1, Address([0xaa; 20]), clock.clone())
            .expect("registry")
            .with_event_sink(events.clone()),
    );
    let ledger = DecisionLedger::new(OWNER, 1, Address([0xbb; 20]), clock.clone())
        .expect("ledger")
        .with_event_sink(events.clone())
        .with_verifier(Address([0xaa; 20]), registry.clone())
        .expect("verifier");

    // Model of the committed state.
    let mut allowed: HashSet<usize> = HashSet::new();
    let mut bindings: HashMap<usize, u64> = HashMap::new();
    let mut logged: HashSet<u8> = HashSet::new();

    for op in ops {
        let now = clock.now();
        match op {
            Op::Allow { identity, allowed: allow } => {
                registry
                    .set_allowed_code_identity(OWNER, identities[identity], allow)
                    .expect("owner allowlist update");
                if allow {
                    allowed.insert(identity);
                } else {
                    allowed.remove(&identity);
                }
            }
            Op::Register { key, identity, expiry_delta, trusted } => {
                let expiry = now.saturating_add_signed(expiry_delta);
                let signer = if trusted { &authority } else { &impostor };
                let digest = registry
                    .registration_hash(&keys[key].address(), &identities[identity], expiry)
                    .expect("registration hash");
                let sig = signer.sign_digest(&digest).expect("sign");
                let result =
                    registry.register_enclave(keys[key].address(), identities[identity], expiry, &sig);

                match (trusted, allowed.contains(&identity), expiry > now) {
                    (false, _, _) => assert!(matches!(result, Err(AdlError::UntrustedAuthority { .. }))),
                    (true, false, _) => assert!(matches!(result, Err(AdlError::UnknownCodeIdentity(_)))),
                    (true, true, false) => assert!(matches!(result, Err(AdlError::ExpiredRegistration { .. }))),
                    (true, true, true) => {
                        assert!(result.is_ok());
                        bindings.insert(key, expiry);
                    }
                }
            }
            Op::Revoke { key } => {
                let existed = registry
                    .revoke_enclave(OWNER, keys[key].address())
                    .expect("owner revoke");
                assert_eq!(existed, bindings.remove(&key).is_some());
            }
            Op::Advance { secs } => clock.advance(secs),
            Op::Log { id, key, tamper } => {
                let signed = submission(id, key);
                let digest = ledger.canonical_hash(&signed).expect("canonical hash");
                let sig = keys[key].sign_digest(&digest).expect("sign");
                let mut submitted = signed.clone();
                if tamper {
                    submitted.amount += 1;
                }
                let result = ledger.log_decision(submitted, &sig);

                let bound = bindings.get(&key).is_some_and(|&expiry| now < expiry);
                if logged.contains(&id) {
                    assert!(matches!(result, Err(AdlError::DuplicateDecision(_))));
                } else if bound && !tamper {
                    assert!(result.is_ok());
                    logged.insert(id);
                } else {
                    assert!(matches!(result, Err(AdlError::UnauthorizedSignature)));
                }
            }
        }

        assert_eq!(ledger.decision_count(), logged.len());
    }

    // Every committed decision produced exactly one event.
    let decision_events = events
        .events()
        .iter()
        .filter(|(_, e)| e.name() == "decision_logged")
        .count();
    assert_eq!(decision_events, logged.len());
});
