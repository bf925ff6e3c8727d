//! Enclave registry and decision verifier.
//!
//! Two governed key-value stores live here:
//!
//! - the allowlist of trusted code identities (governance-only), and
//! - the map `signing_key -> EnclaveBinding` of keys the attestation authority has vouched for.
//!
//! `register_enclave` is permissionless; its gate is the authority's signature over the
//! registration digest. `verify_decision` is the single verification entry point the ledger
//! depends on (through [`DecisionVerifier`]).
//!
//! # Grace period
//!
//! Removing a code identity from the allowlist does not touch existing bindings: a key bound
//! under that identity stays valid until its expiry. Immediate invalidation goes through
//! [`EnclaveRegistry::revoke_enclave`].

use crate::clock::Clock;
use crate::crypto::recover_signer;
use crate::domain::{type_hash, DomainSeparator, WordEncoder};
use crate::events::{Event, EventSink, TracingEventSink};
use crate::governance::Ownable;
use crate::metrics::TrustMetrics;
use crate::{AdlError, Address, CodeIdentity, Hash32, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument, warn};

/// Structured-data type string of an attestation-authority registration.
pub const ENCLAVE_REGISTRATION_TYPE: &str =
    "EnclaveRegistration(address signingKey,bytes32 codeIdentity,uint256 expiry)";

/// Binding of an enclave signing key to a trusted code identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnclaveBinding {
    pub signing_key: Address,
    pub code_identity: CodeIdentity,
    /// Exclusive upper bound of the validity window (unix seconds).
    pub expiry: Timestamp,
}

impl EnclaveBinding {
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        now < self.expiry
    }
}

/// Decides whether a canonical decision digest was signed by a currently valid enclave key.
pub trait DecisionVerifier: Send + Sync {
    /// Returns `true` iff `signature` recovers to a registered key whose binding has not
    /// expired.
    ///
    /// Must not mutate verifier state: a digest may legitimately be checked several times
    /// before it is committed. Malformed signatures return `false`.
    fn verify_decision(&self, canonical_hash: &Hash32, signature: &[u8]) -> bool;
}

/// Struct hash of a registration (before domain wrapping).
pub fn registration_struct_hash(
    signing_key: &Address,
    code_identity: &CodeIdentity,
    expiry: Timestamp,
) -> Hash32 {
    WordEncoder::new()
        .hash(&type_hash(ENCLAVE_REGISTRATION_TYPE))
        .address(signing_key)
        .hash(code_identity)
        .uint(u128::from(expiry))
        .keccak()
}

struct RegistryState {
    ownable: Ownable,
    attestation_authority: Address,
    allowed_code_identities: HashSet<CodeIdentity>,
    bindings: HashMap<Address, EnclaveBinding>,
    domain: DomainSeparator,
}

/// Registry of trusted code identities and attested enclave keys.
pub struct EnclaveRegistry {
    state: RwLock<RegistryState>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    metrics: Arc<TrustMetrics>,
}

impl EnclaveRegistry {
    /// Deploy a registry at `contract` on `chain_id`.
    ///
    /// Both `owner` and `attestation_authority` must be non-zero.
    pub fn new(
        owner: Address,
        attestation_authority: Address,
        chain_id: u64,
        contract: Address,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if attestation_authority.is_zero() {
            return Err(AdlError::ZeroAddress("attestation authority"));
        }
        if contract.is_zero() {
            return Err(AdlError::ZeroAddress("registry contract"));
        }
        let state = RegistryState {
            ownable: Ownable::new(owner)?,
            attestation_authority,
            allowed_code_identities: HashSet::new(),
            bindings: HashMap::new(),
            domain: DomainSeparator::new(chain_id, contract),
        };
        Ok(Self {
            state: RwLock::new(state),
            clock,
            events: Arc::new(TracingEventSink),
            metrics: Arc::new(TrustMetrics::new()),
        })
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<TrustMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryState>> {
        self.state
            .read()
            .map_err(|_| AdlError::ExecutionError("Enclave registry lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryState>> {
        self.state
            .write()
            .map_err(|_| AdlError::ExecutionError("Enclave registry lock poisoned".into()))
    }

    // -------------------------------------------------------------------------
    // Read accessors
    // -------------------------------------------------------------------------

    pub fn owner(&self) -> Result<Address> {
        Ok(self.read()?.ownable.owner())
    }

    pub fn attestation_authority(&self) -> Result<Address> {
        Ok(self.read()?.attestation_authority)
    }

    pub fn domain_separator(&self) -> Result<DomainSeparator> {
        Ok(self.read()?.domain)
    }

    pub fn metrics(&self) -> Arc<TrustMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Digest the attestation authority signs to bind `signing_key` to `code_identity`.
    pub fn registration_hash(
        &self,
        signing_key: &Address,
        code_identity: &CodeIdentity,
        expiry: Timestamp,
    ) -> Result<Hash32> {
        let domain = self.read()?.domain;
        Ok(domain.typed_data_hash(&registration_struct_hash(
            signing_key,
            code_identity,
            expiry,
        )))
    }

    /// Allowlist membership. A poisoned lock reads as "not allowed".
    pub fn is_code_identity_allowed(&self, code_identity: &CodeIdentity) -> bool {
        self.read()
            .map(|s| s.allowed_code_identities.contains(code_identity))
            .unwrap_or(false)
    }

    /// Stored binding for `signing_key`, expired or not.
    pub fn binding(&self, signing_key: &Address) -> Option<EnclaveBinding> {
        self.read().ok()?.bindings.get(signing_key).copied()
    }

    /// Whether `signing_key` is bound and unexpired right now.
    pub fn is_enclave_valid(&self, signing_key: &Address) -> bool {
        let now = self.clock.now();
        self.binding(signing_key)
            .is_some_and(|binding| binding.is_valid_at(now))
    }

    // -------------------------------------------------------------------------
    // Governance
    // -------------------------------------------------------------------------

    /// Add or remove a code identity from the allowlist.
    ///
    /// Existing bindings are untouched (see the module docs on the grace period).
    #[instrument(skip(self), fields(code_identity = %code_identity.short()))]
    pub fn set_allowed_code_identity(
        &self,
        caller: Address,
        code_identity: CodeIdentity,
        allowed: bool,
    ) -> Result<()> {
        let mut state = self.write()?;
        state.ownable.ensure_owner(caller)?;
        if code_identity == Hash32::ZERO {
            return Err(AdlError::InvalidInput("code identity must be non-zero".into()));
        }

        let contract = state.domain.verifying_contract();
        let event = Event::CodeIdentityUpdated {
            code_identity,
            allowed,
        };
        self.events.emit(contract, &event)?;

        if allowed {
            state.allowed_code_identities.insert(code_identity);
        } else {
            state.allowed_code_identities.remove(&code_identity);
        }
        self.events.committed(contract, &event);
        info!(allowed, "Code identity allowlist updated");
        Ok(())
    }

    /// Remove a binding immediately, regardless of its expiry.
    ///
    /// Returns whether a binding existed.
    #[instrument(skip(self), fields(signing_key = %signing_key))]
    pub fn revoke_enclave(&self, caller: Address, signing_key: Address) -> Result<bool> {
        let mut state = self.write()?;
        state.ownable.ensure_owner(caller)?;
        if !state.bindings.contains_key(&signing_key) {
            debug!("No binding to revoke");
            return Ok(false);
        }

        let contract = state.domain.verifying_contract();
        let event = Event::EnclaveRevoked { signing_key };
        self.events.emit(contract, &event)?;
        state.bindings.remove(&signing_key);
        self.events.committed(contract, &event);
        info!("Enclave binding revoked");
        Ok(true)
    }

    /// Replace the attestation authority. Existing bindings are untouched.
    #[instrument(skip(self), fields(authority = %new_authority))]
    pub fn set_attestation_authority(&self, caller: Address, new_authority: Address) -> Result<()> {
        let mut state = self.write()?;
        state.ownable.ensure_owner(caller)?;
        if new_authority.is_zero() {
            return Err(AdlError::ZeroAddress("attestation authority"));
        }

        let contract = state.domain.verifying_contract();
        let event = Event::AttestationAuthorityUpdated {
            previous: state.attestation_authority,
            current: new_authority,
        };
        self.events.emit(contract, &event)?;
        state.attestation_authority = new_authority;
        self.events.committed(contract, &event);
        info!("Attestation authority updated");
        Ok(())
    }

    pub fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<()> {
        let mut state = self.write()?;
        let event = state.ownable.check_transfer(caller, new_owner)?;
        let contract = state.domain.verifying_contract();
        self.events.emit(contract, &event)?;
        state.ownable.apply_transfer(new_owner);
        self.events.committed(contract, &event);
        Ok(())
    }

    /// Move the registry to a new contract address.
    ///
    /// Recomputes the domain separator, so every registration signature issued for the old
    /// address stops verifying. Stored bindings carry over.
    #[instrument(skip(self), fields(new_contract = %new_contract))]
    pub fn migrate_to(&self, caller: Address, new_contract: Address) -> Result<DomainSeparator> {
        let mut state = self.write()?;
        state.ownable.ensure_owner(caller)?;
        if new_contract.is_zero() {
            return Err(AdlError::ZeroAddress("registry contract"));
        }

        let previous_contract = state.domain.verifying_contract();
        let mut domain = state.domain;
        domain.rebind(new_contract);
        let event = Event::DomainRebound {
            previous_contract,
            new_contract,
            separator: domain.separator(),
        };
        self.events.emit(new_contract, &event)?;
        state.domain = domain;
        self.events.committed(new_contract, &event);
        warn!(
            separator = %domain.separator().short(),
            "Registry domain rebound; earlier registration signatures are void"
        );
        Ok(domain)
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Bind `signing_key` to `code_identity` until `expiry`, authorized by the attestation
    /// authority's signature over [`EnclaveRegistry::registration_hash`].
    ///
    /// Re-registering a key overwrites its binding (last write wins).
    ///
    /// # Errors
    /// - `UntrustedAuthority` if the signature does not recover to the attestation authority
    /// - `UnknownCodeIdentity` if `code_identity` is not allowlisted
    /// - `ExpiredRegistration` if `expiry` is not in the future
    #[instrument(
        skip(self, authority_signature),
        fields(signing_key = %signing_key, code_identity = %code_identity.short())
    )]
    pub fn register_enclave(
        &self,
        signing_key: Address,
        code_identity: CodeIdentity,
        expiry: Timestamp,
        authority_signature: &[u8],
    ) -> Result<EnclaveBinding> {
        let result = self.try_register(signing_key, code_identity, expiry, authority_signature);
        match &result {
            Ok(_) => {
                self.metrics.registrations_accepted.inc();
                info!("Enclave registered");
            }
            Err(e) => {
                self.metrics.registrations_rejected.inc();
                warn!(error = %e, "Enclave registration rejected");
            }
        }
        result
    }

    fn try_register(
        &self,
        signing_key: Address,
        code_identity: CodeIdentity,
        expiry: Timestamp,
        authority_signature: &[u8],
    ) -> Result<EnclaveBinding> {
        if signing_key.is_zero() {
            return Err(AdlError::ZeroAddress("signing key"));
        }

        let mut state = self.write()?;

        let digest = state.domain.typed_data_hash(&registration_struct_hash(
            &signing_key,
            &code_identity,
            expiry,
        ));
        let recovered = recover_signer(&digest, authority_signature);
        if recovered != Some(state.attestation_authority) {
            return Err(AdlError::UntrustedAuthority { recovered });
        }

        if !state.allowed_code_identities.contains(&code_identity) {
            return Err(AdlError::UnknownCodeIdentity(code_identity));
        }

        let now = self.clock.now();
        if expiry <= now {
            return Err(AdlError::ExpiredRegistration { expiry, now });
        }

        let binding = EnclaveBinding {
            signing_key,
            code_identity,
            expiry,
        };
        let contract = state.domain.verifying_contract();
        let event = Event::EnclaveRegistered {
            signing_key,
            code_identity,
            expiry,
        };
        self.events.emit(contract, &event)?;
        state.bindings.insert(signing_key, binding);
        self.events.committed(contract, &event);
        Ok(binding)
    }
}

impl DecisionVerifier for EnclaveRegistry {
    #[instrument(skip(self, signature), fields(digest = %canonical_hash.short()))]
    fn verify_decision(&self, canonical_hash: &Hash32, signature: &[u8]) -> bool {
        let Some(signer) = recover_signer(canonical_hash, signature) else {
            self.metrics.verifications_failed.inc();
            warn!("Malformed or unrecoverable decision signature");
            return false;
        };

        let now = self.clock.now();
        let valid = self
            .binding(&signer)
            .is_some_and(|binding| binding.is_valid_at(now));

        if valid {
            self.metrics.verifications_passed.inc();
            debug!(signer = %signer, "Decision signature verified");
        } else {
            self.metrics.verifications_failed.inc();
            warn!(signer = %signer, "Decision signer is not a valid enclave key");
        }
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::crypto::EnclaveSigningKey;
    use crate::domain::keccak256;
    use crate::events::{FanoutEventSink, MemoryEventSink};

    const CHAIN_ID: u64 = 31337;
    const NOW: Timestamp = 1_700_000_000;

    struct Fixture {
        registry: EnclaveRegistry,
        clock: Arc<ManualClock>,
        events: Arc<MemoryEventSink>,
        owner: Address,
        authority: EnclaveSigningKey,
        enclave: EnclaveSigningKey,
        identity: CodeIdentity,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(NOW));
        let events = Arc::new(MemoryEventSink::new());
        let owner = Address([0x0a; 20]);
        let authority = EnclaveSigningKey::from_seed(&[0x11; 32]).unwrap();
        let enclave = EnclaveSigningKey::from_seed(&[0x22; 32]).unwrap();
        let registry = EnclaveRegistry::new(
            owner,
            authority.address(),
            CHAIN_ID,
            Address([0xee; 20]),
            clock.clone(),
        )
        .unwrap()
        .with_event_sink(events.clone());
        Fixture {
            registry,
            clock,
            events,
            owner,
            authority,
            enclave,
            identity: keccak256(b"enclave-build-v1"),
        }
    }

    fn authority_sig(f: &Fixture, key: Address, identity: CodeIdentity, expiry: Timestamp) -> Vec<u8> {
        let digest = f.registry.registration_hash(&key, &identity, expiry).unwrap();
        f.authority.sign_digest(&digest).unwrap().to_vec()
    }

    fn register(f: &Fixture, expiry: Timestamp) -> Result<EnclaveBinding> {
        let sig = authority_sig(f, f.enclave.address(), f.identity, expiry);
        f.registry
            .register_enclave(f.enclave.address(), f.identity, expiry, &sig)
    }

    #[test]
    fn constructor_rejects_zero_addresses() {
        let clock = Arc::new(ManualClock::new(NOW));
        let a = Address([1u8; 20]);
        assert!(EnclaveRegistry::new(Address::ZERO, a, 1, a, clock.clone()).is_err());
        assert!(EnclaveRegistry::new(a, Address::ZERO, 1, a, clock.clone()).is_err());
        assert!(EnclaveRegistry::new(a, a, 1, Address::ZERO, clock).is_err());
    }

    #[test]
    fn allowlist_is_owner_only() {
        let f = fixture();
        let err = f
            .registry
            .set_allowed_code_identity(Address([0x0b; 20]), f.identity, true)
            .unwrap_err();
        assert!(matches!(err, AdlError::NotOwner { .. }));
        assert!(!f.registry.is_code_identity_allowed(&f.identity));

        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        assert!(f.registry.is_code_identity_allowed(&f.identity));
    }

    #[test]
    fn zero_code_identity_rejected() {
        let f = fixture();
        assert!(matches!(
            f.registry.set_allowed_code_identity(f.owner, Hash32::ZERO, true),
            Err(AdlError::InvalidInput(_))
        ));
    }

    #[test]
    fn registration_requires_allowlisted_identity() {
        let f = fixture();
        let expiry = NOW + 3600;
        assert!(matches!(
            register(&f, expiry),
            Err(AdlError::UnknownCodeIdentity(id)) if id == f.identity
        ));

        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        let binding = register(&f, expiry).unwrap();
        assert_eq!(binding.expiry, expiry);
        assert!(f.registry.is_enclave_valid(&f.enclave.address()));
    }

    #[test]
    fn registration_signed_by_other_key_is_untrusted() {
        let f = fixture();
        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        let expiry = NOW + 3600;
        let digest = f
            .registry
            .registration_hash(&f.enclave.address(), &f.identity, expiry)
            .unwrap();
        // An enclave cannot vouch for itself.
        let self_signed = f.enclave.sign_digest(&digest).unwrap();

        let err = f
            .registry
            .register_enclave(f.enclave.address(), f.identity, expiry, &self_signed)
            .unwrap_err();
        assert!(matches!(
            err,
            AdlError::UntrustedAuthority { recovered: Some(addr) } if addr == f.enclave.address()
        ));
        assert!(f.registry.binding(&f.enclave.address()).is_none());
    }

    #[test]
    fn registration_signature_binds_expiry() {
        let f = fixture();
        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        let sig = authority_sig(&f, f.enclave.address(), f.identity, NOW + 60);
        let err = f
            .registry
            .register_enclave(f.enclave.address(), f.identity, NOW + 86_400, &sig)
            .unwrap_err();
        assert!(matches!(err, AdlError::UntrustedAuthority { .. }));
    }

    #[test]
    fn malformed_registration_signature_is_untrusted() {
        let f = fixture();
        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        let err = f
            .registry
            .register_enclave(f.enclave.address(), f.identity, NOW + 60, &[1, 2, 3])
            .unwrap_err();
        assert!(matches!(err, AdlError::UntrustedAuthority { recovered: None }));
    }

    #[test]
    fn past_or_present_expiry_rejected() {
        let f = fixture();
        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        assert!(matches!(
            register(&f, NOW),
            Err(AdlError::ExpiredRegistration { .. })
        ));
        assert!(matches!(
            register(&f, NOW - 1),
            Err(AdlError::ExpiredRegistration { .. })
        ));
        assert_eq!(f.registry.metrics().snapshot().registrations_rejected, 2);
    }

    #[test]
    fn reregistration_overwrites_expiry() {
        let f = fixture();
        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        register(&f, NOW + 100).unwrap();
        register(&f, NOW + 50).unwrap();
        assert_eq!(
            f.registry.binding(&f.enclave.address()).unwrap().expiry,
            NOW + 50
        );
    }

    #[test]
    fn verify_decision_honours_expiry_boundary() {
        let f = fixture();
        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        let expiry = NOW + 10;
        register(&f, expiry).unwrap();

        let digest = keccak256(b"canonical decision");
        let sig = f.enclave.sign_digest(&digest).unwrap();

        f.clock.set(expiry - 1);
        assert!(f.registry.verify_decision(&digest, &sig));
        f.clock.set(expiry);
        assert!(!f.registry.verify_decision(&digest, &sig));
        f.clock.set(expiry + 1);
        assert!(!f.registry.verify_decision(&digest, &sig));
    }

    #[test]
    fn verify_decision_is_repeatable() {
        let f = fixture();
        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        register(&f, NOW + 3600).unwrap();
        let digest = keccak256(b"checked twice");
        let sig = f.enclave.sign_digest(&digest).unwrap();
        assert!(f.registry.verify_decision(&digest, &sig));
        assert!(f.registry.verify_decision(&digest, &sig));
    }

    #[test]
    fn unregistered_and_malformed_signers_fail_verification() {
        let f = fixture();
        let digest = keccak256(b"decision");
        let stranger = EnclaveSigningKey::from_seed(&[0x33; 32]).unwrap();
        let sig = stranger.sign_digest(&digest).unwrap();
        assert!(!f.registry.verify_decision(&digest, &sig));
        assert!(!f.registry.verify_decision(&digest, &sig[..10]));
    }

    #[test]
    fn removing_identity_keeps_existing_binding_until_expiry() {
        let f = fixture();
        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        register(&f, NOW + 3600).unwrap();
        f.registry
            .set_allowed_code_identity(f.owner, f.identity, false)
            .unwrap();

        let digest = keccak256(b"grace period");
        let sig = f.enclave.sign_digest(&digest).unwrap();
        assert!(f.registry.verify_decision(&digest, &sig));

        // New registrations under the removed identity are refused.
        assert!(matches!(
            register(&f, NOW + 7200),
            Err(AdlError::UnknownCodeIdentity(_))
        ));
    }

    #[test]
    fn revocation_invalidates_immediately() {
        let f = fixture();
        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        register(&f, NOW + 3600).unwrap();

        assert!(f
            .registry
            .revoke_enclave(Address([0x0b; 20]), f.enclave.address())
            .is_err());
        assert!(f
            .registry
            .revoke_enclave(f.owner, f.enclave.address())
            .unwrap());
        assert!(!f
            .registry
            .revoke_enclave(f.owner, f.enclave.address())
            .unwrap());

        let digest = keccak256(b"revoked");
        let sig = f.enclave.sign_digest(&digest).unwrap();
        assert!(!f.registry.verify_decision(&digest, &sig));
    }

    #[test]
    fn rotating_authority_changes_who_can_register() {
        let f = fixture();
        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        let new_authority = EnclaveSigningKey::from_seed(&[0x44; 32]).unwrap();
        f.registry
            .set_attestation_authority(f.owner, new_authority.address())
            .unwrap();

        assert!(matches!(
            register(&f, NOW + 60),
            Err(AdlError::UntrustedAuthority { .. })
        ));

        let digest = f
            .registry
            .registration_hash(&f.enclave.address(), &f.identity, NOW + 60)
            .unwrap();
        let sig = new_authority.sign_digest(&digest).unwrap();
        f.registry
            .register_enclave(f.enclave.address(), f.identity, NOW + 60, &sig)
            .unwrap();
    }

    #[test]
    fn migration_voids_old_registration_signatures() {
        let f = fixture();
        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        let stale = authority_sig(&f, f.enclave.address(), f.identity, NOW + 60);

        let before = f.registry.domain_separator().unwrap();
        let after = f
            .registry
            .migrate_to(f.owner, Address([0xef; 20]))
            .unwrap();
        assert_ne!(before.separator(), after.separator());

        assert!(matches!(
            f.registry
                .register_enclave(f.enclave.address(), f.identity, NOW + 60, &stale),
            Err(AdlError::UntrustedAuthority { .. })
        ));
        register(&f, NOW + 60).unwrap();
    }

    #[test]
    fn events_are_emitted_for_committed_changes_only() {
        let f = fixture();
        f.registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();
        let _ = register(&f, NOW - 1);
        register(&f, NOW + 60).unwrap();

        let names: Vec<&str> = f.events.events().iter().map(|(_, e)| e.name()).collect();
        assert_eq!(names, vec!["code_identity_updated", "enclave_registered"]);
        assert!(matches!(
            f.events.events()[1].1,
            Event::EnclaveRegistered { expiry, .. } if expiry == NOW + 60
        ));
    }

    /// Durable sink that refuses registrations and accepts everything else.
    struct RefusingRegistrations;

    impl EventSink for RefusingRegistrations {
        fn emit(&self, _contract: Address, event: &Event) -> Result<()> {
            match event {
                Event::EnclaveRegistered { .. } => {
                    Err(AdlError::JournalError("disk full".into()))
                }
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn refused_registration_event_leaves_no_binding() {
        let f = fixture();
        let observer = Arc::new(MemoryEventSink::new());
        let sink = FanoutEventSink::new(vec![observer.clone() as Arc<dyn EventSink>])
            .with_durable(Arc::new(RefusingRegistrations));
        let registry = EnclaveRegistry::new(
            f.owner,
            f.authority.address(),
            CHAIN_ID,
            Address([0xee; 20]),
            f.clock.clone(),
        )
        .unwrap()
        .with_event_sink(Arc::new(sink));
        registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .unwrap();

        let sig = authority_sig(&f, f.enclave.address(), f.identity, NOW + 60);
        let err = registry
            .register_enclave(f.enclave.address(), f.identity, NOW + 60, &sig)
            .unwrap_err();
        assert!(matches!(err, AdlError::JournalError(_)));
        assert!(registry.binding(&f.enclave.address()).is_none());

        let names: Vec<&str> = observer.events().iter().map(|(_, e)| e.name()).collect();
        assert_eq!(names, vec!["code_identity_updated"]);
        assert_eq!(registry.metrics().snapshot().registrations_rejected, 1);
    }

    #[test]
    fn ownership_transfer_moves_governance() {
        let f = fixture();
        let next = Address([0x0c; 20]);
        f.registry.transfer_ownership(f.owner, next).unwrap();
        assert_eq!(f.registry.owner().unwrap(), next);
        assert!(f
            .registry
            .set_allowed_code_identity(f.owner, f.identity, true)
            .is_err());
        f.registry
            .set_allowed_code_identity(next, f.identity, true)
            .unwrap();
    }
}
