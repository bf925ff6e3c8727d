//! Decision ledger: canonicalize, verify, persist once.
//!
//! `log_decision` runs entirely under the ledger's write lock:
//!
//! 1. precondition checks (duplicate id, zero user, action kind range, score range)
//! 2. canonical hash of the submission under the ledger's domain separator
//! 3. `DecisionVerifier::verify_decision` on that hash
//! 4. event staging, commit of the record and both indices, then commit notification
//!
//! Any failure up to and including event staging leaves the ledger unchanged, and observers
//! only hear about decisions that were actually stored. Because the duplicate check
//! and the insert share one critical section, concurrent submissions of the same id produce
//! exactly one success.

use crate::clock::Clock;
use crate::decision::{
    decision_struct_hash, ActionKind, Decision, DecisionId, DecisionSubmission,
    MAX_CONFIDENCE_SCORE,
};
use crate::domain::DomainSeparator;
use crate::events::{DecisionLogged, Event, EventSink, TracingEventSink};
use crate::governance::Ownable;
use crate::metrics::TrustMetrics;
use crate::registry::DecisionVerifier;
use crate::{AdlError, Address, Hash32, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument, warn};

/// Default upper bound on the number of entries a single page read returns.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;

struct TrustedVerifier {
    address: Address,
    verifier: Arc<dyn DecisionVerifier>,
}

struct LedgerState {
    ownable: Ownable,
    verifier: Option<TrustedVerifier>,
    domain: DomainSeparator,
    decisions: HashMap<DecisionId, Decision>,
    /// Global index in commit order.
    all_ids: Vec<DecisionId>,
    user_ids: HashMap<Address, Vec<DecisionId>>,
}

/// Append-only store of verified decisions.
pub struct DecisionLedger {
    state: RwLock<LedgerState>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    metrics: Arc<TrustMetrics>,
    max_page_size: usize,
}

impl DecisionLedger {
    /// Deploy a ledger at `contract` on `chain_id`. No verifier is wired yet; until one is,
    /// every write fails with `VerifierNotSet`.
    pub fn new(
        owner: Address,
        chain_id: u64,
        contract: Address,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if contract.is_zero() {
            return Err(AdlError::ZeroAddress("ledger contract"));
        }
        let state = LedgerState {
            ownable: Ownable::new(owner)?,
            verifier: None,
            domain: DomainSeparator::new(chain_id, contract),
            decisions: HashMap::new(),
            all_ids: Vec::new(),
            user_ids: HashMap::new(),
        };
        Ok(Self {
            state: RwLock::new(state),
            clock,
            events: Arc::new(TracingEventSink),
            metrics: Arc::new(TrustMetrics::new()),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        })
    }

    /// Wire the initial verifier at deploy time. Later swaps go through
    /// [`DecisionLedger::set_verifier`].
    pub fn with_verifier(
        mut self,
        verifier_address: Address,
        verifier: Arc<dyn DecisionVerifier>,
    ) -> Result<Self> {
        if verifier_address.is_zero() {
            return Err(AdlError::ZeroAddress("verifier"));
        }
        let state = self
            .state
            .get_mut()
            .map_err(|_| AdlError::ExecutionError("Decision ledger lock poisoned".into()))?;
        state.verifier = Some(TrustedVerifier {
            address: verifier_address,
            verifier,
        });
        Ok(self)
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<TrustMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Cap page reads at `max_page_size` entries (at least one).
    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|_| AdlError::ExecutionError("Decision ledger lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .write()
            .map_err(|_| AdlError::ExecutionError("Decision ledger lock poisoned".into()))
    }

    pub fn owner(&self) -> Result<Address> {
        Ok(self.read()?.ownable.owner())
    }

    /// Address of the currently trusted verifier, if one is wired.
    pub fn verifier_address(&self) -> Result<Option<Address>> {
        Ok(self.read()?.verifier.as_ref().map(|v| v.address))
    }

    pub fn domain_separator(&self) -> Result<DomainSeparator> {
        Ok(self.read()?.domain)
    }

    pub fn metrics(&self) -> Arc<TrustMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Digest the enclave must sign for `submission` to be accepted by this ledger.
    pub fn canonical_hash(&self, submission: &DecisionSubmission) -> Result<Hash32> {
        let domain = self.read()?.domain;
        Ok(domain.typed_data_hash(&decision_struct_hash(submission)))
    }

    // -------------------------------------------------------------------------
    // Write path
    // -------------------------------------------------------------------------

    /// Verify and persist one decision.
    ///
    /// # Errors
    /// - `DuplicateDecision` if the id was already logged
    /// - `ZeroAddress`, `InvalidActionKind`, `ConfidenceOutOfRange` on malformed input
    /// - `VerifierNotSet` if no verifier is wired
    /// - `UnauthorizedSignature` if the verifier rejects the signature, which includes any
    ///   field altered after signing
    #[instrument(skip_all, fields(id = %submission.id, user = %submission.user))]
    pub fn log_decision(
        &self,
        submission: DecisionSubmission,
        signature: &[u8],
    ) -> Result<DecisionLogged> {
        let result = self.try_log(submission, signature);
        match &result {
            Ok(_) => {
                self.metrics.decisions_logged.inc();
                info!("Decision logged");
            }
            Err(e) => {
                self.metrics.decisions_rejected.inc();
                warn!(error = %e, "Decision rejected");
            }
        }
        result
    }

    fn try_log(&self, submission: DecisionSubmission, signature: &[u8]) -> Result<DecisionLogged> {
        let mut state = self.write()?;

        if state.decisions.contains_key(&submission.id) {
            return Err(AdlError::DuplicateDecision(submission.id));
        }
        if submission.user.is_zero() {
            return Err(AdlError::ZeroAddress("user"));
        }
        let action_kind = ActionKind::from_u8(submission.action_kind)?;
        if submission.confidence_score > MAX_CONFIDENCE_SCORE {
            return Err(AdlError::ConfidenceOutOfRange {
                score: submission.confidence_score,
                max: MAX_CONFIDENCE_SCORE,
            });
        }

        let verifier = state
            .verifier
            .as_ref()
            .map(|v| Arc::clone(&v.verifier))
            .ok_or(AdlError::VerifierNotSet)?;

        let canonical = state
            .domain
            .typed_data_hash(&decision_struct_hash(&submission));
        if !verifier.verify_decision(&canonical, signature) {
            return Err(AdlError::UnauthorizedSignature);
        }
        debug!(digest = %canonical.short(), "Decision signature accepted");

        let timestamp = self.clock.now();
        let decision = Decision::from_submission(submission, action_kind, timestamp);
        let summary = DecisionLogged {
            id: decision.id,
            user: decision.user,
            action_kind,
            asset: decision.asset,
            amount: decision.amount,
            confidence_score: decision.confidence_score,
        };
        let contract = state.domain.verifying_contract();
        let event = Event::DecisionLogged(summary.clone());
        self.events.emit(contract, &event)?;

        let id = decision.id;
        let user = decision.user;
        state.decisions.insert(id, decision);
        state.all_ids.push(id);
        state.user_ids.entry(user).or_default().push(id);
        self.events.committed(contract, &event);
        Ok(summary)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn get_decision(&self, id: &DecisionId) -> Result<Decision> {
        self.read()?
            .decisions
            .get(id)
            .cloned()
            .ok_or(AdlError::NotFound(*id))
    }

    pub fn contains(&self, id: &DecisionId) -> bool {
        self.read()
            .map(|s| s.decisions.contains_key(id))
            .unwrap_or(false)
    }

    pub fn decision_count(&self) -> usize {
        self.read().map(|s| s.all_ids.len()).unwrap_or(0)
    }

    /// Every decision id logged for `user`, in commit order.
    pub fn get_user_decisions(&self, user: &Address) -> Result<Vec<DecisionId>> {
        Ok(self
            .read()?
            .user_ids
            .get(user)
            .cloned()
            .unwrap_or_default())
    }

    /// A window of the user's decision ids. Out-of-range offsets yield an empty page.
    pub fn get_user_decisions_page(
        &self,
        user: &Address,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DecisionId>> {
        let state = self.read()?;
        let ids = state.user_ids.get(user).map(Vec::as_slice).unwrap_or(&[]);
        Ok(page(ids, offset, limit.min(self.max_page_size)).to_vec())
    }

    /// A window of full records over the global index. Out-of-range offsets yield an empty
    /// page; `limit` is clamped to the remainder and to the configured page size.
    pub fn get_decisions(&self, offset: usize, limit: usize) -> Result<Vec<Decision>> {
        let state = self.read()?;
        page(&state.all_ids, offset, limit.min(self.max_page_size))
            .iter()
            .map(|id| {
                state.decisions.get(id).cloned().ok_or_else(|| {
                    AdlError::ExecutionError(format!("index references missing decision {id}"))
                })
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Governance
    // -------------------------------------------------------------------------

    /// Replace the trusted verifier. Takes effect for the next `log_decision`.
    #[instrument(skip(self, verifier), fields(verifier = %verifier_address))]
    pub fn set_verifier(
        &self,
        caller: Address,
        verifier_address: Address,
        verifier: Arc<dyn DecisionVerifier>,
    ) -> Result<()> {
        let mut state = self.write()?;
        state.ownable.ensure_owner(caller)?;
        if verifier_address.is_zero() {
            return Err(AdlError::ZeroAddress("verifier"));
        }

        let previous = state
            .verifier
            .as_ref()
            .map(|v| v.address)
            .unwrap_or(Address::ZERO);
        let contract = state.domain.verifying_contract();
        let event = Event::VerifierUpdated {
            previous,
            current: verifier_address,
        };
        self.events.emit(contract, &event)?;
        state.verifier = Some(TrustedVerifier {
            address: verifier_address,
            verifier,
        });
        self.events.committed(contract, &event);
        info!("Verifier updated");
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

    /// Move the ledger to a new contract address.
    ///
    /// Stored decisions carry over; decision signatures produced for the old address no longer
    /// verify.
    #[instrument(skip(self), fields(new_contract = %new_contract))]
    pub fn migrate_to(&self, caller: Address, new_contract: Address) -> Result<DomainSeparator> {
        let mut state = self.write()?;
        state.ownable.ensure_owner(caller)?;
        if new_contract.is_zero() {
            return Err(AdlError::ZeroAddress("ledger contract"));
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
            "Ledger domain rebound; earlier decision signatures are void"
        );
        Ok(domain)
    }
}

fn page<T>(items: &[T], offset: usize, limit: usize) -> &[T] {
    if offset >= items.len() {
        return &[];
    }
    let end = offset + limit.min(items.len() - offset);
    &items[offset..end]
}
