//! Events emitted by the registry and the ledger.
//!
//! Events are the only interface off-chain indexers and UIs need to discover new decisions and
//! enclave registrations without polling every id.
//!
//! Delivery has two phases. Inside its write lock a component first calls
//! [`EventSink::emit`], which may durably stage the event and may fail; a failure aborts the
//! call and nothing is committed. Once the state change is committed the component calls
//! [`EventSink::committed`], which cannot fail. Observers that must never see an event for a
//! change that did not happen (logs, in-memory indexers) only act in the second phase.

use crate::decision::{ActionKind, DecisionId};
use crate::{Address, CodeIdentity, Hash32, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Summary of a logged decision. Free-text fields are left out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionLogged {
    pub id: DecisionId,
    pub user: Address,
    pub action_kind: ActionKind,
    pub asset: Address,
    #[serde(with = "crate::decision::amount_string")]
    pub amount: u128,
    pub confidence_score: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    CodeIdentityUpdated {
        code_identity: CodeIdentity,
        allowed: bool,
    },
    EnclaveRegistered {
        signing_key: Address,
        code_identity: CodeIdentity,
        expiry: Timestamp,
    },
    EnclaveRevoked {
        signing_key: Address,
    },
    AttestationAuthorityUpdated {
        previous: Address,
        current: Address,
    },
    DecisionLogged(DecisionLogged),
    VerifierUpdated {
        previous: Address,
        current: Address,
    },
    OwnershipTransferred {
        previous: Address,
        current: Address,
    },
    DomainRebound {
        previous_contract: Address,
        new_contract: Address,
        separator: Hash32,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::CodeIdentityUpdated { .. } => "code_identity_updated",
            Event::EnclaveRegistered { .. } => "enclave_registered",
            Event::EnclaveRevoked { .. } => "enclave_revoked",
            Event::AttestationAuthorityUpdated { .. } => "attestation_authority_updated",
            Event::DecisionLogged(_) => "decision_logged",
            Event::VerifierUpdated { .. } => "verifier_updated",
            Event::OwnershipTransferred { .. } => "ownership_transferred",
            Event::DomainRebound { .. } => "domain_rebound",
        }
    }
}

/// Destination for emitted events.
pub trait EventSink: Send + Sync {
    /// Stage `event`, emitted by the component deployed at `contract`, before the change behind
    /// it is committed.
    ///
    /// An error aborts the emitting call and nothing is committed.
    fn emit(&self, _contract: Address, _event: &Event) -> Result<()> {
        Ok(())
    }

    /// The change behind `event` has been committed.
    fn committed(&self, _contract: Address, _event: &Event) {}
}

/// Writes every committed event as a structured log line.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn committed(&self, contract: Address, event: &Event) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        info!(contract = %contract, event = event.name(), %payload, "event");
    }
}

/// Keeps every committed event in memory, in commit order.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<(Address, Event)>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events. A poisoned lock reads as empty.
    pub fn events(&self) -> Vec<(Address, Event)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemoryEventSink {
    fn committed(&self, contract: Address, event: &Event) {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        events.push((contract, event.clone()));
    }
}

/// Combines at most one durable sink with any number of observers.
///
/// Only the durable sink takes part in the staging phase, so a refused event never reaches an
/// observer. Observers are notified after commit, in order.
pub struct FanoutEventSink {
    durable: Option<Arc<dyn EventSink>>,
    observers: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(observers: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            durable: None,
            observers,
        }
    }

    /// Stage every event in `durable` (typically a journal) before the emitting call commits.
    pub fn with_durable(mut self, durable: Arc<dyn EventSink>) -> Self {
        self.durable = Some(durable);
        self
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, contract: Address, event: &Event) -> Result<()> {
        match &self.durable {
            Some(durable) => durable.emit(contract, event),
            None => Ok(()),
        }
    }

    fn committed(&self, contract: Address, event: &Event) {
        if let Some(durable) = &self.durable {
            durable.committed(contract, event);
        }
        for observer in &self.observers {
            observer.committed(contract, event);
        }
    }
}
