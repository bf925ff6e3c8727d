//! In-process deployment of a registry/ledger pair.
//!
//! The registry is wired as the ledger's verifier, both share one event sink, one metrics
//! instance and one clock.

use crate::clock::Clock;
use crate::config::AdlConfig;
use crate::domain::keccak256;
use crate::events::EventSink;
use crate::ledger::DecisionLedger;
use crate::metrics::TrustMetrics;
use crate::registry::EnclaveRegistry;
use crate::{AdlError, Address, Result};
use std::sync::Arc;
use tracing::info;

/// Derivation label of the registry address.
pub const REGISTRY_LABEL: &str = "registry";
/// Derivation label of the ledger address.
pub const LEDGER_LABEL: &str = "ledger";

/// Deterministic address for a component deployed by `deployer`.
///
/// Used when the configuration leaves contract addresses unset.
pub fn derive_contract_address(deployer: &Address, label: &str) -> Address {
    let mut preimage = Vec::with_capacity(20 + label.len());
    preimage.extend_from_slice(&deployer.0);
    preimage.extend_from_slice(label.as_bytes());
    let digest = keccak256(&preimage);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest.0[12..]);
    Address(out)
}

pub struct Deployment {
    pub registry: Arc<EnclaveRegistry>,
    pub ledger: DecisionLedger,
    pub metrics: Arc<TrustMetrics>,
}

impl Deployment {
    /// Deploy both components as described by `config`.
    ///
    /// `registry.owner` and `registry.attestation_authority` are required.
    pub fn from_config(
        config: &AdlConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let owner = config
            .registry
            .owner
            .ok_or_else(|| AdlError::ConfigError("registry.owner is required".into()))?;
        let authority = config.registry.attestation_authority.ok_or_else(|| {
            AdlError::ConfigError("registry.attestation_authority is required".into())
        })?;

        let chain_id = config.domain.chain_id;
        let registry_contract = config
            .effective_registry_contract()
            .unwrap_or_else(|| derive_contract_address(&owner, REGISTRY_LABEL));
        let ledger_contract = config
            .effective_ledger_contract()
            .unwrap_or_else(|| derive_contract_address(&owner, LEDGER_LABEL));
        if registry_contract == ledger_contract {
            return Err(AdlError::ConfigError(
                "registry and ledger must be deployed at distinct addresses".into(),
            ));
        }

        let metrics = Arc::new(TrustMetrics::new());
        let registry = Arc::new(
            EnclaveRegistry::new(owner, authority, chain_id, registry_contract, clock.clone())?
                .with_event_sink(events.clone())
                .with_metrics(metrics.clone()),
        );
        let ledger = DecisionLedger::new(owner, chain_id, ledger_contract, clock)?
            .with_event_sink(events)
            .with_metrics(metrics.clone())
            .with_max_page_size(config.ledger.max_page_size)
            .with_verifier(registry_contract, registry.clone())?;

        info!(
            chain_id,
            registry = %registry_contract,
            ledger = %ledger_contract,
            "Deployment ready"
        );
        Ok(Self {
            registry,
            ledger,
            metrics,
        })
    }
}
