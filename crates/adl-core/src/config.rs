//! Configuration for an ADL deployment.
//!
//! # Configuration Sources
//!
//! - Environment variables (prefixed with `ADL_`)
//! - JSON configuration files
//! - Programmatic defaults via [`AdlConfig::builder`]
//!
//! # Example
//!
//! ```rust,ignore
//! use adl_core::config::AdlConfig;
//!
//! let config = AdlConfig::builder()
//!     .chain_id(8453)
//!     .owner(owner)
//!     .attestation_authority(authority)
//!     .build()?;
//! ```

use crate::deployment::{derive_contract_address, LEDGER_LABEL, REGISTRY_LABEL};
use crate::ledger::DEFAULT_MAX_PAGE_SIZE;
use crate::{AdlError, Address, Result};
use serde::{Deserialize, Serialize};

/// Hard ceiling for `ledger.max_page_size`.
pub const MAX_PAGE_SIZE_LIMIT: usize = 1_000;

/// Complete ADL configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdlConfig {
    pub domain: DomainConfig,
    pub registry: RegistryConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

impl AdlConfig {
    pub fn builder() -> AdlConfigBuilder {
        AdlConfigBuilder::default()
    }

    /// Parse and validate a JSON document. Missing sections take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AdlError::ConfigError(format!("Invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// - `ADL_CHAIN_ID` - chain id bound into both domain separators
    /// - `ADL_REGISTRY_CONTRACT` / `ADL_LEDGER_CONTRACT` - deployment addresses (hex)
    /// - `ADL_OWNER` - governance owner (hex)
    /// - `ADL_ATTESTATION_AUTHORITY` - attestation authority (hex)
    /// - `ADL_MAX_PAGE_SIZE` - page size cap for ledger reads
    /// - `ADL_LOG_LEVEL` - logging level (trace, debug, info, warn, error)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(chain_id) = std::env::var("ADL_CHAIN_ID") {
            config.domain.chain_id = chain_id
                .parse()
                .map_err(|e| AdlError::ConfigError(format!("Invalid ADL_CHAIN_ID: {e}")))?;
        }
        if let Ok(addr) = std::env::var("ADL_REGISTRY_CONTRACT") {
            config.domain.registry_contract = Some(env_address("ADL_REGISTRY_CONTRACT", &addr)?);
        }
        if let Ok(addr) = std::env::var("ADL_LEDGER_CONTRACT") {
            config.domain.ledger_contract = Some(env_address("ADL_LEDGER_CONTRACT", &addr)?);
        }
        if let Ok(addr) = std::env::var("ADL_OWNER") {
            config.registry.owner = Some(env_address("ADL_OWNER", &addr)?);
        }
        if let Ok(addr) = std::env::var("ADL_ATTESTATION_AUTHORITY") {
            config.registry.attestation_authority =
                Some(env_address("ADL_ATTESTATION_AUTHORITY", &addr)?);
        }
        if let Ok(size) = std::env::var("ADL_MAX_PAGE_SIZE") {
            config.ledger.max_page_size = size
                .parse()
                .map_err(|e| AdlError::ConfigError(format!("Invalid ADL_MAX_PAGE_SIZE: {e}")))?;
        }
        if let Ok(level) = std::env::var("ADL_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.domain.chain_id == 0 {
            return Err(AdlError::ConfigError("chain_id must be non-zero".into()));
        }

        let addresses = [
            ("domain.registry_contract", self.domain.registry_contract),
            ("domain.ledger_contract", self.domain.ledger_contract),
            ("registry.owner", self.registry.owner),
            (
                "registry.attestation_authority",
                self.registry.attestation_authority,
            ),
        ];
        for (name, addr) in addresses {
            if addr.is_some_and(|a| a.is_zero()) {
                return Err(AdlError::ConfigError(format!("{name} must be non-zero")));
            }
        }
        if let (Some(registry), Some(ledger)) =
            (self.domain.registry_contract, self.domain.ledger_contract)
        {
            if registry == ledger {
                return Err(AdlError::ConfigError(
                    "registry and ledger must be deployed at distinct addresses".into(),
                ));
            }
        }

        if self.ledger.max_page_size == 0 || self.ledger.max_page_size > MAX_PAGE_SIZE_LIMIT {
            return Err(AdlError::ConfigError(format!(
                "max_page_size must be between 1 and {MAX_PAGE_SIZE_LIMIT}"
            )));
        }

        if !matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(AdlError::ConfigError(format!(
                "unknown log level {:?}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Registry address: the configured one, else the address derived from `registry.owner`.
    pub fn effective_registry_contract(&self) -> Option<Address> {
        self.domain.registry_contract.or_else(|| {
            self.registry
                .owner
                .map(|owner| derive_contract_address(&owner, REGISTRY_LABEL))
        })
    }

    /// Ledger address: the configured one, else the address derived from `registry.owner`.
    pub fn effective_ledger_contract(&self) -> Option<Address> {
        self.domain.ledger_contract.or_else(|| {
            self.registry
                .owner
                .map(|owner| derive_contract_address(&owner, LEDGER_LABEL))
        })
    }
}

fn env_address(var: &str, value: &str) -> Result<Address> {
    Address::from_hex(value).map_err(|e| AdlError::ConfigError(format!("Invalid {var}: {e}")))
}

/// Where the two components live. Both domain separators bind `chain_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    pub chain_id: u64,
    /// If unset, derived from the owner at deploy time.
    pub registry_contract: Option<Address>,
    /// If unset, derived from the owner at deploy time.
    pub ledger_contract: Option<Address>,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            registry_contract: None,
            ledger_contract: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Governance owner of both components.
    pub owner: Option<Address>,
    pub attestation_authority: Option<Address>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub max_page_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// JSON output format.
    pub json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json_output: false,
        }
    }
}

/// Builder for [`AdlConfig`].
#[derive(Default)]
pub struct AdlConfigBuilder {
    config: AdlConfig,
}

impl AdlConfigBuilder {
    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.config.domain.chain_id = chain_id;
        self
    }

    pub fn registry_contract(mut self, contract: Address) -> Self {
        self.config.domain.registry_contract = Some(contract);
        self
    }

    pub fn ledger_contract(mut self, contract: Address) -> Self {
        self.config.domain.ledger_contract = Some(contract);
        self
    }

    pub fn owner(mut self, owner: Address) -> Self {
        self.config.registry.owner = Some(owner);
        self
    }

    pub fn attestation_authority(mut self, authority: Address) -> Self {
        self.config.registry.attestation_authority = Some(authority);
        self
    }

    pub fn max_page_size(mut self, size: usize) -> Self {
        self.config.ledger.max_page_size = size;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn json_logs(mut self, enabled: bool) -> Self {
        self.config.logging.json_output = enabled;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<AdlConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
