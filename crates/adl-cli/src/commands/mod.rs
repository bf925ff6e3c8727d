//! CLI Command Implementations

pub mod demo;
pub mod domain;
pub mod keys;
pub mod sign;

use adl_core::{AdlConfig, Address};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Load config from file, falling back to `ADL_*` environment variables.
///
/// Without `--config`, `<config_dir>/adl/config.json` is used when it exists.
pub fn load_config(path: Option<PathBuf>) -> Result<AdlConfig> {
    let explicit = path.is_some();
    let path = path.unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("adl")
            .join("config.json")
    });

    if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        return AdlConfig::from_json(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()));
    }
    if explicit {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    AdlConfig::from_env().context("Invalid ADL_* environment configuration")
}

pub(crate) fn parse_address(value: &str, what: &str) -> Result<Address> {
    Address::from_hex(value).with_context(|| format!("Invalid {what} address"))
}

/// Explicit flag first, then the configured address, then the one derived from the owner.
pub(crate) fn resolve_contract(
    flag: Option<String>,
    effective: Option<Address>,
    what: &str,
) -> Result<Address> {
    match (flag, effective) {
        (Some(hex), _) => parse_address(&hex, what),
        (None, Some(addr)) => Ok(addr),
        (None, None) => anyhow::bail!(
            "No {what} address given; configure domain.{what}_contract or registry.owner"
        ),
    }
}
