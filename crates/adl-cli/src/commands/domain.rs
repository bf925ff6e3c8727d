//! `adl domain` command implementation

use adl_core::domain::{PROTOCOL_NAME, PROTOCOL_VERSION};
use adl_core::{AdlConfig, DomainSeparator};
use anyhow::Result;

use super::parse_address;

pub fn run(config: &AdlConfig, chain_id: Option<u64>, contract: String) -> Result<()> {
    let chain_id = chain_id.unwrap_or(config.domain.chain_id);
    let contract = parse_address(&contract, "contract")?;
    let domain = DomainSeparator::new(chain_id, contract);

    println!("name:      {PROTOCOL_NAME}");
    println!("version:   {PROTOCOL_VERSION}");
    println!("chain id:  {}", domain.chain_id());
    println!("contract:  {}", domain.verifying_contract());
    println!("separator: {}", domain.separator());
    Ok(())
}
