//! Governance shell shared by the registry and the ledger.
//!
//! Ownership gates who may change the allowlist, swap the trusted verifier, or move a
//! component to a new contract address. It sits outside the cryptographic core: nothing here
//! touches signatures or stored decisions.

use crate::events::Event;
use crate::{AdlError, Address, Result};
use tracing::warn;

/// Single-owner access control.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ownable {
    owner: Address,
}

impl Ownable {
    pub fn new(owner: Address) -> Result<Self> {
        if owner.is_zero() {
            return Err(AdlError::ZeroAddress("owner"));
        }
        Ok(Self { owner })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn ensure_owner(&self, caller: Address) -> Result<()> {
        if caller != self.owner {
            warn!(caller = %caller, "Rejected governance call from non-owner");
            return Err(AdlError::NotOwner { caller });
        }
        Ok(())
    }

    /// Validate a transfer without applying it.
    pub fn check_transfer(&self, caller: Address, new_owner: Address) -> Result<Event> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(AdlError::ZeroAddress("new owner"));
        }
        Ok(Event::OwnershipTransferred {
            previous: self.owner,
            current: new_owner,
        })
    }

    /// Apply a transfer previously validated by [`Ownable::check_transfer`].
    pub(crate) fn apply_transfer(&mut self, new_owner: Address) {
        self.owner = new_owner;
    }
}
