/// TOKEN CUSTODY
///
/// Moves juror tokens between juror wallets and the registry vault. The
/// registry calls custody as the last step of an operation, so a refused
/// transfer rolls the whole operation back.

use crate::juror::JurorAddress;
use log::debug;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("Wallet {address} holds {balance}, cannot transfer {amount}")]
    InsufficientFunds { address: JurorAddress, balance: U256, amount: U256 },
    #[error("Vault holds {balance}, cannot release {amount}")]
    InsufficientVault { balance: U256, amount: U256 },
    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

pub trait Custody {
    /// Pull `amount` from `from` into the registry vault.
    fn transfer_in(&mut self, from: &JurorAddress, amount: U256) -> Result<(), CustodyError>;

    /// Release `amount` from the registry vault to `to`.
    fn transfer_out(&mut self, to: &JurorAddress, amount: U256) -> Result<(), CustodyError>;
}

/// Wallet balances and the vault held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryCustody {
    wallets: BTreeMap<JurorAddress, U256>,
    vault: U256,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint `amount` into a wallet.
    pub fn fund(&mut self, address: &JurorAddress, amount: U256) -> Result<(), CustodyError> {
        let balance = self.balance_of(address);
        let funded = balance
            .checked_add(amount)
            .ok_or_else(|| CustodyError::Rejected(format!("wallet {} overflow", address)))?;
        self.wallets.insert(address.clone(), funded);
        Ok(())
    }

    pub fn balance_of(&self, address: &JurorAddress) -> U256 {
        self.wallets.get(address).copied().unwrap_or_else(U256::zero)
    }

    pub fn vault(&self) -> U256 {
        self.vault
    }
}

impl Custody for InMemoryCustody {
    fn transfer_in(&mut self, from: &JurorAddress, amount: U256) -> Result<(), CustodyError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(CustodyError::InsufficientFunds {
                address: from.clone(),
                balance,
                amount,
            });
        }
        let vault = self
            .vault
            .checked_add(amount)
            .ok_or_else(|| CustodyError::Rejected("vault overflow".into()))?;

        self.wallets.insert(from.clone(), balance - amount);
        self.vault = vault;
        debug!("Custody received {} from {}", amount, from);
        Ok(())
    }

    fn transfer_out(&mut self, to: &JurorAddress, amount: U256) -> Result<(), CustodyError> {
        if self.vault < amount {
            return Err(CustodyError::InsufficientVault { balance: self.vault, amount });
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| CustodyError::Rejected(format!("wallet {} overflow", to)))?;

        self.vault -= amount;
        self.wallets.insert(to.clone(), credited);
        debug!("Custody released {} to {}", amount, to);
        Ok(())
    }
}
