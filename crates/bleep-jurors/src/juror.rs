/// JUROR RECORDS
///
/// Per-juror balances kept next to the active-stake tree. The active balance
/// itself lives in the juror's tree leaf; the record keeps what the tree
/// cannot: the available balance, the locked reservation and the single
/// outstanding deactivation request.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque juror identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JurorAddress(String);

impl JurorAddress {
    pub fn new(address: impl Into<String>) -> Self {
        JurorAddress(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for JurorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JurorAddress {
    fn from(address: &str) -> Self {
        JurorAddress::new(address)
    }
}

impl From<String> for JurorAddress {
    fn from(address: String) -> Self {
        JurorAddress(address)
    }
}

/// Account credited by `burn_tokens`.
pub fn burn_account() -> JurorAddress {
    JurorAddress::new("0x000000000000000000000000000000000000dead")
}

/// Stake scheduled to leave the active pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivationRequest {
    pub amount: U256,
    /// First term at which the amount can be folded back into `available`.
    pub available_term_id: u64,
}

impl DeactivationRequest {
    pub fn is_matured(&self, term: u64) -> bool {
        term >= self.available_term_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurorRecord {
    /// Tree leaf, assigned on first activation.
    pub id: Option<u64>,
    pub available: U256,
    /// Reserved part of the active balance, at most the leaf's latest value.
    pub locked: U256,
    pub deactivation_request: Option<DeactivationRequest>,
}

impl JurorRecord {
    pub fn pending_deactivation(&self) -> U256 {
        self.deactivation_request
            .map(|request| request.amount)
            .unwrap_or_else(U256::zero)
    }

    /// Requested amount leaving exactly at `term`.
    pub fn deactivation_for_term(&self, term: u64) -> U256 {
        match self.deactivation_request {
            Some(request) if request.available_term_id == term => request.amount,
            _ => U256::zero(),
        }
    }
}

/// Balance breakdown reported by `balance_of`.
///
/// `active + available + locked + pending_deactivation` always equals the
/// juror's total stake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// Unlocked active balance.
    pub active: U256,
    pub available: U256,
    pub locked: U256,
    pub pending_deactivation: U256,
}

impl Balances {
    pub fn total(&self) -> U256 {
        self.active + self.available + self.locked + self.pending_deactivation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deactivation_for_term_matches_exact_term() {
        let record = JurorRecord {
            deactivation_request: Some(DeactivationRequest {
                amount: U256::from(40u64),
                available_term_id: 4,
            }),
            ..JurorRecord::default()
        };
        assert_eq!(record.deactivation_for_term(4), U256::from(40u64));
        assert_eq!(record.deactivation_for_term(5), U256::zero());
        assert_eq!(record.pending_deactivation(), U256::from(40u64));
        assert!(record.deactivation_request.unwrap().is_matured(4));
        assert!(!record.deactivation_request.unwrap().is_matured(3));
    }

    #[test]
    fn test_address_serializes_as_plain_string() {
        let address = JurorAddress::from("0xabc");
        assert_eq!(bincode::serialize(&address).unwrap(), bincode::serialize("0xabc").unwrap());
        assert!(JurorAddress::new("  ").is_empty());
    }
}
