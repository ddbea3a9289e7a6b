use crate::auth::Role;
use crate::custody::CustodyError;
use crate::juror::JurorAddress;
use bleep_sumtree::{ErrorKind, SumTreeError};
use primitive_types::U256;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Juror {juror} has {available} available, {amount} requested")]
    InsufficientAvailable { juror: JurorAddress, available: U256, amount: U256 },
    #[error("Active balance {balance} of juror {juror} below minimum {min}")]
    ActiveBalanceBelowMin { juror: JurorAddress, balance: U256, min: U256 },
    #[error("Activating {amount} on top of {total} exceeds the total active balance limit {limit}")]
    TotalActiveBalanceExceeded { total: U256, amount: U256, limit: U256 },
    #[error("Cannot deactivate {amount} of juror {juror}: {unlocked} unlocked active")]
    InvalidDeactivationAmount { juror: JurorAddress, unlocked: U256, amount: U256 },
    #[error("Cannot lock {amount} of juror {juror}: {unlocked} unlocked active")]
    InsufficientUnlockedActive { juror: JurorAddress, unlocked: U256, amount: U256 },
    #[error("Settlement inputs differ in length: {jurors} jurors, {amounts} amounts, {rewarded} flags")]
    LengthMismatch { jurors: usize, amounts: usize, rewarded: usize },
    #[error("Invalid draft batch: selected {selected}, batch {batch}, round {round}")]
    InvalidDraftBatch { selected: u64, batch: u64, round: u64 },
    #[error("Total active balance limit must be greater than zero")]
    InvalidActiveBalanceLimit,
    #[error("Minimum active balance change at term {from_term} must target a term after {current}")]
    InvalidMinActiveBalanceTerm { from_term: u64, current: u64 },
    #[error("Invalid registry configuration: {0}")]
    Config(String),
    #[error("Unknown juror {juror}")]
    UnknownJuror { juror: JurorAddress },
    #[error("No juror registered with id {id}")]
    UnknownJurorId { id: u64 },
    #[error("Juror {juror} has no deactivation request")]
    NoDeactivationRequest { juror: JurorAddress },
    #[error("Deactivation request available at term {available_term_id}, current term is {current}")]
    DeactivationNotMatured { available_term_id: u64, current: u64 },
    #[error("Randomness for term {term} not available yet")]
    RandomnessUnavailable { term: u64 },
    #[error("Term {term} not reached, current term is {current}")]
    TermNotReached { term: u64, current: u64 },
    #[error("Term {term} has no successor term")]
    TermOverflow { term: u64 },
    #[error("No active balance to draft from at term {term}")]
    EmptySearchInterval { term: u64 },
    #[error("Caller {address} is not authorized as {role}")]
    Unauthorized { address: JurorAddress, role: Role },
    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),
    #[error("Sum tree error: {0}")]
    Tree(#[from] SumTreeError),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::ZeroAmount
            | RegistryError::InsufficientAvailable { .. }
            | RegistryError::ActiveBalanceBelowMin { .. }
            | RegistryError::TotalActiveBalanceExceeded { .. }
            | RegistryError::InvalidDeactivationAmount { .. }
            | RegistryError::InsufficientUnlockedActive { .. }
            | RegistryError::LengthMismatch { .. }
            | RegistryError::InvalidDraftBatch { .. }
            | RegistryError::InvalidActiveBalanceLimit
            | RegistryError::InvalidMinActiveBalanceTerm { .. }
            | RegistryError::Config(_) => ErrorKind::Validation,
            RegistryError::UnknownJuror { .. }
            | RegistryError::UnknownJurorId { .. }
            | RegistryError::NoDeactivationRequest { .. }
            | RegistryError::DeactivationNotMatured { .. }
            | RegistryError::RandomnessUnavailable { .. }
            | RegistryError::TermNotReached { .. }
            | RegistryError::Custody(_) => ErrorKind::State,
            RegistryError::TermOverflow { .. } => ErrorKind::Arithmetic,
            RegistryError::EmptySearchInterval { .. } => ErrorKind::Range,
            RegistryError::Unauthorized { .. } => ErrorKind::Authorization,
            RegistryError::Tree(inner) => inner.kind(),
        }
    }
}
