use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error classes shared by the court crates.
///
/// Every concrete error maps onto exactly one class so callers can decide
/// whether a retry with different input makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Amount zero or out of range, malformed input
    Validation,
    /// Unknown key or participant, missing request, double initialization
    State,
    /// 192-bit overflow or subtraction underflow
    Arithmetic,
    /// Checkpoint written before the latest recorded time
    Ordering,
    /// Search target beyond the total, or query before the first checkpoint
    Range,
    /// Caller is not the designated owner or module
    Authorization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "VALIDATION"),
            ErrorKind::State => write!(f, "STATE"),
            ErrorKind::Arithmetic => write!(f, "ARITHMETIC"),
            ErrorKind::Ordering => write!(f, "ORDERING"),
            ErrorKind::Range => write!(f, "RANGE"),
            ErrorKind::Authorization => write!(f, "AUTHORIZATION"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SumTreeError {
    #[error("Value {value} exceeds the 192-bit capacity")]
    ValueTooBig { value: U256 },
    #[error("Arithmetic overflow adding {delta} to {value}")]
    Overflow { value: U256, delta: U256 },
    #[error("Arithmetic underflow subtracting {delta} from {value}")]
    Underflow { value: U256, delta: U256 },
    #[error("Cannot add checkpoint at time {time}, latest recorded time is {latest}")]
    PastCheckpoint { time: u64, latest: u64 },
    #[error("Tree already initialized")]
    AlreadyInitialized,
    #[error("Tree not initialized")]
    NotInitialized,
    #[error("Key {key} does not exist (next key is {next_key})")]
    KeyDoesNotExist { key: u64, next_key: u64 },
    #[error("Tree key space exhausted")]
    KeySpaceExhausted,
    #[error("Search requires at least one target")]
    MissingSearchValues,
    #[error("Search targets must be sorted in ascending order")]
    UnsortedSearchValues,
    #[error("Search target {target} out of bounds for total {total} at time {time}")]
    SearchOutOfBounds { target: U256, total: U256, time: u64 },
    #[error("No tree recorded at time {time}")]
    TimeBeforeFirstCheckpoint { time: u64 },
    #[error("Journal already open")]
    JournalAlreadyOpen,
    #[error("No journal open")]
    NoJournalOpen,
}

impl SumTreeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SumTreeError::ValueTooBig { .. }
            | SumTreeError::Overflow { .. }
            | SumTreeError::Underflow { .. } => ErrorKind::Arithmetic,
            SumTreeError::PastCheckpoint { .. } => ErrorKind::Ordering,
            SumTreeError::AlreadyInitialized
            | SumTreeError::NotInitialized
            | SumTreeError::KeyDoesNotExist { .. }
            | SumTreeError::KeySpaceExhausted
            | SumTreeError::JournalAlreadyOpen
            | SumTreeError::NoJournalOpen => ErrorKind::State,
            SumTreeError::MissingSearchValues | SumTreeError::UnsortedSearchValues => {
                ErrorKind::Validation
            }
            SumTreeError::SearchOutOfBounds { .. }
            | SumTreeError::TimeBeforeFirstCheckpoint { .. } => ErrorKind::Range,
        }
    }
}
