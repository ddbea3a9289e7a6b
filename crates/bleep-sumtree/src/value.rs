//! Checked 192-bit arithmetic over `U256`.
//!
//! Stored values never exceed `MAX_UINT192`; every helper here either returns
//! a value inside that range or an arithmetic error.

use crate::error::SumTreeError;
use primitive_types::U256;

/// Largest value a checkpoint can hold (2^192 - 1).
pub const MAX_UINT192: U256 = U256([u64::MAX, u64::MAX, u64::MAX, 0]);

pub fn ensure_fits(value: U256) -> Result<U256, SumTreeError> {
    if value > MAX_UINT192 {
        return Err(SumTreeError::ValueTooBig { value });
    }
    Ok(value)
}

pub fn checked_add(value: U256, delta: U256) -> Result<U256, SumTreeError> {
    value
        .checked_add(delta)
        .filter(|sum| *sum <= MAX_UINT192)
        .ok_or(SumTreeError::Overflow { value, delta })
}

pub fn checked_sub(value: U256, delta: U256) -> Result<U256, SumTreeError> {
    value
        .checked_sub(delta)
        .ok_or(SumTreeError::Underflow { value, delta })
}
