use crate::juror::JurorAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability a caller claims for a registry call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Acts on its own balances
    Juror,
    /// The dispute module: drafts, locks and settles
    Court,
    /// Adjusts registry parameters
    Governor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Juror => write!(f, "JUROR"),
            Role::Court => write!(f, "COURT"),
            Role::Governor => write!(f, "GOVERNOR"),
        }
    }
}

/// Identity plus claimed role, checked before every mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub address: JurorAddress,
    pub role: Role,
}

impl Caller {
    pub fn juror(address: impl Into<JurorAddress>) -> Self {
        Caller { address: address.into(), role: Role::Juror }
    }

    pub fn court(address: impl Into<JurorAddress>) -> Self {
        Caller { address: address.into(), role: Role::Court }
    }

    pub fn governor(address: impl Into<JurorAddress>) -> Self {
        Caller { address: address.into(), role: Role::Governor }
    }
}
