/// TERM CLOCK
///
/// The registry never keeps time itself; it asks a clock for the current term
/// and for the randomness of a finished term.

use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;

pub trait TermClock {
    fn current_term_id(&self) -> u64;

    /// Randomness of `term`, `None` until that term has fully elapsed.
    fn term_randomness(&self, term: u64) -> Option<[u8; 32]>;
}

/// Clock advanced by hand, used by the operator tool and tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    term: u64,
    seeds: BTreeMap<u64, [u8; 32]>,
}

impl ManualClock {
    pub fn new(term: u64) -> Self {
        ManualClock { term, seeds: BTreeMap::new() }
    }

    pub fn set_term(&mut self, term: u64) {
        self.term = term;
    }

    pub fn advance(&mut self, terms: u64) {
        self.term = self.term.saturating_add(terms);
    }

    /// Fix the randomness reported for `term` once it has elapsed.
    pub fn seed(&mut self, term: u64, randomness: [u8; 32]) {
        self.seeds.insert(term, randomness);
    }
}

impl TermClock for ManualClock {
    fn current_term_id(&self) -> u64 {
        self.term
    }

    fn term_randomness(&self, term: u64) -> Option<[u8; 32]> {
        if term >= self.term {
            return None;
        }
        Some(self.seeds.get(&term).copied().unwrap_or_else(|| {
            let mut randomness = [0u8; 32];
            randomness.copy_from_slice(&Keccak256::digest(term.to_be_bytes()));
            randomness
        }))
    }
}
