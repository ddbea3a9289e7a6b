// COURT LEDGER: SORTITION TARGETS
// Deterministic cumulative-stake targets for weighted juror drafts
//
// SAFETY INVARIANTS:
// 1. Same seed, dispute, iteration and bounds always yield the same targets
// 2. Every target lies in [low, high)
// 3. Targets are returned in ascending order

use primitive_types::U256;
use sha3::{Digest, Keccak256};

/// Input of one search pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRequest {
    pub randomness: [u8; 32],
    pub dispute_id: u64,
    pub iteration: u32,
    pub count: u64,
    pub low: U256,
    pub high: U256,
}

/// Source of draft targets.
pub trait DrawTargets {
    /// `request.count` targets in `[request.low, request.high)`, ascending.
    fn targets(&self, request: &DrawRequest) -> Vec<U256>;
}

/// `low + keccak256(randomness ‖ dispute ‖ iteration ‖ index) mod (high - low)`,
/// each integer encoded as a 32-byte big-endian word.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeccakDrawTargets;

impl DrawTargets for KeccakDrawTargets {
    fn targets(&self, request: &DrawRequest) -> Vec<U256> {
        if request.high <= request.low {
            return Vec::new();
        }
        let interval = request.high - request.low;

        let mut targets: Vec<U256> = (0..request.count)
            .map(|index| {
                let mut hasher = Keccak256::new();
                hasher.update(request.randomness);
                hasher.update(word(U256::from(request.dispute_id)));
                hasher.update(word(U256::from(request.iteration)));
                hasher.update(word(U256::from(index)));
                let seed = U256::from_big_endian(&hasher.finalize());
                request.low + seed % interval
            })
            .collect();
        targets.sort_unstable();
        targets
    }
}

fn word(value: U256) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes
}

/// Cumulative-stake window of one draft batch:
/// `[selected * total / round, (selected + batch) * total / round)`.
pub fn batch_bounds(total: U256, selected: u64, batch: u64, round: u64) -> (U256, U256) {
    let round = U256::from(round.max(1));
    let low = total.saturating_mul(U256::from(selected)) / round;
    let high = total.saturating_mul(U256::from(selected.saturating_add(batch))) / round;
    (low, high)
}
