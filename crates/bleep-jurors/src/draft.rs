// COURT LEDGER: JUROR DRAFTS
// Stake-weighted juror selection over the active-stake tree at a past term
//
// SAFETY INVARIANTS:
// 1. A draft reads tree values at its term only, so it is reproducible later
// 2. A drafted juror's locked balance never exceeds their active stake, now or next term
// 3. The number of search passes is capped by `max_draft_iterations`
// 4. Draws are aggregated per juror in first-drawn order

use crate::auth::{Caller, Role};
use crate::clock::TermClock;
use crate::custody::Custody;
use crate::error::RegistryError;
use crate::juror::{JurorAddress, JurorRecord};
use crate::registry::JurorsRegistry;
use crate::sortition::{batch_bounds, DrawRequest, DrawTargets};
use bleep_sumtree::{checked_add, checked_sub};
use log::{debug, info};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One draft batch of a dispute round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftParams {
    pub term_randomness: [u8; 32],
    pub dispute_id: u64,
    pub term_id: u64,
    /// Draws already filled for the round
    pub selected_draws: u64,
    /// Draws requested by this batch
    pub batch_draws: u64,
    /// Draws of the whole round
    pub round_draws: u64,
    /// Amount locked per accepted draw
    pub lock_per_draw: U256,
}

impl DraftParams {
    /// A round drafted in a single batch.
    pub fn single_batch(term_randomness: [u8; 32], term_id: u64, draw_count: u64, min_weight_per_draw: U256) -> Self {
        DraftParams {
            term_randomness,
            dispute_id: 0,
            term_id,
            selected_draws: 0,
            batch_draws: draw_count,
            round_draws: draw_count,
            lock_per_draw: min_weight_per_draw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftedJuror {
    pub juror: JurorAddress,
    /// Accepted draws that landed on this juror
    pub weight: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftResult {
    pub jurors: Vec<DraftedJuror>,
    /// Accepted draws, at most the batch size
    pub filled: u64,
    /// Search passes used
    pub iterations: u32,
}

impl DraftResult {
    fn push(&mut self, juror: &JurorAddress, index: &mut BTreeMap<JurorAddress, usize>) {
        match index.get(juror) {
            Some(position) => self.jurors[*position].weight += 1,
            None => {
                index.insert(juror.clone(), self.jurors.len());
                self.jurors.push(DraftedJuror { juror: juror.clone(), weight: 1 });
            }
        }
        self.filled += 1;
    }
}

impl<C: TermClock, K: Custody, D: DrawTargets> JurorsRegistry<C, K, D> {
    /// Draft jurors for `params.term_id`, locking `lock_per_draw` per accepted draw.
    ///
    /// Jurors whose stake at the term cannot cover one more lock are skipped
    /// and the batch is redrawn with a fresh iteration seed, up to
    /// `max_draft_iterations` passes. The result may therefore hold fewer
    /// draws than requested; the court asks for the remainder in a later batch.
    pub fn draft(&mut self, caller: &Caller, params: &DraftParams) -> Result<DraftResult, RegistryError> {
        self.authorize(caller, Role::Court)?;
        self.atomically(|reg| reg.draft_batch(params))
    }

    fn draft_batch(&mut self, params: &DraftParams) -> Result<DraftResult, RegistryError> {
        let DraftParams { term_id: term, selected_draws, batch_draws, round_draws, .. } = *params;
        if batch_draws == 0 || round_draws == 0 || selected_draws.saturating_add(batch_draws) > round_draws {
            return Err(RegistryError::InvalidDraftBatch {
                selected: selected_draws,
                batch: batch_draws,
                round: round_draws,
            });
        }

        let current = self.clock.current_term_id();
        if term > current {
            return Err(RegistryError::TermNotReached { term, current });
        }
        if self.clock.term_randomness(term).is_none() {
            return Err(RegistryError::RandomnessUnavailable { term });
        }

        let total = self.state.tree.total_at(term);
        let (low, high) = batch_bounds(total, selected_draws, batch_draws, round_draws);
        if high <= low {
            return Err(RegistryError::EmptySearchInterval { term });
        }

        let next_term = self.next_term()?;
        let mut result = DraftResult::default();
        let mut index = BTreeMap::new();

        while result.filled < batch_draws && result.iterations < self.config.max_draft_iterations {
            let request = DrawRequest {
                randomness: params.term_randomness,
                dispute_id: params.dispute_id,
                iteration: result.iterations,
                count: batch_draws,
                low,
                high,
            };
            let mut targets = self.draw_targets.targets(&request);
            targets.sort_unstable();
            result.iterations += 1;
            if targets.is_empty() {
                continue;
            }

            let found = self.state.tree.search(&targets, term)?;
            for (id, active_at_term) in found.iter() {
                if result.filled >= batch_draws {
                    break;
                }
                let juror = self
                    .state
                    .address_of(id)
                    .cloned()
                    .ok_or(RegistryError::UnknownJurorId { id })?;
                if self.lock_for_draft(&juror, active_at_term, params.lock_per_draw, next_term)? {
                    result.push(&juror, &mut index);
                }
            }
            debug!(
                "Draft pass {} for term {} filled {}/{}",
                result.iterations, term, result.filled, batch_draws
            );
        }

        info!(
            "Drafted {}/{} draws for dispute {} at term {} in {} passes",
            result.filled, batch_draws, params.dispute_id, term, result.iterations
        );
        Ok(result)
    }

    /// Lock one draw for `juror` if their stake covers it. Returns whether the draw is accepted.
    fn lock_for_draft(
        &mut self,
        juror: &JurorAddress,
        active_at_term: U256,
        lock: U256,
        next_term: u64,
    ) -> Result<bool, RegistryError> {
        let mut record = self.state.record_or_default(juror);
        let new_locked = checked_add(record.locked, lock)?;
        if active_at_term < new_locked {
            return Ok(false);
        }

        let next_active = self.state.leaf(&record);
        if next_active < new_locked {
            let shortfall = new_locked - next_active;
            if record.deactivation_for_term(next_term) < shortfall {
                return Ok(false);
            }
            reduce_deactivation(self, juror, &mut record, shortfall, next_term)?;
        }

        record.locked = new_locked;
        self.state.put_record(juror, record);
        Ok(true)
    }
}

/// Return `amount` of the request maturing at `next_term` to the active pool.
pub(crate) fn reduce_deactivation<C, K, D>(
    reg: &mut JurorsRegistry<C, K, D>,
    juror: &JurorAddress,
    record: &mut JurorRecord,
    amount: U256,
    next_term: u64,
) -> Result<(), RegistryError> {
    let mut request = match record.deactivation_request {
        Some(request) if request.available_term_id == next_term => request,
        _ => return Err(RegistryError::NoDeactivationRequest { juror: juror.clone() }),
    };
    request.amount = checked_sub(request.amount, amount)?;
    record.deactivation_request = if request.amount.is_zero() { None } else { Some(request) };

    if let Some(id) = record.id {
        reg.state.tree.update(id, next_term, amount, true)?;
    }
    debug!("Deactivation request of {} reduced by {} at term {}", juror, amount, next_term);
    Ok(())
}
