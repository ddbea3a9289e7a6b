// COURT LEDGER: JURORS REGISTRY
// Staking, activation and deactivation over a checkpointed active-stake tree
//
// SAFETY INVARIANTS:
// 1. available + active + locked + pending deactivation == total stake of a juror
// 2. Activation and deactivation take effect at the next term, never retroactively
// 3. Every operation commits all of its changes or none
// 4. The caller's role is checked before any state is read or written
// 5. Custody transfers run last, after every ledger change has succeeded

use crate::auth::{Caller, Role};
use crate::clock::TermClock;
use crate::config::RegistryConfig;
use crate::custody::Custody;
use crate::error::RegistryError;
use crate::juror::{Balances, DeactivationRequest, JurorAddress, JurorRecord};
use crate::sortition::{DrawTargets, KeccakDrawTargets};
use crate::state::LedgerState;
use bleep_sumtree::{checked_add, checked_sub};
use log::{info, warn};
use primitive_types::U256;

pub struct JurorsRegistry<C, K, D = KeccakDrawTargets> {
    pub(crate) config: RegistryConfig,
    pub(crate) state: LedgerState,
    pub(crate) clock: C,
    pub(crate) custody: K,
    pub(crate) draw_targets: D,
}

impl<C: TermClock, K: Custody> JurorsRegistry<C, K, KeccakDrawTargets> {
    pub fn new(config: RegistryConfig, clock: C, custody: K) -> Result<Self, RegistryError> {
        config.validate()?;
        let state = LedgerState::genesis(&config)?;
        Ok(Self::with_state(config, state, clock, custody))
    }

    /// Resume from a stored ledger.
    pub fn with_state(config: RegistryConfig, state: LedgerState, clock: C, custody: K) -> Self {
        JurorsRegistry {
            config,
            state,
            clock,
            custody,
            draw_targets: KeccakDrawTargets,
        }
    }
}

impl<C: TermClock, K: Custody, D: DrawTargets> JurorsRegistry<C, K, D> {
    pub fn with_draw_targets<E: DrawTargets>(self, draw_targets: E) -> JurorsRegistry<C, K, E> {
        JurorsRegistry {
            config: self.config,
            state: self.state,
            clock: self.clock,
            custody: self.custody,
            draw_targets,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn custody(&self) -> &K {
        &self.custody
    }

    pub fn custody_mut(&mut self) -> &mut K {
        &mut self.custody
    }

    pub fn into_parts(self) -> (LedgerState, C, K) {
        (self.state, self.clock, self.custody)
    }

    // ---------------------------------------------------------------------
    // Juror operations
    // ---------------------------------------------------------------------

    pub fn stake(&mut self, caller: &Caller, amount: U256) -> Result<(), RegistryError> {
        let juror = caller.address.clone();
        self.stake_for(caller, &juror, amount)
    }

    /// Stake `amount` from the caller's wallet into `juror`'s available balance.
    pub fn stake_for(
        &mut self,
        caller: &Caller,
        juror: &JurorAddress,
        amount: U256,
    ) -> Result<(), RegistryError> {
        self.authorize(caller, Role::Juror)?;
        let from = caller.address.clone();
        self.atomically(|reg| {
            reg.stake_into(juror, amount)?;
            reg.custody.transfer_in(&from, amount)?;
            info!("Juror {} staked {} (paid by {})", juror, amount, from);
            Ok(())
        })
    }

    pub fn stake_and_activate(&mut self, caller: &Caller, amount: U256) -> Result<(), RegistryError> {
        self.authorize(caller, Role::Juror)?;
        let juror = caller.address.clone();
        self.atomically(|reg| {
            reg.stake_into(&juror, amount)?;
            reg.activate_tokens(&juror, amount)?;
            reg.custody.transfer_in(&juror, amount)?;
            info!("Juror {} staked and activated {}", juror, amount);
            Ok(())
        })
    }

    /// Withdraw `amount` of available balance back to the caller's wallet.
    pub fn unstake(&mut self, caller: &Caller, amount: U256) -> Result<(), RegistryError> {
        self.authorize(caller, Role::Juror)?;
        let juror = caller.address.clone();
        self.atomically(|reg| {
            if amount.is_zero() {
                return Err(RegistryError::ZeroAmount);
            }
            let term = reg.clock.current_term_id();
            let mut record = reg.state.record_or_default(&juror);
            fold_matured_deactivation(&mut record, term)?;
            if record.available < amount {
                return Err(RegistryError::InsufficientAvailable {
                    juror: juror.clone(),
                    available: record.available,
                    amount,
                });
            }
            record.available -= amount;
            reg.state.put_record(&juror, record);
            reg.custody.transfer_out(&juror, amount)?;
            info!("Juror {} unstaked {}", juror, amount);
            Ok(())
        })
    }

    /// Move `amount` (everything available when zero) into the active pool from the next term.
    pub fn activate(&mut self, caller: &Caller, amount: U256) -> Result<(), RegistryError> {
        self.authorize(caller, Role::Juror)?;
        let juror = caller.address.clone();
        self.atomically(|reg| {
            let term = reg.clock.current_term_id();
            let mut record = reg.state.record_or_default(&juror);
            fold_matured_deactivation(&mut record, term)?;
            reg.state.put_record(&juror, record.clone());

            let amount = if amount.is_zero() { record.available } else { amount };
            reg.activate_tokens(&juror, amount)
        })
    }

    /// Schedule `amount` (all unlocked active stake when zero) to leave the
    /// active pool at the next term.
    pub fn deactivate(&mut self, caller: &Caller, amount: U256) -> Result<(), RegistryError> {
        self.authorize(caller, Role::Juror)?;
        let juror = caller.address.clone();
        self.atomically(|reg| {
            let term = reg.clock.current_term_id();
            let mut record = reg
                .state
                .record(&juror)
                .cloned()
                .ok_or_else(|| RegistryError::UnknownJuror { juror: juror.clone() })?;

            let unlocked = reg.state.unlocked_active(&record);
            let amount = if amount.is_zero() { unlocked } else { amount };
            if amount.is_zero() {
                return Err(RegistryError::ZeroAmount);
            }
            if amount > unlocked {
                return Err(RegistryError::InvalidDeactivationAmount {
                    juror: juror.clone(),
                    unlocked,
                    amount,
                });
            }
            let remaining = unlocked - amount;
            let min = reg.state.min_active_balance_at(term);
            if !remaining.is_zero() && remaining < min {
                return Err(RegistryError::ActiveBalanceBelowMin {
                    juror: juror.clone(),
                    balance: remaining,
                    min,
                });
            }

            fold_matured_deactivation(&mut record, term)?;
            let next_term = reg.next_term()?;
            let pending = record.pending_deactivation();
            record.deactivation_request = Some(DeactivationRequest {
                amount: checked_add(pending, amount)?,
                available_term_id: next_term,
            });
            if let Some(id) = record.id {
                reg.state.tree.update(id, next_term, amount, false)?;
            }
            reg.state.put_record(&juror, record);
            info!("Juror {} deactivating {} from term {}", juror, amount, next_term);
            Ok(())
        })
    }

    /// Fold a matured deactivation request into the juror's available balance.
    /// Anyone may trigger it: it only moves the juror's own matured stake.
    pub fn process_deactivation_request(&mut self, juror: &JurorAddress) -> Result<U256, RegistryError> {
        self.atomically(|reg| {
            let term = reg.clock.current_term_id();
            let mut record = reg.state.record_or_default(juror);
            let request = record
                .deactivation_request
                .ok_or_else(|| RegistryError::NoDeactivationRequest { juror: juror.clone() })?;
            if !request.is_matured(term) {
                return Err(RegistryError::DeactivationNotMatured {
                    available_term_id: request.available_term_id,
                    current: term,
                });
            }
            let folded = fold_matured_deactivation(&mut record, term)?;
            reg.state.put_record(juror, record);
            Ok(folded)
        })
    }

    // ---------------------------------------------------------------------
    // Governance
    // ---------------------------------------------------------------------

    pub fn set_total_active_balance_limit(&mut self, caller: &Caller, limit: U256) -> Result<(), RegistryError> {
        self.authorize(caller, Role::Governor)?;
        self.atomically(|reg| {
            if limit.is_zero() {
                return Err(RegistryError::InvalidActiveBalanceLimit);
            }
            bleep_sumtree::ensure_fits(limit)?;
            reg.state.set_total_active_balance_limit(limit);
            info!("Total active balance limit set to {}", limit);
            Ok(())
        })
    }

    /// Change the minimum active balance from `from_term` on. Past and current
    /// terms keep their minimum.
    pub fn set_min_active_balance(
        &mut self,
        caller: &Caller,
        from_term: u64,
        amount: U256,
    ) -> Result<(), RegistryError> {
        self.authorize(caller, Role::Governor)?;
        self.atomically(|reg| {
            let current = reg.clock.current_term_id();
            if from_term <= current {
                return Err(RegistryError::InvalidMinActiveBalanceTerm { from_term, current });
            }
            reg.state.set_min_active_balance(from_term, amount)?;
            info!("Minimum active balance set to {} from term {}", amount, from_term);
            Ok(())
        })
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn balance_of(&self, juror: &JurorAddress) -> Balances {
        let record = self.state.record_or_default(juror);
        Balances {
            active: self.state.unlocked_active(&record),
            available: record.available,
            locked: record.locked,
            pending_deactivation: record.pending_deactivation(),
        }
    }

    /// Full leaf value (sortition weight) of `juror` at `term`.
    pub fn active_balance_at(&self, juror: &JurorAddress, term: u64) -> U256 {
        self.state
            .record(juror)
            .map(|record| self.state.leaf_at(record, term))
            .unwrap_or_else(U256::zero)
    }

    pub fn unlocked_active_balance_of(&self, juror: &JurorAddress) -> U256 {
        self.state
            .record(juror)
            .map(|record| self.state.unlocked_active(record))
            .unwrap_or_else(U256::zero)
    }

    pub fn total_staked_for(&self, juror: &JurorAddress) -> U256 {
        self.state
            .record(juror)
            .map(|record| self.staked(record))
            .unwrap_or_else(U256::zero)
    }

    /// Stake held for all jurors, including the burn account.
    pub fn total_staked(&self) -> U256 {
        self.state
            .jurors()
            .fold(U256::zero(), |total, (_, record)| total.saturating_add(self.staked(record)))
    }

    pub fn total_active_balance(&self) -> U256 {
        self.state.tree.total()
    }

    pub fn total_active_balance_at(&self, term: u64) -> U256 {
        self.state.tree.total_at(term)
    }

    pub fn total_active_balance_limit(&self) -> U256 {
        self.state.total_active_balance_limit()
    }

    pub fn min_active_balance_at(&self, term: u64) -> U256 {
        self.state.min_active_balance_at(term)
    }

    pub fn deactivation_request(&self, juror: &JurorAddress) -> Option<DeactivationRequest> {
        self.state.record(juror).and_then(|record| record.deactivation_request)
    }

    pub fn juror_id(&self, juror: &JurorAddress) -> Option<u64> {
        self.state.record(juror).and_then(|record| record.id)
    }

    pub fn juror_by_id(&self, id: u64) -> Option<&JurorAddress> {
        self.state.address_of(id)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    pub(crate) fn authorize(&self, caller: &Caller, role: Role) -> Result<(), RegistryError> {
        let allowed = caller.role == role
            && match role {
                Role::Juror => !caller.address.is_empty(),
                Role::Court => caller.address == self.config.court,
                Role::Governor => caller.address == self.config.governor,
            };
        if !allowed {
            warn!("Rejected {} call from {} claiming {}", role, caller.address, caller.role);
            return Err(RegistryError::Unauthorized { address: caller.address.clone(), role });
        }
        Ok(())
    }

    /// The term at which stake changes made now take effect.
    pub(crate) fn next_term(&self) -> Result<u64, RegistryError> {
        let term = self.clock.current_term_id();
        term.checked_add(1).ok_or(RegistryError::TermOverflow { term })
    }

    /// Run `op` as one unit: every change is kept on success and undone on error.
    pub(crate) fn atomically<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        self.state.begin()?;
        match op(self) {
            Ok(value) => {
                self.state.commit()?;
                Ok(value)
            }
            Err(err) => {
                self.state.rollback()?;
                warn!("Registry operation rolled back: {}", err);
                Err(err)
            }
        }
    }

    fn staked(&self, record: &JurorRecord) -> U256 {
        record
            .available
            .saturating_add(self.state.leaf(record))
            .saturating_add(record.pending_deactivation())
    }

    fn stake_into(&mut self, juror: &JurorAddress, amount: U256) -> Result<(), RegistryError> {
        if amount.is_zero() {
            return Err(RegistryError::ZeroAmount);
        }
        let term = self.clock.current_term_id();
        let mut record = self.state.record_or_default(juror);
        fold_matured_deactivation(&mut record, term)?;
        record.available = checked_add(record.available, amount)?;
        self.state.put_record(juror, record);
        Ok(())
    }

    fn activate_tokens(&mut self, juror: &JurorAddress, amount: U256) -> Result<(), RegistryError> {
        if amount.is_zero() {
            return Err(RegistryError::ZeroAmount);
        }
        let mut record = self.state.record_or_default(juror);
        if record.available < amount {
            return Err(RegistryError::InsufficientAvailable {
                juror: juror.clone(),
                available: record.available,
                amount,
            });
        }

        let next_term = self.next_term()?;
        let total = self.state.tree.total_at(next_term);
        let limit = self.state.total_active_balance_limit();
        if checked_add(total, amount)? > limit {
            return Err(RegistryError::TotalActiveBalanceExceeded { total, amount, limit });
        }

        let min = self.state.min_active_balance_at(next_term);
        let balance = checked_add(self.state.leaf(&record), amount)?;
        if balance < min {
            return Err(RegistryError::ActiveBalanceBelowMin { juror: juror.clone(), balance, min });
        }

        match record.id {
            Some(id) => self.state.tree.update(id, next_term, amount, true)?,
            None => {
                let id = self.state.tree.insert(next_term, amount)?;
                record.id = Some(id);
                self.state.register_id(id, juror);
            }
        }
        record.available = checked_sub(record.available, amount)?;
        self.state.put_record(juror, record);
        info!("Juror {} activated {} from term {}", juror, amount, next_term);
        Ok(())
    }
}

/// Move a matured request's amount into `available`. Returns the folded amount.
pub(crate) fn fold_matured_deactivation(record: &mut JurorRecord, term: u64) -> Result<U256, RegistryError> {
    match record.deactivation_request {
        Some(request) if request.is_matured(term) => {
            record.available = checked_add(record.available, request.amount)?;
            record.deactivation_request = None;
            Ok(request.amount)
        }
        _ => Ok(U256::zero()),
    }
}
