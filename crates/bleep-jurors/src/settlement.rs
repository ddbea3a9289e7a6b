/// ROUND SETTLEMENT
///
/// Court-side balance changes once a round is decided: releasing or slashing
/// locked stake, collecting penalties from unlocked stake, and crediting
/// rewards or burns from the collected pool. Slashed and collected stake
/// stays in the vault until the court assigns or burns it.

use crate::auth::{Caller, Role};
use crate::clock::TermClock;
use crate::custody::Custody;
use crate::draft::reduce_deactivation;
use crate::error::RegistryError;
use crate::juror::{burn_account, JurorAddress, JurorRecord};
use crate::registry::JurorsRegistry;
use crate::sortition::DrawTargets;
use bleep_sumtree::{checked_add, checked_sub};
use log::{debug, info};
use primitive_types::U256;

impl<C: TermClock, K: Custody, D: DrawTargets> JurorsRegistry<C, K, D> {
    /// Reserve `amount` of a juror's unlocked active stake.
    pub fn lock(&mut self, caller: &Caller, juror: &JurorAddress, amount: U256) -> Result<(), RegistryError> {
        self.authorize(caller, Role::Court)?;
        self.atomically(|reg| {
            if amount.is_zero() {
                return Err(RegistryError::ZeroAmount);
            }
            let mut record = reg.known_record(juror)?;
            let unlocked = reg.state.unlocked_active(&record);
            if amount > unlocked {
                return Err(RegistryError::InsufficientUnlockedActive {
                    juror: juror.clone(),
                    unlocked,
                    amount,
                });
            }
            record.locked = checked_add(record.locked, amount)?;
            reg.state.put_record(juror, record);
            debug!("Locked {} of juror {}", amount, juror);
            Ok(())
        })
    }

    pub fn unlock(&mut self, caller: &Caller, juror: &JurorAddress, amount: U256) -> Result<(), RegistryError> {
        self.authorize(caller, Role::Court)?;
        self.atomically(|reg| {
            let mut record = reg.known_record(juror)?;
            record.locked = checked_sub(record.locked, amount)?;
            reg.state.put_record(juror, record);
            debug!("Unlocked {} of juror {}", amount, juror);
            Ok(())
        })
    }

    /// Settle a round's locks: rewarded jurors get their lock released,
    /// the others lose it from the active pool from the next term on.
    /// Returns the total slashed.
    pub fn slash_or_unlock(
        &mut self,
        caller: &Caller,
        jurors: &[JurorAddress],
        locked_amounts: &[U256],
        rewarded: &[bool],
    ) -> Result<U256, RegistryError> {
        self.authorize(caller, Role::Court)?;
        if jurors.len() != locked_amounts.len() || jurors.len() != rewarded.len() {
            return Err(RegistryError::LengthMismatch {
                jurors: jurors.len(),
                amounts: locked_amounts.len(),
                rewarded: rewarded.len(),
            });
        }

        self.atomically(|reg| {
            let next_term = reg.next_term()?;
            let mut collected = U256::zero();

            for ((juror, amount), rewarded) in jurors.iter().zip(locked_amounts).zip(rewarded) {
                let mut record = reg.known_record(juror)?;
                record.locked = checked_sub(record.locked, *amount)?;

                if !rewarded && !amount.is_zero() {
                    reg.take_active(juror, &mut record, *amount, next_term)?;
                    collected = checked_add(collected, *amount)?;
                }
                reg.state.put_record(juror, record);
            }

            info!("Settled {} jurors, slashed {} from term {}", jurors.len(), collected, next_term);
            Ok(collected)
        })
    }

    /// Take `amount` from a juror's unlocked active stake, falling back to the
    /// deactivation request leaving at the next term. Returns `false`,
    /// changing nothing, when both together cannot cover it.
    pub fn collect(&mut self, caller: &Caller, juror: &JurorAddress, amount: U256) -> Result<bool, RegistryError> {
        self.authorize(caller, Role::Court)?;
        if amount.is_zero() {
            return Ok(true);
        }

        self.atomically(|reg| {
            let next_term = reg.next_term()?;
            let mut record = reg.state.record_or_default(juror);
            let unlocked = reg.state.unlocked_active(&record);
            let pending = record.deactivation_for_term(next_term);
            if amount > unlocked.saturating_add(pending) {
                debug!("Cannot collect {} from juror {}", amount, juror);
                return Ok(false);
            }

            if amount > unlocked {
                reduce_deactivation(reg, juror, &mut record, amount - unlocked, next_term)?;
            }
            if let Some(id) = record.id {
                reg.state.tree.update(id, next_term, amount, false)?;
            }
            reg.state.put_record(juror, record);
            info!("Collected {} from juror {} at term {}", amount, juror, next_term);
            Ok(true)
        })
    }

    /// Credit `amount` of already-held tokens to a juror's available balance.
    pub fn assign_tokens(&mut self, caller: &Caller, juror: &JurorAddress, amount: U256) -> Result<(), RegistryError> {
        self.authorize(caller, Role::Court)?;
        if amount.is_zero() {
            return Ok(());
        }
        self.atomically(|reg| {
            let mut record = reg.state.record_or_default(juror);
            record.available = checked_add(record.available, amount)?;
            reg.state.put_record(juror, record);
            info!("Assigned {} to juror {}", amount, juror);
            Ok(())
        })
    }

    pub fn burn_tokens(&mut self, caller: &Caller, amount: U256) -> Result<(), RegistryError> {
        let burn = burn_account();
        self.assign_tokens(caller, &burn, amount)
    }

    fn known_record(&self, juror: &JurorAddress) -> Result<JurorRecord, RegistryError> {
        self.state
            .record(juror)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownJuror { juror: juror.clone() })
    }

    /// Remove `amount` from the juror's leaf at `next_term`. When the leaf
    /// cannot cover it, the shortfall comes out of the deactivation request
    /// leaving at `next_term`.
    fn take_active(
        &mut self,
        juror: &JurorAddress,
        record: &mut JurorRecord,
        amount: U256,
        next_term: u64,
    ) -> Result<(), RegistryError> {
        let id = record
            .id
            .ok_or_else(|| RegistryError::UnknownJuror { juror: juror.clone() })?;
        let leaf = self.state.tree.item(id);
        if leaf < amount {
            let shortfall = amount - leaf;
            if record.deactivation_for_term(next_term) < shortfall {
                checked_sub(leaf, amount)?;
            }
            reduce_deactivation(self, juror, record, shortfall, next_term)?;
        }
        self.state.tree.update(id, next_term, amount, false)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RegistryConfig;
    use crate::custody::InMemoryCustody;
    use bleep_sumtree::ErrorKind;

    fn v(n: u64) -> U256 {
        U256::from(n)
    }

    /// Alice active with 1000 from term 1, clock at term 1.
    fn registry() -> (JurorsRegistry<ManualClock, InMemoryCustody>, Caller, JurorAddress) {
        let mut custody = InMemoryCustody::new();
        custody.fund(&JurorAddress::from("alice"), v(1_000)).unwrap();
        let mut reg = JurorsRegistry::new(RegistryConfig::default(), ManualClock::new(0), custody).unwrap();
        reg.stake_and_activate(&Caller::juror("alice"), v(1_000)).unwrap();
        reg.clock_mut().advance(1);
        (reg, Caller::court("court"), JurorAddress::from("alice"))
    }

    #[test]
    fn test_lock_bounded_by_unlocked_active() {
        let (mut reg, court, alice) = registry();
        reg.lock(&court, &alice, v(600)).unwrap();
        let err = reg.lock(&court, &alice, v(401)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        reg.unlock(&court, &alice, v(100)).unwrap();
        let balances = reg.balance_of(&alice);
        assert_eq!(balances.locked, v(500));
        assert_eq!(balances.active, v(500));
        assert_eq!(balances.total(), v(1_000));
    }

    #[test]
    fn test_slash_removes_stake_from_next_term() {
        let (mut reg, court, alice) = registry();
        reg.lock(&court, &alice, v(300)).unwrap();

        let collected = reg.slash_or_unlock(&court, &[alice.clone()], &[v(300)], &[false]).unwrap();
        assert_eq!(collected, v(300));
        assert_eq!(reg.active_balance_at(&alice, 1), v(1_000));
        assert_eq!(reg.active_balance_at(&alice, 2), v(700));
        assert_eq!(reg.balance_of(&alice).locked, v(0));
        assert_eq!(reg.total_staked_for(&alice), v(700));
    }

    #[test]
    fn test_rewarded_lock_is_released() {
        let (mut reg, court, alice) = registry();
        reg.lock(&court, &alice, v(300)).unwrap();
        let collected = reg.slash_or_unlock(&court, &[alice.clone()], &[v(300)], &[true]).unwrap();
        assert!(collected.is_zero());
        assert_eq!(reg.balance_of(&alice).active, v(1_000));
    }

    #[test]
    fn test_settlement_length_mismatch() {
        let (mut reg, court, alice) = registry();
        let err = reg.slash_or_unlock(&court, &[alice], &[], &[true]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_collect_uses_pending_deactivation() {
        let (mut reg, court, alice) = registry();
        reg.deactivate(&Caller::juror("alice"), v(400)).unwrap();

        assert!(!reg.collect(&court, &alice, v(1_001)).unwrap());
        assert!(reg.collect(&court, &alice, v(0)).unwrap());
        assert!(reg.collect(&court, &alice, v(700)).unwrap());

        let balances = reg.balance_of(&alice);
        assert_eq!(balances.active, v(0));
        assert_eq!(balances.pending_deactivation, v(300));
        assert_eq!(reg.active_balance_at(&alice, 2), v(0));
    }

    #[test]
    fn test_late_slash_keeps_past_terms_intact() {
        let (mut reg, court, alice) = registry();
        reg.lock(&court, &alice, v(300)).unwrap();
        reg.clock_mut().set_term(6);

        reg.slash_or_unlock(&court, &[alice.clone()], &[v(300)], &[false]).unwrap();
        for term in 1..=6 {
            assert_eq!(reg.active_balance_at(&alice, term), v(1_000));
            assert_eq!(reg.total_active_balance_at(term), v(1_000));
        }
        assert_eq!(reg.active_balance_at(&alice, 7), v(700));
    }

    #[test]
    fn test_settlement_leaves_next_term_writable() {
        let (mut reg, court, alice) = registry();
        reg.custody_mut().fund(&JurorAddress::from("bob"), v(500)).unwrap();
        reg.stake(&Caller::juror("bob"), v(500)).unwrap();
        reg.lock(&court, &alice, v(100)).unwrap();

        reg.slash_or_unlock(&court, &[alice.clone()], &[v(100)], &[false]).unwrap();
        assert!(reg.collect(&court, &alice, v(50)).unwrap());
        reg.activate(&Caller::juror("bob"), v(500)).unwrap();

        assert_eq!(reg.active_balance_at(&alice, 1), v(1_000));
        assert_eq!(reg.active_balance_at(&alice, 2), v(850));
        assert_eq!(reg.total_active_balance_at(2), v(1_350));
        assert_eq!(reg.total_active_balance_at(1), v(1_000));
    }

    #[test]
    fn test_settlement_at_last_term_overflows() {
        let (mut reg, court, alice) = registry();
        reg.lock(&court, &alice, v(100)).unwrap();
        reg.clock_mut().set_term(u64::MAX);

        let err = reg.slash_or_unlock(&court, &[alice.clone()], &[v(100)], &[false]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Arithmetic);
        assert_eq!(reg.balance_of(&alice).locked, v(100));
        assert!(reg.collect(&court, &alice, v(10)).is_err());
        assert_eq!(reg.active_balance_at(&alice, u64::MAX), v(1_000));
    }

    #[test]
    fn test_assign_and_burn_credit_available() {
        let (mut reg, court, alice) = registry();
        reg.assign_tokens(&court, &alice, v(25)).unwrap();
        reg.burn_tokens(&court, v(5)).unwrap();

        assert_eq!(reg.balance_of(&alice).available, v(25));
        assert_eq!(reg.balance_of(&burn_account()).available, v(5));
        assert!(reg.burn_tokens(&Caller::juror("alice"), v(5)).is_err());
    }
}
