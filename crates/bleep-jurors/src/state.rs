// COURT LEDGER: REGISTRY STATE
// Active-stake tree, juror records and registry parameters, with staged mutation
//
// SAFETY INVARIANTS:
// 1. A juror id, once assigned, always maps back to the same address
// 2. `locked` never exceeds the latest value of the juror's leaf
// 3. While a stage is open, every record and parameter write keeps its pre-image
// 4. `rollback` restores the tree, records, ids and parameters exactly as at `begin`

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::juror::{JurorAddress, JurorRecord};
use bleep_sumtree::{History, SumTree, SumTreeError};
use log::debug;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct Stage {
    records: BTreeMap<JurorAddress, Option<JurorRecord>>,
    new_ids: Vec<u64>,
    min_active_balance: Option<History>,
    total_active_balance_limit: Option<U256>,
}

/// Everything the registry persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState {
    pub(crate) tree: SumTree,
    pub(crate) jurors: BTreeMap<JurorAddress, JurorRecord>,
    pub(crate) ids: BTreeMap<u64, JurorAddress>,
    /// Minimum active balance checkpointed by term
    pub(crate) min_active_balance: History,
    pub(crate) total_active_balance_limit: U256,
    #[serde(skip)]
    stage: Option<Stage>,
}

impl LedgerState {
    pub fn genesis(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let mut min_active_balance = History::new();
        min_active_balance.add(0, config.min_active_balance)?;

        Ok(LedgerState {
            tree: SumTree::new(),
            jurors: BTreeMap::new(),
            ids: BTreeMap::new(),
            min_active_balance,
            total_active_balance_limit: config.total_active_balance_limit,
            stage: None,
        })
    }

    pub fn tree(&self) -> &SumTree {
        &self.tree
    }

    pub fn record(&self, juror: &JurorAddress) -> Option<&JurorRecord> {
        self.jurors.get(juror)
    }

    /// Copy of a juror's record, default for unknown jurors.
    pub fn record_or_default(&self, juror: &JurorAddress) -> JurorRecord {
        self.jurors.get(juror).cloned().unwrap_or_default()
    }

    pub fn address_of(&self, id: u64) -> Option<&JurorAddress> {
        self.ids.get(&id)
    }

    pub fn jurors(&self) -> impl Iterator<Item = (&JurorAddress, &JurorRecord)> {
        self.jurors.iter()
    }

    pub fn min_active_balance_at(&self, term: u64) -> U256 {
        self.min_active_balance.get(term)
    }

    pub fn total_active_balance_limit(&self) -> U256 {
        self.total_active_balance_limit
    }

    /// Latest leaf value of a juror, zero before activation.
    pub fn leaf(&self, record: &JurorRecord) -> U256 {
        record.id.map(|id| self.tree.item(id)).unwrap_or_else(U256::zero)
    }

    pub fn leaf_at(&self, record: &JurorRecord, term: u64) -> U256 {
        record.id.map(|id| self.tree.item_at(id, term)).unwrap_or_else(U256::zero)
    }

    /// Active balance not reserved by a lock.
    pub fn unlocked_active(&self, record: &JurorRecord) -> U256 {
        self.leaf(record).saturating_sub(record.locked)
    }

    pub(crate) fn put_record(&mut self, juror: &JurorAddress, record: JurorRecord) {
        if let Some(stage) = self.stage.as_mut() {
            if !stage.records.contains_key(juror) {
                stage.records.insert(juror.clone(), self.jurors.get(juror).cloned());
            }
        }
        self.jurors.insert(juror.clone(), record);
    }

    pub(crate) fn register_id(&mut self, id: u64, juror: &JurorAddress) {
        if let Some(stage) = self.stage.as_mut() {
            stage.new_ids.push(id);
        }
        self.ids.insert(id, juror.clone());
    }

    pub(crate) fn set_min_active_balance(&mut self, from_term: u64, amount: U256) -> Result<(), SumTreeError> {
        if let Some(stage) = self.stage.as_mut() {
            if stage.min_active_balance.is_none() {
                stage.min_active_balance = Some(self.min_active_balance.clone());
            }
        }
        self.min_active_balance.add(from_term, amount)?;
        Ok(())
    }

    pub(crate) fn set_total_active_balance_limit(&mut self, limit: U256) {
        if let Some(stage) = self.stage.as_mut() {
            if stage.total_active_balance_limit.is_none() {
                stage.total_active_balance_limit = Some(self.total_active_balance_limit);
            }
        }
        self.total_active_balance_limit = limit;
    }

    pub(crate) fn begin(&mut self) -> Result<(), RegistryError> {
        if self.stage.is_some() {
            return Err(SumTreeError::JournalAlreadyOpen.into());
        }
        self.tree.begin()?;
        self.stage = Some(Stage::default());
        Ok(())
    }

    pub(crate) fn commit(&mut self) -> Result<(), RegistryError> {
        self.stage.take().ok_or(SumTreeError::NoJournalOpen)?;
        self.tree.commit()?;
        Ok(())
    }

    pub(crate) fn rollback(&mut self) -> Result<(), RegistryError> {
        let stage = self.stage.take().ok_or(SumTreeError::NoJournalOpen)?;
        self.tree.rollback()?;

        for (juror, previous) in stage.records {
            match previous {
                Some(record) => {
                    self.jurors.insert(juror, record);
                }
                None => {
                    self.jurors.remove(&juror);
                }
            }
        }
        for id in stage.new_ids {
            self.ids.remove(&id);
        }
        if let Some(history) = stage.min_active_balance {
            self.min_active_balance = history;
        }
        if let Some(limit) = stage.total_active_balance_limit {
            self.total_active_balance_limit = limit;
        }
        debug!("Registry state rolled back");
        Ok(())
    }
}
