// COURT LEDGER: CHECKPOINTED HISTORIES
// Append-only time series answering "value as of time T"
//
// SAFETY INVARIANTS:
// 1. Checkpoint times of a history are strictly increasing
// 2. A write at an earlier time than the latest checkpoint is rejected
// 3. A write at the latest time overwrites that checkpoint, later writes append
// 4. Every stored value fits in 192 bits
// 5. Histories are never truncated outside of a journal rollback

use crate::error::SumTreeError;
use crate::value::ensure_fits;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single (time, value) record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub time: u64,
    pub value: U256,
}

/// How a write landed in a history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
    Appended,
    Overwritten { previous: U256 },
}

/// Time-ordered checkpoints of one key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    checkpoints: Vec<Checkpoint>,
}

impl History {
    pub fn new() -> Self {
        History { checkpoints: Vec::new() }
    }

    /// Record `value` at `time`.
    pub fn add(&mut self, time: u64, value: U256) -> Result<Write, SumTreeError> {
        let value = ensure_fits(value)?;

        match self.checkpoints.last_mut() {
            Some(last) if last.time > time => Err(SumTreeError::PastCheckpoint {
                time,
                latest: last.time,
            }),
            Some(last) if last.time == time => {
                let previous = last.value;
                last.value = value;
                Ok(Write::Overwritten { previous })
            }
            _ => {
                self.checkpoints.push(Checkpoint { time, value });
                Ok(Write::Appended)
            }
        }
    }

    /// Latest value, zero for an empty history.
    pub fn last(&self) -> U256 {
        self.checkpoints.last().map(|c| c.value).unwrap_or_else(U256::zero)
    }

    pub fn last_time(&self) -> Option<u64> {
        self.checkpoints.last().map(|c| c.time)
    }

    /// Value of the latest checkpoint with time <= `time`, by binary search.
    pub fn get(&self, time: u64) -> U256 {
        let (first, last) = match (self.checkpoints.first(), self.checkpoints.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return U256::zero(),
        };
        if time >= last.time {
            return last.value;
        }
        if time < first.time {
            return U256::zero();
        }

        let mut low = 0usize;
        let mut high = self.checkpoints.len() - 1;
        while high > low {
            let mid = (high + low + 1) / 2;
            let checkpoint = &self.checkpoints[mid];
            if time > checkpoint.time {
                low = mid;
            } else if time < checkpoint.time {
                high = mid - 1;
            } else {
                return checkpoint.value;
            }
        }
        self.checkpoints[low].value
    }

    /// Same answer as `get`, scanning backwards from the tip. Cheaper when
    /// `time` is at or near the most recent checkpoint.
    pub fn get_recent(&self, time: u64) -> U256 {
        self.checkpoints
            .iter()
            .rev()
            .find(|c| c.time <= time)
            .map(|c| c.value)
            .unwrap_or_else(U256::zero)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    fn pop(&mut self) {
        self.checkpoints.pop();
    }

    fn restore_last(&mut self, previous: U256) {
        if let Some(last) = self.checkpoints.last_mut() {
            last.value = previous;
        }
    }
}

#[derive(Debug, Clone)]
enum JournalEntry<K> {
    Appended(K),
    Overwritten(K, U256),
}

/// Histories keyed by `K`, with an optional undo journal.
///
/// While a journal is open every write is remembered, so `rollback` puts
/// each touched history back exactly as it was at `begin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointStore<K: Ord> {
    histories: BTreeMap<K, History>,
    #[serde(skip, default = "closed_journal")]
    journal: Option<Vec<JournalEntry<K>>>,
}

fn closed_journal<K>() -> Option<Vec<JournalEntry<K>>> {
    None
}

impl<K: Ord> Default for CheckpointStore<K> {
    fn default() -> Self {
        CheckpointStore {
            histories: BTreeMap::new(),
            journal: None,
        }
    }
}

impl<K: Ord + Clone> CheckpointStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: K, time: u64, value: U256) -> Result<Write, SumTreeError> {
        let write = self.histories.entry(key.clone()).or_default().add(time, value);

        // A failed first write must not leave an empty history behind.
        if write.is_err() && self.histories.get(&key).map_or(false, History::is_empty) {
            self.histories.remove(&key);
        }
        let write = write?;

        if let Some(journal) = self.journal.as_mut() {
            journal.push(match write {
                Write::Appended => JournalEntry::Appended(key),
                Write::Overwritten { previous } => JournalEntry::Overwritten(key, previous),
            });
        }
        Ok(write)
    }

    pub fn get(&self, key: &K, time: u64) -> U256 {
        self.histories.get(key).map(|h| h.get(time)).unwrap_or_else(U256::zero)
    }

    pub fn get_recent(&self, key: &K, time: u64) -> U256 {
        self.histories
            .get(key)
            .map(|h| h.get_recent(time))
            .unwrap_or_else(U256::zero)
    }

    pub fn get_last(&self, key: &K) -> U256 {
        self.histories.get(key).map(History::last).unwrap_or_else(U256::zero)
    }

    pub fn last_time(&self, key: &K) -> Option<u64> {
        self.histories.get(key).and_then(History::last_time)
    }

    pub fn history(&self, key: &K) -> Option<&History> {
        self.histories.get(key)
    }

    /// Number of keys with at least one checkpoint.
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn in_journal(&self) -> bool {
        self.journal.is_some()
    }

    pub fn begin(&mut self) -> Result<(), SumTreeError> {
        if self.journal.is_some() {
            return Err(SumTreeError::JournalAlreadyOpen);
        }
        self.journal = Some(Vec::new());
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), SumTreeError> {
        self.journal.take().map(|_| ()).ok_or(SumTreeError::NoJournalOpen)
    }

    pub fn rollback(&mut self) -> Result<(), SumTreeError> {
        let journal = self.journal.take().ok_or(SumTreeError::NoJournalOpen)?;

        for entry in journal.into_iter().rev() {
            match entry {
                JournalEntry::Appended(key) => {
                    let emptied = match self.histories.get_mut(&key) {
                        Some(history) => {
                            history.pop();
                            history.is_empty()
                        }
                        None => false,
                    };
                    if emptied {
                        self.histories.remove(&key);
                    }
                }
                JournalEntry::Overwritten(key, previous) => {
                    if let Some(history) = self.histories.get_mut(&key) {
                        history.restore_last(previous);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MAX_UINT192;

    fn v(n: u64) -> U256 {
        U256::from(n)
    }

    #[test]
    fn test_get_between_checkpoints() {
        let mut history = History::new();
        history.add(30, v(1)).unwrap();
        history.add(50, v(2)).unwrap();
        history.add(90, v(3)).unwrap();

        assert_eq!(history.get(40), v(1));
        assert_eq!(history.get(60), v(2));
        assert_eq!(history.get(100), v(3));
        assert_eq!(history.get(29), v(0));
        assert_eq!(history.get(50), v(2));
    }

    #[test]
    fn test_recent_matches_binary_search() {
        let mut history = History::new();
        for (i, t) in [1u64, 4, 9, 16, 25, 36].iter().enumerate() {
            history.add(*t, v(i as u64 + 10)).unwrap();
        }
        for t in 0..40 {
            assert_eq!(history.get(t), history.get_recent(t), "time {}", t);
        }
    }

    #[test]
    fn test_same_time_overwrites() {
        let mut history = History::new();
        assert_eq!(history.add(5, v(1)).unwrap(), Write::Appended);
        assert_eq!(
            history.add(5, v(7)).unwrap(),
            Write::Overwritten { previous: v(1) }
        );
        assert_eq!(history.len(), 1);
        assert_eq!(history.last(), v(7));
    }

    #[test]
    fn test_past_checkpoint_rejected() {
        let mut history = History::new();
        history.add(10, v(1)).unwrap();
        let err = history.add(9, v(1)).unwrap_err();
        assert_eq!(err, SumTreeError::PastCheckpoint { time: 9, latest: 10 });
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_value_too_big_rejected() {
        let mut history = History::new();
        assert!(history.add(1, MAX_UINT192).is_ok());
        assert!(matches!(
            history.add(2, MAX_UINT192 + U256::one()),
            Err(SumTreeError::ValueTooBig { .. })
        ));
        assert_eq!(history.last(), MAX_UINT192);
    }

    #[test]
    fn test_store_rollback_restores_histories() {
        let mut store: CheckpointStore<u64> = CheckpointStore::new();
        store.add(1, 1, v(10)).unwrap();
        store.add(2, 1, v(20)).unwrap();

        store.begin().unwrap();
        store.add(1, 1, v(11)).unwrap();
        store.add(1, 2, v(12)).unwrap();
        store.add(3, 2, v(30)).unwrap();
        store.rollback().unwrap();

        assert_eq!(store.get_last(&1), v(10));
        assert_eq!(store.history(&1).unwrap().len(), 1);
        assert_eq!(store.get_last(&2), v(20));
        assert!(store.history(&3).is_none());
        assert!(!store.in_journal());
    }

    #[test]
    fn test_store_commit_keeps_writes() {
        let mut store: CheckpointStore<u64> = CheckpointStore::new();
        store.begin().unwrap();
        store.add(7, 3, v(5)).unwrap();
        store.commit().unwrap();
        assert_eq!(store.get(&7, 3), v(5));
        assert_eq!(store.rollback(), Err(SumTreeError::NoJournalOpen));
    }

    #[test]
    fn test_failed_first_write_leaves_no_key() {
        let mut store: CheckpointStore<u64> = CheckpointStore::new();
        assert!(store.add(1, 0, MAX_UINT192 + U256::one()).is_err());
        assert!(store.is_empty());
    }
}
