// COURT LEDGER: HEXADECIMAL SUM TREE
// Checkpointed 16-ary tree of stake sums supporting weighted search at any past time
//
// SAFETY INVARIANTS:
// 1. For every level, key and time: node value == sum of its 16 children's values
// 2. Leaves are appended at `next_key`; keys are never reused or removed
// 3. Height only grows; growth copies the old root into the new root at the same time
// 4. Mutations validate every node on the update path before writing anything
// 5. Search at time T only reads checkpoints with time <= T

use crate::checkpoint::CheckpointStore;
use crate::error::SumTreeError;
use crate::value::{checked_add, checked_sub, ensure_fits};
use log::debug;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Branching factor of the tree.
pub const CHILDREN: u64 = 16;

/// Level holding the leaves (items).
pub const ITEMS_LEVEL: u32 = 0;

const BITS_IN_NIBBLE: u32 = 4;
const BASE_KEY: u64 = 0;

/// Storage slot of the tree's checkpoint store.
///
/// Node keys live in leaf key space: a node at `level` has the low
/// `4 * level` bits of its key cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
enum Slot {
    Height,
    Node { level: u32, key: u64 },
}

/// Leaves resolved by a search, one entry per searched target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub keys: Vec<u64>,
    pub values: Vec<U256>,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, U256)> + '_ {
        self.keys.iter().copied().zip(self.values.iter().copied())
    }
}

/// Checkpoint-backed 16-ary sum tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SumTree {
    next_key: u64,
    slots: CheckpointStore<Slot>,
    #[serde(skip)]
    staged_next_key: Option<u64>,
}

impl SumTree {
    /// Create an initialized tree (height 1 recorded at time 0).
    pub fn new() -> Self {
        let mut tree = SumTree::default();
        // A fresh store has no history, so the first write cannot fail.
        let _ = tree.slots.add(Slot::Height, 0, U256::one());
        tree
    }

    pub fn init(&mut self) -> Result<(), SumTreeError> {
        if self.is_initialized() {
            return Err(SumTreeError::AlreadyInitialized);
        }
        self.slots.add(Slot::Height, 0, U256::one())?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        !self.slots.get_last(&Slot::Height).is_zero()
    }

    /// Append a new leaf holding `value` from `time` on. Returns its key.
    pub fn insert(&mut self, time: u64, value: U256) -> Result<u64, SumTreeError> {
        self.ensure_initialized()?;
        let value = ensure_fits(value)?;

        let key = self.next_key;
        let next_key = key.checked_add(1).ok_or(SumTreeError::KeySpaceExhausted)?;
        let height = self.height();
        let grows = capacity(height) == Some(key);
        let path_height = if grows { height + 1 } else { height };

        if grows {
            self.ensure_writable(Slot::Height, time)?;
            self.ensure_writable(Slot::Node { level: height, key: BASE_KEY }, time)?;
        }
        if !value.is_zero() {
            self.check_path(key, path_height, time)?;
            checked_add(self.total(), value)?;
        }

        if grows {
            self.add_level(time)?;
        }
        self.next_key = next_key;
        if !value.is_zero() {
            self.add_to_path(key, time, value)?;
        }
        Ok(key)
    }

    /// Overwrite a leaf's value from `time` on.
    pub fn set(&mut self, key: u64, time: u64, value: U256) -> Result<(), SumTreeError> {
        self.ensure_key(key)?;
        let value = ensure_fits(value)?;
        let last = self.item(key);

        if value > last {
            self.update(key, time, value - last, true)
        } else if value < last {
            self.update(key, time, last - value, false)
        } else {
            Ok(())
        }
    }

    /// Add (`positive`) or subtract `delta` from a leaf from `time` on.
    pub fn update(
        &mut self,
        key: u64,
        time: u64,
        delta: U256,
        positive: bool,
    ) -> Result<(), SumTreeError> {
        self.ensure_key(key)?;
        if delta.is_zero() {
            return Ok(());
        }

        let height = self.height();
        self.check_path(key, height, time)?;
        if positive {
            // The root bounds every ancestor from above.
            checked_add(self.total(), delta)?;
            self.add_to_path(key, time, delta)
        } else {
            // The leaf bounds every ancestor from below.
            checked_sub(self.item(key), delta)?;
            self.sub_from_path(key, time, delta)
        }
    }

    /// Resolve ascending cumulative `targets` to leaves as of `time`.
    ///
    /// A target `t` resolves to the leaf whose cumulative range
    /// `[prefix, prefix + value)` contains it; several targets may resolve
    /// to the same leaf.
    pub fn search(&self, targets: &[U256], time: u64) -> Result<SearchResult, SumTreeError> {
        let last = *targets.last().ok_or(SumTreeError::MissingSearchValues)?;
        if targets.windows(2).any(|w| w[0] > w[1]) {
            return Err(SumTreeError::UnsortedSearchValues);
        }

        let height = self.height_at(time);
        if height == 0 {
            return Err(SumTreeError::TimeBeforeFirstCheckpoint { time });
        }
        let total = self.recent_node_at(height, BASE_KEY, time);
        if total.is_zero() || last >= total {
            return Err(SumTreeError::SearchOutOfBounds { target: last, total, time });
        }

        let mut result = SearchResult {
            keys: Vec::with_capacity(targets.len()),
            values: Vec::with_capacity(targets.len()),
        };
        let mut found = 0usize;
        self.search_children(targets, height - 1, BASE_KEY, U256::zero(), time, &mut found, &mut result);
        Ok(result)
    }

    pub fn next_key(&self) -> u64 {
        self.next_key
    }

    pub fn height(&self) -> u32 {
        as_height(self.slots.get_last(&Slot::Height))
    }

    pub fn height_at(&self, time: u64) -> u32 {
        as_height(self.slots.get(&Slot::Height, time))
    }

    pub fn total(&self) -> U256 {
        self.node(self.height(), BASE_KEY)
    }

    pub fn total_at(&self, time: u64) -> U256 {
        self.node_at(self.height_at(time), BASE_KEY, time)
    }

    pub fn item(&self, key: u64) -> U256 {
        self.node(ITEMS_LEVEL, key)
    }

    pub fn item_at(&self, key: u64, time: u64) -> U256 {
        self.node_at(ITEMS_LEVEL, key, time)
    }

    pub fn node(&self, level: u32, key: u64) -> U256 {
        self.slots.get_last(&Slot::Node { level, key })
    }

    pub fn node_at(&self, level: u32, key: u64, time: u64) -> U256 {
        self.slots.get(&Slot::Node { level, key }, time)
    }

    /// Open a journal: every write until `commit`/`rollback` can be undone.
    pub fn begin(&mut self) -> Result<(), SumTreeError> {
        self.slots.begin()?;
        self.staged_next_key = Some(self.next_key);
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), SumTreeError> {
        self.slots.commit()?;
        self.staged_next_key = None;
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<(), SumTreeError> {
        self.slots.rollback()?;
        if let Some(next_key) = self.staged_next_key.take() {
            self.next_key = next_key;
        }
        debug!("Sum tree rolled back to next key {}", self.next_key);
        Ok(())
    }

    fn recent_node_at(&self, level: u32, key: u64, time: u64) -> U256 {
        self.slots.get_recent(&Slot::Node { level, key }, time)
    }

    #[allow(clippy::too_many_arguments)]
    fn search_children(
        &self,
        targets: &[U256],
        level: u32,
        parent_key: u64,
        visited: U256,
        time: u64,
        found: &mut usize,
        result: &mut SearchResult,
    ) {
        let shift = level * BITS_IN_NIBBLE;
        let mut visited_total = visited;

        for child in 0..CHILDREN {
            if *found >= targets.len() {
                break;
            }

            let child_key = parent_key | (child << shift);
            let child_value = self.recent_node_at(level, child_key, time);
            let new_visited = visited_total.saturating_add(child_value);

            let included = targets[*found..]
                .iter()
                .take_while(|target| **target < new_visited)
                .count();

            if included > 0 {
                if level == ITEMS_LEVEL {
                    for _ in 0..included {
                        result.keys.push(child_key);
                        result.values.push(child_value);
                    }
                    *found += included;
                } else {
                    self.search_children(targets, level - 1, child_key, visited_total, time, found, result);
                }
            }
            visited_total = new_visited;
        }
    }

    fn add_level(&mut self, time: u64) -> Result<(), SumTreeError> {
        let height = self.height();
        let new_height = height + 1;
        let root = self.node(height, BASE_KEY);

        self.slots.add(Slot::Height, time, U256::from(new_height))?;
        if !root.is_zero() {
            self.slots.add(Slot::Node { level: new_height, key: BASE_KEY }, time, root)?;
        }
        debug!("Sum tree grew to height {} at time {}", new_height, time);
        Ok(())
    }

    fn add_to_path(&mut self, key: u64, time: u64, delta: U256) -> Result<(), SumTreeError> {
        for level in ITEMS_LEVEL..=self.height() {
            let slot = Slot::Node { level, key: ancestor_key(key, level) };
            let value = checked_add(self.slots.get_last(&slot), delta)?;
            self.slots.add(slot, time, value)?;
        }
        Ok(())
    }

    fn sub_from_path(&mut self, key: u64, time: u64, delta: U256) -> Result<(), SumTreeError> {
        for level in ITEMS_LEVEL..=self.height() {
            let slot = Slot::Node { level, key: ancestor_key(key, level) };
            let value = checked_sub(self.slots.get_last(&slot), delta)?;
            self.slots.add(slot, time, value)?;
        }
        Ok(())
    }

    fn check_path(&self, key: u64, height: u32, time: u64) -> Result<(), SumTreeError> {
        for level in ITEMS_LEVEL..=height {
            self.ensure_writable(Slot::Node { level, key: ancestor_key(key, level) }, time)?;
        }
        Ok(())
    }

    fn ensure_writable(&self, slot: Slot, time: u64) -> Result<(), SumTreeError> {
        match self.slots.last_time(&slot) {
            Some(latest) if latest > time => Err(SumTreeError::PastCheckpoint { time, latest }),
            _ => Ok(()),
        }
    }

    fn ensure_initialized(&self) -> Result<(), SumTreeError> {
        if !self.is_initialized() {
            return Err(SumTreeError::NotInitialized);
        }
        Ok(())
    }

    fn ensure_key(&self, key: u64) -> Result<(), SumTreeError> {
        self.ensure_initialized()?;
        if key >= self.next_key {
            return Err(SumTreeError::KeyDoesNotExist { key, next_key: self.next_key });
        }
        Ok(())
    }
}

/// Number of leaves a tree of `height` can address; `None` once it spans the whole key space.
fn capacity(height: u32) -> Option<u64> {
    CHILDREN.checked_pow(height)
}

fn ancestor_key(key: u64, level: u32) -> u64 {
    let shift = level * BITS_IN_NIBBLE;
    if shift >= u64::BITS {
        BASE_KEY
    } else {
        (key >> shift) << shift
    }
}

fn as_height(value: U256) -> u32 {
    // Heights are tiny (at most 17); anything else means no checkpoint.
    if value > U256::from(u32::MAX) {
        0
    } else {
        value.low_u32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: u64) -> U256 {
        U256::from(n)
    }

    fn tree_with(values: &[u64], time: u64) -> SumTree {
        let mut tree = SumTree::new();
        for value in values {
            tree.insert(time, v(*value)).unwrap();
        }
        tree
    }

    #[test]
    fn test_insert_on_empty_tree() {
        let mut tree = SumTree::new();
        let key = tree.insert(2, v(5)).unwrap();

        assert_eq!(key, 0);
        assert_eq!(tree.item(key), v(5));
        assert_eq!(tree.total(), v(5));
        assert_eq!(tree.item_at(key, 0), v(0));
        assert_eq!(tree.item_at(key, 2), v(5));
        assert_eq!(tree.total_at(1), v(0));
    }

    #[test]
    fn test_double_init_rejected() {
        let mut tree = SumTree::new();
        assert_eq!(tree.init(), Err(SumTreeError::AlreadyInitialized));

        let mut blank = SumTree::default();
        assert_eq!(blank.insert(0, v(1)), Err(SumTreeError::NotInitialized));
        blank.init().unwrap();
        assert_eq!(blank.height(), 1);
    }

    #[test]
    fn test_search_resolves_duplicate_leaves() {
        let tree = tree_with(&[2, 1, 4, 1, 8, 6, 7, 1], 1);
        assert_eq!(tree.total(), v(30));

        let targets: Vec<U256> = [0u64, 4, 7, 17, 21].iter().map(|t| v(*t)).collect();
        let result = tree.search(&targets, 1).unwrap();

        assert_eq!(result.keys, vec![0, 2, 3, 5, 5]);
        assert_eq!(result.values, vec![v(2), v(4), v(1), v(6), v(6)]);
    }

    #[test]
    fn test_search_out_of_bounds() {
        let tree = tree_with(&[3, 4], 0);
        let err = tree.search(&[v(7)], 0).unwrap_err();
        assert!(matches!(err, SumTreeError::SearchOutOfBounds { .. }));
        assert_eq!(err.kind(), crate::ErrorKind::Range);

        assert_eq!(tree.search(&[], 0), Err(SumTreeError::MissingSearchValues));
        assert_eq!(
            tree.search(&[v(5), v(1)], 0),
            Err(SumTreeError::UnsortedSearchValues)
        );
    }

    #[test]
    fn test_growth_past_sixteen_leaves() {
        let mut tree = SumTree::new();
        for i in 0..16u64 {
            tree.insert(1, v(i + 1)).unwrap();
        }
        assert_eq!(tree.height(), 1);

        tree.insert(3, v(100)).unwrap();
        assert_eq!(tree.height(), 2);
        assert_eq!(tree.height_at(2), 1);
        assert_eq!(tree.total(), v(136 + 100));
        assert_eq!(tree.total_at(2), v(136));
        assert_eq!(tree.node(1, 16), v(100));
        assert_eq!(tree.node(1, 0), v(136));

        let result = tree.search(&[v(135), v(136)], 3).unwrap();
        assert_eq!(result.keys, vec![15, 16]);
    }

    #[test]
    fn test_set_and_update_propagate() {
        let mut tree = tree_with(&[10, 20, 30], 1);
        tree.set(1, 2, v(5)).unwrap();
        assert_eq!(tree.total(), v(45));
        assert_eq!(tree.total_at(1), v(60));

        tree.update(2, 3, v(5), false).unwrap();
        tree.update(0, 3, v(1), true).unwrap();
        assert_eq!(tree.total(), v(41));
        assert_eq!(tree.item_at(2, 2), v(30));
        assert_eq!(tree.item(2), v(25));
    }

    #[test]
    fn test_update_failures_leave_tree_untouched() {
        let mut tree = tree_with(&[10, 20], 5);

        assert!(matches!(
            tree.update(0, 6, v(11), false),
            Err(SumTreeError::Underflow { .. })
        ));
        assert!(matches!(
            tree.update(1, 4, v(1), true),
            Err(SumTreeError::PastCheckpoint { time: 4, latest: 5 })
        ));
        assert_eq!(
            tree.update(2, 6, v(1), true),
            Err(SumTreeError::KeyDoesNotExist { key: 2, next_key: 2 })
        );
        assert!(matches!(
            tree.update(0, 6, crate::value::MAX_UINT192, true),
            Err(SumTreeError::Overflow { .. })
        ));

        assert_eq!(tree.total(), v(30));
        assert_eq!(tree.item(0), v(10));
        assert_eq!(tree.item_at(0, 6), v(10));
    }

    #[test]
    fn test_rollback_restores_keys_and_height() {
        let mut tree = tree_with(&[1; 16], 0);
        tree.begin().unwrap();
        tree.insert(1, v(9)).unwrap();
        tree.update(0, 1, v(1), false).unwrap();
        assert_eq!(tree.height(), 2);
        tree.rollback().unwrap();

        assert_eq!(tree.next_key(), 16);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.total(), v(16));
        assert_eq!(tree.item(0), v(1));
    }

    #[test]
    fn test_zero_value_insert_reserves_key() {
        let mut tree = SumTree::new();
        assert_eq!(tree.insert(0, U256::zero()).unwrap(), 0);
        assert_eq!(tree.insert(0, v(4)).unwrap(), 1);
        assert_eq!(tree.total(), v(4));
        assert_eq!(tree.search(&[v(0)], 0).unwrap().keys, vec![1]);
    }
}
