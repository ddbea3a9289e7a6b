/// BLEEP COURT: CHECKPOINTED SUM TREE
///
/// Storage layer behind stake-weighted juror sortition:
/// - `checkpoint`: per-key append-only histories answering "value as of time T"
/// - `tree`: a 16-ary tree of checkpointed sums with multi-target weighted search
/// - `value`: checked 192-bit arithmetic shared by both
///
/// Every write is time-stamped and never rewrites the past, so any search or
/// balance made for an earlier time can be reproduced exactly later.

pub mod checkpoint;
pub mod error;
pub mod tree;
pub mod value;

pub use checkpoint::{Checkpoint, CheckpointStore, History, Write};
pub use error::{ErrorKind, SumTreeError};
pub use tree::{SearchResult, SumTree, CHILDREN, ITEMS_LEVEL};
pub use value::{checked_add, checked_sub, ensure_fits, MAX_UINT192};

pub use primitive_types::U256;
