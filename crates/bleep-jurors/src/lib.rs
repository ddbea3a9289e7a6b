/// BLEEP COURT: JURORS REGISTRY
///
/// Stake accounting and sortition for the BLEEP dispute court:
/// - Jurors stake tokens, activate them for sortition and schedule deactivations
/// - Active stake is tracked in a checkpointed sum tree, so every past term
///   can be drafted from and audited exactly
/// - The court drafts jurors proportionally to active stake, locks their
///   stake, and slashes or releases it once a round is decided
///
/// Every registry operation is all-or-nothing: a failed precondition, a tree
/// error or a refused custody transfer leaves the ledger untouched.

pub mod auth;
pub mod clock;
pub mod config;
pub mod custody;
pub mod draft;
pub mod error;
pub mod juror;
pub mod registry;
pub mod settlement;
pub mod sortition;
pub mod state;

pub use auth::{Caller, Role};
pub use clock::{ManualClock, TermClock};
pub use config::{RegistryConfig, DEFAULT_MAX_DRAFT_ITERATIONS, ENV_PREFIX};
pub use custody::{Custody, CustodyError, InMemoryCustody};
pub use draft::{DraftParams, DraftResult, DraftedJuror};
pub use error::RegistryError;
pub use juror::{burn_account, Balances, DeactivationRequest, JurorAddress, JurorRecord};
pub use registry::JurorsRegistry;
pub use sortition::{batch_bounds, DrawRequest, DrawTargets, KeccakDrawTargets};
pub use state::LedgerState;

pub use bleep_sumtree::{ErrorKind, U256};
