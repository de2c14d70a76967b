#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use serde::Serialize;

mod breakdown;
pub mod constants;
mod error_handling;
mod filters;
mod options; // for BudgetBuilder
mod rank;
mod reconcile;
pub mod report;
mod sampler;
mod session;
pub mod volume;

pub use breakdown::{estimate_breakdown, BreakdownResult, NodeStatus, RankedEntry};
pub use error_handling::{ErrorRecovery, EstimateError, EstimateResult, RecoveryAction};
pub use filters::ExcludeSet;
pub use options::{
    Budget, BudgetBuilder, ExcludeConfig, LevelBudget, LevelConfig, SamplerConfig,
};
pub use rank::{rank_entries, Ranked};
pub use reconcile::{reconcile, Reconciled};
pub use sampler::{parse_du_output, DuSampler, Sample, SampleRequest, UsageSampler};
pub use session::{EstimateSession, SessionEvent};

/// A sampler measurement that has not been reconciled yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SampledEntry {
    pub path: PathBuf,
    pub raw_bytes: u64,
}

/// A sampled entry after reconciliation against its parent's total.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UsageEntry {
    pub path: PathBuf,
    pub raw_bytes: u64,
    pub scaled_bytes: f64,
}
