pub mod calculator;
pub mod service;
pub mod wallet;

pub use calculator::{Calculation, CommissionCalculator, SkipReason, SkippedUpline, UplineMember};
pub use service::{CommissionOutcome, CommissionPlan, CommissionService};
pub use wallet::{WalletError, WalletPolicy, WalletService};

use tandem_core::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum CommissionError {
    #[error("Commission base must be non-negative, got {0}")]
    InvalidBase(i64),
    #[error("Commission amount overflowed for level {level}")]
    Overflow { level: i32 },
    #[error(transparent)]
    Repository(#[from] RepoError),
}
