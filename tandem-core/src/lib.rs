pub mod ledger;
pub mod network;
pub mod order;
pub mod payment;
pub mod repository;
pub mod settings;

pub use ledger::{
    Commission, CommissionDraft, CommissionRecordStatus, CommissionRecording, CommissionTotals, NewWalletTransaction,
    TransactionKind, Wallet, WalletTransaction,
};
pub use network::{PhaseLevel, Profile, ProfileRole, ProfileUpdate, Subscription, SubscriptionStatus};
pub use order::{CommissionStatus, Order, OrderItem, OrderStatus, SalesSummary};
pub use repository::{RepoError, RepoResult};
pub use settings::{AdvertisingScript, AnalyticsConsent, AppSettings, ScriptPlacement};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
