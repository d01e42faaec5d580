use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use tandem_core::payment::{PaymentGateway, PaymentStatus};
use tandem_core::repository::LedgerRepository;
use tandem_core::{AppSettings, NewWalletTransaction, RepoError, TransactionKind, Wallet, WalletTransaction};
use tandem_shared::money::format_cents;
use tandem_shared::Cents;

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Cents),
    #[error("Payout of {requested} is below the minimum of {minimum}")]
    BelowMinimumPayout { requested: Cents, minimum: Cents },
    #[error("Insufficient funds: balance {balance_cents}, requested {requested_cents}")]
    InsufficientFunds { balance_cents: Cents, requested_cents: Cents },
    #[error("Payment {0} has not succeeded")]
    PaymentNotSettled(String),
    #[error("Payment {0} belongs to another user")]
    TransactionOwnershipMismatch(String),
    #[error("Payment gateway error: {0}")]
    Gateway(String),
    #[error(transparent)]
    Repository(RepoError),
}

impl From<RepoError> for WalletError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::InsufficientFunds { balance_cents, requested_cents } => {
                WalletError::InsufficientFunds { balance_cents, requested_cents }
            }
            other => WalletError::Repository(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletPolicy {
    pub min_payout_cents: Cents,
    pub currency: String,
}

impl From<&AppSettings> for WalletPolicy {
    fn from(settings: &AppSettings) -> Self {
        Self {
            min_payout_cents: settings.min_payout_cents,
            currency: settings.currency.clone(),
        }
    }
}

pub struct WalletService {
    ledger: Arc<dyn LedgerRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl WalletService {
    pub fn new(ledger: Arc<dyn LedgerRepository>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { ledger, gateway }
    }

    /// Wallets are created lazily; a user who never earned reads as zero.
    pub async fn balance(&self, user_id: Uuid, currency: &str) -> Result<Wallet, WalletError> {
        Ok(self
            .ledger
            .get_wallet(user_id)
            .await?
            .unwrap_or_else(|| Wallet::empty(user_id, currency)))
    }

    pub async fn history(&self, user_id: Uuid, limit: i64) -> Result<Vec<WalletTransaction>, WalletError> {
        Ok(self.ledger.list_transactions(user_id, limit.clamp(1, 500)).await?)
    }

    pub async fn credit(
        &self,
        user_id: Uuid,
        amount_cents: Cents,
        kind: TransactionKind,
        reference: &str,
        description: Option<String>,
        currency: &str,
    ) -> Result<WalletTransaction, WalletError> {
        if amount_cents <= 0 {
            return Err(WalletError::InvalidAmount(amount_cents));
        }
        let tx = self
            .ledger
            .apply_transaction(&NewWalletTransaction {
                user_id,
                kind,
                amount_cents,
                reference: reference.to_string(),
                description,
                currency: currency.to_string(),
                allow_negative: false,
            })
            .await?;
        Ok(tx)
    }

    pub async fn debit(
        &self,
        user_id: Uuid,
        amount_cents: Cents,
        kind: TransactionKind,
        reference: &str,
        description: Option<String>,
        currency: &str,
    ) -> Result<WalletTransaction, WalletError> {
        if amount_cents <= 0 {
            return Err(WalletError::InvalidAmount(amount_cents));
        }
        let tx = self
            .ledger
            .apply_transaction(&NewWalletTransaction {
                user_id,
                kind,
                amount_cents: -amount_cents,
                reference: reference.to_string(),
                description,
                currency: currency.to_string(),
                allow_negative: false,
            })
            .await?;
        Ok(tx)
    }

    /// Debit a withdrawal. `request_id` makes client retries safe.
    pub async fn request_payout(
        &self,
        user_id: Uuid,
        amount_cents: Cents,
        request_id: Uuid,
        policy: &WalletPolicy,
    ) -> Result<WalletTransaction, WalletError> {
        if amount_cents < policy.min_payout_cents {
            return Err(WalletError::BelowMinimumPayout {
                requested: amount_cents,
                minimum: policy.min_payout_cents,
            });
        }

        let tx = self
            .debit(
                user_id,
                amount_cents,
                TransactionKind::Payout,
                &format!("payout:{}", request_id),
                Some("Payout request".to_string()),
                &policy.currency,
            )
            .await?;

        info!(%user_id, amount = %format_cents(amount_cents), transaction_id = %tx.id, "Payout requested");
        Ok(tx)
    }

    /// Credit a wallet top-up once the gateway confirms the charge.
    pub async fn confirm_recharge(
        &self,
        user_id: Uuid,
        gateway_transaction_id: &str,
    ) -> Result<WalletTransaction, WalletError> {
        let payment = self
            .gateway
            .fetch_transaction(gateway_transaction_id)
            .await
            .map_err(|e| WalletError::Gateway(e.to_string()))?;

        if payment.status != PaymentStatus::Succeeded {
            warn!(%user_id, gateway_transaction_id, status = ?payment.status, "Recharge payment not settled");
            return Err(WalletError::PaymentNotSettled(gateway_transaction_id.to_string()));
        }
        if payment.user_id != Some(user_id) {
            warn!(%user_id, gateway_transaction_id, owner = ?payment.user_id, "Recharge payment not owned by caller");
            return Err(WalletError::TransactionOwnershipMismatch(gateway_transaction_id.to_string()));
        }

        let tx = self
            .credit(
                user_id,
                payment.amount_cents,
                TransactionKind::Recharge,
                gateway_transaction_id,
                Some(format!("Wallet recharge via {}", self.gateway.name())),
                &payment.currency,
            )
            .await?;

        info!(%user_id, gateway_transaction_id, amount = %format_cents(payment.amount_cents), "Recharge confirmed");
        Ok(tx)
    }
}
