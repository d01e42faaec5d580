use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use tandem_shared::{BasisPoints, Cents};

use crate::order::CommissionStatus;
use crate::CoreError;

/// Per-user cents balance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance_cents: Cents,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn empty(user_id: Uuid, currency: &str) -> Self {
        Self {
            user_id,
            balance_cents: 0,
            currency: currency.to_string(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Commission,
    CommissionReversal,
    Recharge,
    Payout,
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Commission => "commission",
            TransactionKind::CommissionReversal => "commission_reversal",
            TransactionKind::Recharge => "recharge",
            TransactionKind::Payout => "payout",
            TransactionKind::Adjustment => "adjustment",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commission" => Ok(TransactionKind::Commission),
            "commission_reversal" => Ok(TransactionKind::CommissionReversal),
            "recharge" => Ok(TransactionKind::Recharge),
            "payout" => Ok(TransactionKind::Payout),
            "adjustment" => Ok(TransactionKind::Adjustment),
            other => Err(CoreError::UnknownVariant { kind: "transaction kind", value: other.to_string() }),
        }
    }
}

/// Immutable ledger line. `balance_after_cents` is the wallet balance once applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount_cents: Cents,
    pub balance_after_cents: Cents,
    pub reference: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A ledger mutation before it is applied.
///
/// `(kind, reference, user_id)` is the idempotency key: applying the same
/// triple twice yields the first transaction and leaves the balance alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWalletTransaction {
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount_cents: Cents,
    pub reference: String,
    pub description: Option<String>,
    pub currency: String,
    pub allow_negative: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommissionRecordStatus {
    Credited,
    Reversed,
}

impl CommissionRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionRecordStatus::Credited => "credited",
            CommissionRecordStatus::Reversed => "reversed",
        }
    }
}

impl FromStr for CommissionRecordStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credited" => Ok(CommissionRecordStatus::Credited),
            "reversed" => Ok(CommissionRecordStatus::Reversed),
            other => Err(CoreError::UnknownVariant { kind: "commission status", value: other.to_string() }),
        }
    }
}

/// A computed payout for one upline member, not yet persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommissionDraft {
    pub beneficiary_id: Uuid,
    pub source_user_id: Uuid,
    pub level: i32,
    pub phase: i32,
    pub rate_bps: BasisPoints,
    pub base_cents: Cents,
    pub amount_cents: Cents,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commission {
    pub id: Uuid,
    pub order_id: Uuid,
    pub beneficiary_id: Uuid,
    pub source_user_id: Uuid,
    pub level: i32,
    pub phase: i32,
    pub rate_bps: BasisPoints,
    pub base_cents: Cents,
    pub amount_cents: Cents,
    pub status: CommissionRecordStatus,
    pub wallet_transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Commission {
    pub fn from_draft(order_id: Uuid, draft: &CommissionDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            beneficiary_id: draft.beneficiary_id,
            source_user_id: draft.source_user_id,
            level: draft.level,
            phase: draft.phase,
            rate_bps: draft.rate_bps,
            base_cents: draft.base_cents,
            amount_cents: draft.amount_cents,
            status: CommissionRecordStatus::Credited,
            wallet_transaction_id: None,
            created_at: Utc::now(),
        }
    }

    /// Ledger reference used for the credit of this commission
    pub fn credit_reference(order_id: Uuid, level: i32) -> String {
        format!("order:{}:level:{}", order_id, level)
    }
}

/// What `LedgerRepository::record_commissions` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommissionRecording {
    /// Rows credited by this call; empty on a replay
    Credited(Vec<Commission>),
    /// The order was cancelled, refunded or already closed. Nothing was
    /// credited and its commission status is now the carried value.
    OrderClosed(CommissionStatus),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommissionTotals {
    pub credited_count: i64,
    pub credited_cents: Cents,
    pub reversed_count: i64,
    pub reversed_cents: Cents,
}
