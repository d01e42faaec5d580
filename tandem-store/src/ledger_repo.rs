use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use tandem_core::repository::LedgerRepository;
use tandem_core::{
    Commission, CommissionDraft, CommissionRecordStatus, CommissionRecording, CommissionStatus, CommissionTotals,
    NewWalletTransaction, OrderStatus, RepoError, RepoResult, TransactionKind, Wallet, WalletTransaction,
};

use crate::rows::{map_sqlx, parse, CommissionRow, WalletTransactionRow};

const TX_COLUMNS: &str = "id, user_id, kind, amount_cents, balance_after_cents, reference, description, created_at";
const COMMISSION_COLUMNS: &str = "id, order_id, beneficiary_id, source_user_id, level, phase, rate_bps, base_cents, \
     amount_cents, status, wallet_transaction_id, created_at";

pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Apply one ledger mutation inside the caller's transaction.
///
/// The wallet row is locked before the idempotency lookup so two concurrent
/// deliveries of the same key serialize and the second sees the first.
async fn apply_in_tx(conn: &mut PgConnection, new: &NewWalletTransaction) -> RepoResult<WalletTransaction> {
    sqlx::query(
        "INSERT INTO wallets (user_id, balance_cents, currency, updated_at) VALUES ($1, 0, $2, NOW()) \
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(new.user_id)
    .bind(&new.currency)
    .execute(&mut *conn)
    .await
    .map_err(RepoError::backend)?;

    let (balance,): (i64,) = sqlx::query_as("SELECT balance_cents FROM wallets WHERE user_id = $1 FOR UPDATE")
        .bind(new.user_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(RepoError::backend)?;

    let existing_sql = format!(
        "SELECT {} FROM wallet_transactions WHERE kind = $1 AND reference = $2 AND user_id = $3",
        TX_COLUMNS
    );
    let existing: Option<WalletTransactionRow> = sqlx::query_as(&existing_sql)
        .bind(new.kind.as_str())
        .bind(&new.reference)
        .bind(new.user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(RepoError::backend)?;

    if let Some(row) = existing {
        debug!(user_id = %new.user_id, reference = %new.reference, "Ledger replay, returning original transaction");
        return WalletTransaction::try_from(row);
    }

    let new_balance = balance
        .checked_add(new.amount_cents)
        .ok_or_else(|| RepoError::Conflict("wallet balance overflow".to_string()))?;

    if new_balance < 0 && !new.allow_negative {
        return Err(RepoError::InsufficientFunds {
            balance_cents: balance,
            requested_cents: -new.amount_cents,
        });
    }

    sqlx::query("UPDATE wallets SET balance_cents = $2, updated_at = NOW() WHERE user_id = $1")
        .bind(new.user_id)
        .bind(new_balance)
        .execute(&mut *conn)
        .await
        .map_err(RepoError::backend)?;

    let insert_sql = format!(
        "INSERT INTO wallet_transactions (id, user_id, kind, amount_cents, balance_after_cents, reference, description) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
        TX_COLUMNS
    );
    let row: WalletTransactionRow = sqlx::query_as(&insert_sql)
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.kind.as_str())
        .bind(new.amount_cents)
        .bind(new_balance)
        .bind(&new.reference)
        .bind(&new.description)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx(e, "wallet transaction"))?;

    WalletTransaction::try_from(row)
}

/// Lock the order row for the rest of the transaction.
///
/// Taken before any commission or wallet row so status transitions and
/// ledger writes for one order serialize on the same lock.
async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> RepoResult<(OrderStatus, CommissionStatus)> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT status, commission_status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(RepoError::backend)?;

    let (status, commission_status) = row.ok_or_else(|| RepoError::NotFound(format!("order {}", order_id)))?;
    Ok((parse(&status)?, parse(&commission_status)?))
}

async fn set_commission_status(conn: &mut PgConnection, order_id: Uuid, status: CommissionStatus) -> RepoResult<()> {
    sqlx::query("UPDATE orders SET commission_status = $2, updated_at = NOW() WHERE id = $1")
        .bind(order_id)
        .bind(status.as_str())
        .execute(&mut *conn)
        .await
        .map_err(RepoError::backend)?;
    Ok(())
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    async fn get_wallet(&self, user_id: Uuid) -> RepoResult<Option<Wallet>> {
        let row: Option<(Uuid, i64, String, chrono::DateTime<chrono::Utc>)> =
            sqlx::query_as("SELECT user_id, balance_cents, currency, updated_at FROM wallets WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(RepoError::backend)?;

        Ok(row.map(|(user_id, balance_cents, currency, updated_at)| Wallet {
            user_id,
            balance_cents,
            currency,
            updated_at,
        }))
    }

    async fn list_transactions(&self, user_id: Uuid, limit: i64) -> RepoResult<Vec<WalletTransaction>> {
        let sql = format!(
            "SELECT {} FROM wallet_transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
            TX_COLUMNS
        );
        let rows: Vec<WalletTransactionRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::backend)?;
        rows.into_iter().map(WalletTransaction::try_from).collect()
    }

    async fn apply_transaction(&self, new: &NewWalletTransaction) -> RepoResult<WalletTransaction> {
        let mut tx = self.pool.begin().await.map_err(RepoError::backend)?;
        let applied = apply_in_tx(&mut tx, new).await?;
        tx.commit().await.map_err(RepoError::backend)?;
        Ok(applied)
    }

    async fn record_commissions(
        &self,
        order_id: Uuid,
        currency: &str,
        drafts: &[CommissionDraft],
    ) -> RepoResult<CommissionRecording> {
        // Lock wallets in a stable order so concurrent orders cannot deadlock
        let mut ordered: Vec<&CommissionDraft> = drafts.iter().collect();
        ordered.sort_by_key(|d| (d.beneficiary_id, d.level));

        let mut tx = self.pool.begin().await.map_err(RepoError::backend)?;
        let (status, commission_status) = lock_order(&mut tx, order_id).await?;
        let already_closed = matches!(commission_status, CommissionStatus::Skipped | CommissionStatus::Reversed);
        if status.reverses_commissions() || already_closed {
            let closed = commission_status.closed(false);
            set_commission_status(&mut tx, order_id, closed).await?;
            tx.commit().await.map_err(RepoError::backend)?;
            return Ok(CommissionRecording::OrderClosed(closed));
        }

        let mut recorded = Vec::new();

        let insert_sql = format!(
            r#"
            INSERT INTO commissions (id, order_id, beneficiary_id, source_user_id, level, phase, rate_bps,
                                     base_cents, amount_cents, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'credited')
            ON CONFLICT (order_id, beneficiary_id, level) DO NOTHING
            RETURNING {}
            "#,
            COMMISSION_COLUMNS
        );

        for draft in ordered {
            let inserted: Option<CommissionRow> = sqlx::query_as(&insert_sql)
                .bind(Uuid::new_v4())
                .bind(order_id)
                .bind(draft.beneficiary_id)
                .bind(draft.source_user_id)
                .bind(draft.level)
                .bind(draft.phase)
                .bind(draft.rate_bps)
                .bind(draft.base_cents)
                .bind(draft.amount_cents)
                .fetch_optional(&mut *tx)
                .await
                .map_err(RepoError::backend)?;

            let Some(row) = inserted else {
                continue;
            };

            let credit = NewWalletTransaction {
                user_id: draft.beneficiary_id,
                kind: TransactionKind::Commission,
                amount_cents: draft.amount_cents,
                reference: Commission::credit_reference(order_id, draft.level),
                description: Some(format!("Level {} commission for order {}", draft.level, order_id)),
                currency: currency.to_string(),
                allow_negative: false,
            };
            let wallet_tx = apply_in_tx(&mut tx, &credit).await?;

            sqlx::query("UPDATE commissions SET wallet_transaction_id = $2 WHERE id = $1")
                .bind(row.id)
                .bind(wallet_tx.id)
                .execute(&mut *tx)
                .await
                .map_err(RepoError::backend)?;

            let mut commission = Commission::try_from(row)?;
            commission.wallet_transaction_id = Some(wallet_tx.id);
            recorded.push(commission);
        }

        set_commission_status(&mut tx, order_id, CommissionStatus::Calculated).await?;
        tx.commit().await.map_err(RepoError::backend)?;
        Ok(CommissionRecording::Credited(recorded))
    }

    async fn list_commissions_for_order(&self, order_id: Uuid) -> RepoResult<Vec<Commission>> {
        let sql = format!("SELECT {} FROM commissions WHERE order_id = $1 ORDER BY level", COMMISSION_COLUMNS);
        let rows: Vec<CommissionRow> = sqlx::query_as(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::backend)?;
        rows.into_iter().map(Commission::try_from).collect()
    }

    async fn reverse_commissions(&self, order_id: Uuid, currency: &str) -> RepoResult<Vec<Commission>> {
        let mut tx = self.pool.begin().await.map_err(RepoError::backend)?;
        let (_, commission_status) = lock_order(&mut tx, order_id).await?;

        let sql = format!(
            "SELECT {} FROM commissions WHERE order_id = $1 AND status = 'credited' \
             ORDER BY beneficiary_id, level FOR UPDATE",
            COMMISSION_COLUMNS
        );
        let rows: Vec<CommissionRow> = sqlx::query_as(&sql)
            .bind(order_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(RepoError::backend)?;

        let mut reversed = Vec::new();
        for row in rows {
            let mut commission = Commission::try_from(row)?;
            let debit = NewWalletTransaction {
                user_id: commission.beneficiary_id,
                kind: TransactionKind::CommissionReversal,
                amount_cents: -commission.amount_cents,
                reference: Commission::credit_reference(order_id, commission.level),
                description: Some(format!(
                    "Reversal of level {} commission for order {}",
                    commission.level, order_id
                )),
                currency: currency.to_string(),
                allow_negative: true,
            };
            apply_in_tx(&mut tx, &debit).await?;

            sqlx::query("UPDATE commissions SET status = $2 WHERE id = $1")
                .bind(commission.id)
                .bind(CommissionRecordStatus::Reversed.as_str())
                .execute(&mut *tx)
                .await
                .map_err(RepoError::backend)?;

            commission.status = CommissionRecordStatus::Reversed;
            reversed.push(commission);
        }

        set_commission_status(&mut tx, order_id, commission_status.closed(!reversed.is_empty())).await?;
        tx.commit().await.map_err(RepoError::backend)?;
        Ok(reversed)
    }

    async fn commission_totals(&self) -> RepoResult<CommissionTotals> {
        let (credited_count, credited_cents, reversed_count, reversed_cents): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE status = 'credited'),
                    COALESCE(SUM(amount_cents) FILTER (WHERE status = 'credited'), 0)::BIGINT,
                    COUNT(*) FILTER (WHERE status = 'reversed'),
                    COALESCE(SUM(amount_cents) FILTER (WHERE status = 'reversed'), 0)::BIGINT
                FROM commissions
                "#,
            )
            .fetch_one(&self.pool)
            .await
            .map_err(RepoError::backend)?;

        Ok(CommissionTotals { credited_count, credited_cents, reversed_count, reversed_cents })
    }
}
