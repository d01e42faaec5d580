use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use tandem_core::repository::{
    LedgerRepository, OrderRepository, PhaseLevelRepository, ProfileRepository, SettingsRepository,
};
use tandem_core::{
    AdvertisingScript, AnalyticsConsent, AppSettings, Commission, CommissionDraft, CommissionRecordStatus, CommissionRecording,
    CommissionStatus, CommissionTotals, NewWalletTransaction, Order, OrderStatus, PhaseLevel, Profile,
    ProfileUpdate, RepoError, RepoResult, SalesSummary, Subscription, TransactionKind, Wallet,
    WalletTransaction,
};

#[derive(Default)]
struct Inner {
    profiles: HashMap<Uuid, Profile>,
    subscriptions: HashMap<Uuid, Subscription>,
    phase_levels: BTreeMap<i32, PhaseLevel>,
    orders: HashMap<Uuid, Order>,
    orders_by_transaction: HashMap<String, Uuid>,
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<WalletTransaction>,
    commissions: Vec<Commission>,
    settings: Option<AppSettings>,
    scripts: HashMap<Uuid, AdvertisingScript>,
    consents: HashMap<Uuid, AnalyticsConsent>,
}

/// Ledger state captured before a multi-row mutation
struct LedgerSnapshot {
    wallets: HashMap<Uuid, Wallet>,
    transactions: usize,
    commissions: Vec<Commission>,
}

impl Inner {
    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            wallets: self.wallets.clone(),
            transactions: self.transactions.len(),
            commissions: self.commissions.clone(),
        }
    }

    fn restore(&mut self, snapshot: LedgerSnapshot) {
        self.wallets = snapshot.wallets;
        self.transactions.truncate(snapshot.transactions);
        self.commissions = snapshot.commissions;
    }

    fn find_transaction(&self, kind: TransactionKind, reference: &str, user_id: Uuid) -> Option<&WalletTransaction> {
        self.transactions
            .iter()
            .find(|t| t.kind == kind && t.reference == reference && t.user_id == user_id)
    }

    fn apply(&mut self, new: &NewWalletTransaction) -> RepoResult<WalletTransaction> {
        if let Some(existing) = self.find_transaction(new.kind, &new.reference, new.user_id) {
            return Ok(existing.clone());
        }

        let wallet = self
            .wallets
            .entry(new.user_id)
            .or_insert_with(|| Wallet::empty(new.user_id, &new.currency));

        let balance = wallet
            .balance_cents
            .checked_add(new.amount_cents)
            .ok_or_else(|| RepoError::Conflict("wallet balance overflow".to_string()))?;

        if balance < 0 && !new.allow_negative {
            return Err(RepoError::InsufficientFunds {
                balance_cents: wallet.balance_cents,
                requested_cents: -new.amount_cents,
            });
        }

        wallet.balance_cents = balance;
        wallet.updated_at = Utc::now();

        let tx = WalletTransaction {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            kind: new.kind,
            amount_cents: new.amount_cents,
            balance_after_cents: balance,
            reference: new.reference.clone(),
            description: new.description.clone(),
            created_at: Utc::now(),
        };
        self.transactions.push(tx.clone());
        Ok(tx)
    }
}

/// Every repository port backed by process memory.
///
/// One `RwLock` guards the whole state, so each ledger mutation is
/// serialized and either fully applied or not at all. Used by tests and by
/// the API when no database is configured.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_profile(&self, profile: Profile) {
        self.inner.write().await.profiles.insert(profile.id, profile);
    }

    pub async fn insert_subscription(&self, subscription: Subscription) {
        self.inner.write().await.subscriptions.insert(subscription.user_id, subscription);
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn create_order(&self, order: &Order) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        if inner.orders_by_transaction.contains_key(&order.gateway_transaction_id) {
            return Err(RepoError::Conflict(format!(
                "order for transaction {} already exists",
                order.gateway_transaction_id
            )));
        }
        inner.orders_by_transaction.insert(order.gateway_transaction_id.clone(), order.id);
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn find_by_transaction(&self, gateway_transaction_id: &str) -> RepoResult<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders_by_transaction
            .get(gateway_transaction_id)
            .and_then(|id| inner.orders.get(id))
            .cloned())
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> RepoResult<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner.orders.values().filter(|o| o.user_id == user_id).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list_orders_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> RepoResult<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.created_at >= from && o.created_at < to)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn list_by_commission_status(&self, statuses: &[CommissionStatus], limit: i64) -> RepoResult<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| statuses.contains(&o.commission_status))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        orders.truncate(limit.max(0) as usize);
        Ok(orders)
    }

    async fn update_status(&self, id: Uuid, from: OrderStatus, to: OrderStatus) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        let order = inner.orders.get_mut(&id).ok_or_else(|| RepoError::NotFound(format!("order {}", id)))?;
        if order.status != from {
            return Err(RepoError::Conflict(format!(
                "order {} is {}, not {}",
                id,
                order.status.as_str(),
                from.as_str()
            )));
        }
        order.update_status(to);
        Ok(())
    }

    async fn update_commission_status(
        &self,
        id: Uuid,
        from: &[CommissionStatus],
        to: CommissionStatus,
    ) -> RepoResult<bool> {
        let mut inner = self.inner.write().await;
        let order = inner.orders.get_mut(&id).ok_or_else(|| RepoError::NotFound(format!("order {}", id)))?;
        if !from.contains(&order.commission_status) {
            return Ok(false);
        }
        order.commission_status = to;
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn sales_summary(&self) -> RepoResult<SalesSummary> {
        let inner = self.inner.read().await;
        let mut summary = SalesSummary::default();
        for order in inner.orders.values() {
            if order.status.reverses_commissions() {
                summary.refunded_count += 1;
                continue;
            }
            summary.order_count += 1;
            summary.revenue_cents += order.total_cents;
        }
        Ok(summary)
    }
}

#[async_trait]
impl ProfileRepository for InMemoryStore {
    async fn get_profile(&self, id: Uuid) -> RepoResult<Option<Profile>> {
        Ok(self.inner.read().await.profiles.get(&id).cloned())
    }

    async fn find_by_referral_code(&self, code: &str) -> RepoResult<Option<Profile>> {
        let inner = self.inner.read().await;
        Ok(inner.profiles.values().find(|p| p.referral_code_matches(code)).cloned())
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> RepoResult<Profile> {
        let mut inner = self.inner.write().await;
        let profile = inner.profiles.get_mut(&id).ok_or_else(|| RepoError::NotFound(format!("profile {}", id)))?;
        if let Some(name) = &update.full_name {
            profile.full_name = Some(name.clone());
        }
        if let Some(phone) = &update.phone {
            profile.phone = Some(phone.clone());
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn count_direct_referrals(&self, sponsor_id: Uuid) -> RepoResult<i64> {
        let inner = self.inner.read().await;
        Ok(inner.profiles.values().filter(|p| p.sponsor_id == Some(sponsor_id)).count() as i64)
    }

    async fn get_subscription(&self, user_id: Uuid) -> RepoResult<Option<Subscription>> {
        Ok(self.inner.read().await.subscriptions.get(&user_id).cloned())
    }
}

#[async_trait]
impl PhaseLevelRepository for InMemoryStore {
    async fn list_phase_levels(&self) -> RepoResult<Vec<PhaseLevel>> {
        Ok(self.inner.read().await.phase_levels.values().cloned().collect())
    }

    async fn get_phase_level(&self, phase: i32) -> RepoResult<Option<PhaseLevel>> {
        Ok(self.inner.read().await.phase_levels.get(&phase).cloned())
    }

    async fn upsert_phase_level(&self, level: &PhaseLevel) -> RepoResult<()> {
        self.inner.write().await.phase_levels.insert(level.phase, level.clone());
        Ok(())
    }

    async fn delete_phase_level(&self, phase: i32) -> RepoResult<()> {
        self.inner
            .write()
            .await
            .phase_levels
            .remove(&phase)
            .map(|_| ())
            .ok_or_else(|| RepoError::NotFound(format!("phase level {}", phase)))
    }
}

#[async_trait]
impl LedgerRepository for InMemoryStore {
    async fn get_wallet(&self, user_id: Uuid) -> RepoResult<Option<Wallet>> {
        Ok(self.inner.read().await.wallets.get(&user_id).cloned())
    }

    async fn list_transactions(&self, user_id: Uuid, limit: i64) -> RepoResult<Vec<WalletTransaction>> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn apply_transaction(&self, tx: &NewWalletTransaction) -> RepoResult<WalletTransaction> {
        self.inner.write().await.apply(tx)
    }

    async fn record_commissions(
        &self,
        order_id: Uuid,
        currency: &str,
        drafts: &[CommissionDraft],
    ) -> RepoResult<CommissionRecording> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| RepoError::NotFound(format!("order {}", order_id)))?;

        let already_closed = matches!(order.commission_status, CommissionStatus::Skipped | CommissionStatus::Reversed);
        if order.status.reverses_commissions() || already_closed {
            let status = order.commission_status.closed(false);
            order.commission_status = status;
            order.updated_at = Utc::now();
            return Ok(CommissionRecording::OrderClosed(status));
        }

        let snapshot = inner.snapshot();
        let mut recorded = Vec::new();
        for draft in drafts {
            let exists = inner.commissions.iter().any(|c| {
                c.order_id == order_id && c.beneficiary_id == draft.beneficiary_id && c.level == draft.level
            });
            if exists {
                continue;
            }

            let credit = NewWalletTransaction {
                user_id: draft.beneficiary_id,
                kind: TransactionKind::Commission,
                amount_cents: draft.amount_cents,
                reference: Commission::credit_reference(order_id, draft.level),
                description: Some(format!("Level {} commission for order {}", draft.level, order_id)),
                currency: currency.to_string(),
                allow_negative: false,
            };

            match inner.apply(&credit) {
                Ok(tx) => {
                    let mut commission = Commission::from_draft(order_id, draft);
                    commission.wallet_transaction_id = Some(tx.id);
                    inner.commissions.push(commission.clone());
                    recorded.push(commission);
                }
                Err(e) => {
                    inner.restore(snapshot);
                    return Err(e);
                }
            }
        }

        if let Some(order) = inner.orders.get_mut(&order_id) {
            order.commission_status = CommissionStatus::Calculated;
            order.updated_at = Utc::now();
        }
        Ok(CommissionRecording::Credited(recorded))
    }

    async fn list_commissions_for_order(&self, order_id: Uuid) -> RepoResult<Vec<Commission>> {
        let inner = self.inner.read().await;
        let mut commissions: Vec<Commission> =
            inner.commissions.iter().filter(|c| c.order_id == order_id).cloned().collect();
        commissions.sort_by_key(|c| c.level);
        Ok(commissions)
    }

    async fn reverse_commissions(&self, order_id: Uuid, currency: &str) -> RepoResult<Vec<Commission>> {
        let mut inner = self.inner.write().await;
        if !inner.orders.contains_key(&order_id) {
            return Err(RepoError::NotFound(format!("order {}", order_id)));
        }

        let targets: Vec<usize> = inner
            .commissions
            .iter()
            .enumerate()
            .filter(|(_, c)| c.order_id == order_id && c.status == CommissionRecordStatus::Credited)
            .map(|(i, _)| i)
            .collect();

        let snapshot = inner.snapshot();
        let mut reversed = Vec::new();
        for idx in targets {
            let commission = inner.commissions[idx].clone();
            let debit = NewWalletTransaction {
                user_id: commission.beneficiary_id,
                kind: TransactionKind::CommissionReversal,
                amount_cents: -commission.amount_cents,
                reference: Commission::credit_reference(order_id, commission.level),
                description: Some(format!("Reversal of level {} commission for order {}", commission.level, order_id)),
                currency: currency.to_string(),
                allow_negative: true,
            };
            if let Err(e) = inner.apply(&debit) {
                inner.restore(snapshot);
                return Err(e);
            }
            inner.commissions[idx].status = CommissionRecordStatus::Reversed;
            reversed.push(inner.commissions[idx].clone());
        }

        if let Some(order) = inner.orders.get_mut(&order_id) {
            order.commission_status = order.commission_status.closed(!reversed.is_empty());
            order.updated_at = Utc::now();
        }
        Ok(reversed)
    }

    async fn commission_totals(&self) -> RepoResult<CommissionTotals> {
        let inner = self.inner.read().await;
        let mut totals = CommissionTotals::default();
        for c in &inner.commissions {
            match c.status {
                CommissionRecordStatus::Credited => {
                    totals.credited_count += 1;
                    totals.credited_cents += c.amount_cents;
                }
                CommissionRecordStatus::Reversed => {
                    totals.reversed_count += 1;
                    totals.reversed_cents += c.amount_cents;
                }
            }
        }
        Ok(totals)
    }
}

#[async_trait]
impl SettingsRepository for InMemoryStore {
    async fn get_app_settings(&self) -> RepoResult<Option<AppSettings>> {
        Ok(self.inner.read().await.settings.clone())
    }

    async fn save_app_settings(&self, settings: &AppSettings) -> RepoResult<()> {
        self.inner.write().await.settings = Some(settings.clone());
        Ok(())
    }

    async fn list_scripts(&self) -> RepoResult<Vec<AdvertisingScript>> {
        let inner = self.inner.read().await;
        let mut scripts: Vec<AdvertisingScript> = inner.scripts.values().cloned().collect();
        scripts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(scripts)
    }

    async fn upsert_script(&self, script: &AdvertisingScript) -> RepoResult<()> {
        self.inner.write().await.scripts.insert(script.id, script.clone());
        Ok(())
    }

    async fn delete_script(&self, id: Uuid) -> RepoResult<()> {
        self.inner
            .write()
            .await
            .scripts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepoError::NotFound(format!("advertising script {}", id)))
    }

    async fn get_consent(&self, user_id: Uuid) -> RepoResult<Option<AnalyticsConsent>> {
        Ok(self.inner.read().await.consents.get(&user_id).cloned())
    }

    async fn save_consent(&self, consent: &AnalyticsConsent) -> RepoResult<()> {
        self.inner.write().await.consents.insert(consent.user_id, consent.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit(user_id: Uuid, amount: i64, reference: &str) -> NewWalletTransaction {
        NewWalletTransaction {
            user_id,
            kind: TransactionKind::Recharge,
            amount_cents: amount,
            reference: reference.to_string(),
            description: None,
            currency: "USD".to_string(),
            allow_negative: false,
        }
    }

    fn draft(beneficiary_id: Uuid, level: i32, amount: i64) -> CommissionDraft {
        CommissionDraft {
            beneficiary_id,
            source_user_id: Uuid::new_v4(),
            level,
            phase: 1,
            rate_bps: 1000,
            base_cents: amount * 10,
            amount_cents: amount,
        }
    }

    #[tokio::test]
    async fn test_apply_transaction_is_idempotent() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();

        let first = store.apply_transaction(&credit(user, 500, "tx_1")).await.unwrap();
        let replay = store.apply_transaction(&credit(user, 500, "tx_1")).await.unwrap();

        assert_eq!(first.id, replay.id);
        assert_eq!(store.get_wallet(user).await.unwrap().unwrap().balance_cents, 500);
    }

    #[tokio::test]
    async fn test_debit_below_zero_is_rejected() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        store.apply_transaction(&credit(user, 300, "tx_1")).await.unwrap();

        let mut payout = credit(user, -400, "payout_1");
        payout.kind = TransactionKind::Payout;
        let err = store.apply_transaction(&payout).await.unwrap_err();

        assert!(matches!(err, RepoError::InsufficientFunds { balance_cents: 300, requested_cents: 400 }));
        assert_eq!(store.get_wallet(user).await.unwrap().unwrap().balance_cents, 300);
    }

    async fn paid_order(store: &InMemoryStore) -> Uuid {
        let order = Order::new_paid(Uuid::new_v4(), "mock".into(), Uuid::new_v4().to_string(), "USD".into());
        store.create_order(&order).await.unwrap();
        order.id
    }

    fn credited(recording: CommissionRecording) -> Vec<Commission> {
        match recording {
            CommissionRecording::Credited(rows) => rows,
            other => panic!("expected credited rows, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_record_commissions_skips_existing_rows() {
        let store = InMemoryStore::new();
        let order_id = paid_order(&store).await;
        let sponsor = Uuid::new_v4();

        let first = credited(store.record_commissions(order_id, "USD", &[draft(sponsor, 1, 120)]).await.unwrap());
        let second = credited(store.record_commissions(order_id, "USD", &[draft(sponsor, 1, 120)]).await.unwrap());

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(store.get_wallet(sponsor).await.unwrap().unwrap().balance_cents, 120);
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.commission_status, CommissionStatus::Calculated);
    }

    #[tokio::test]
    async fn test_record_commissions_requires_order() {
        let store = InMemoryStore::new();
        let result = store.record_commissions(Uuid::new_v4(), "USD", &[draft(Uuid::new_v4(), 1, 120)]).await;
        assert!(matches!(result, Err(RepoError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_record_commissions_on_cancelled_order_credits_nothing() {
        let store = InMemoryStore::new();
        let order_id = paid_order(&store).await;
        let sponsor = Uuid::new_v4();
        store.update_status(order_id, OrderStatus::Paid, OrderStatus::Cancelled).await.unwrap();

        let recording = store.record_commissions(order_id, "USD", &[draft(sponsor, 1, 120)]).await.unwrap();

        assert_eq!(recording, CommissionRecording::OrderClosed(CommissionStatus::Skipped));
        assert!(store.get_wallet(sponsor).await.unwrap().is_none());
        assert!(store.list_commissions_for_order(order_id).await.unwrap().is_empty());
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.commission_status, CommissionStatus::Skipped);
    }

    #[tokio::test]
    async fn test_reverse_commissions_can_go_negative() {
        let store = InMemoryStore::new();
        let order_id = paid_order(&store).await;
        let sponsor = Uuid::new_v4();
        store.record_commissions(order_id, "USD", &[draft(sponsor, 1, 120)]).await.unwrap();

        let mut payout = credit(sponsor, -100, "payout_1");
        payout.kind = TransactionKind::Payout;
        store.apply_transaction(&payout).await.unwrap();

        let reversed = store.reverse_commissions(order_id, "USD").await.unwrap();
        assert_eq!(reversed.len(), 1);
        assert_eq!(reversed[0].status, CommissionRecordStatus::Reversed);
        assert_eq!(store.get_wallet(sponsor).await.unwrap().unwrap().balance_cents, -100);
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.commission_status, CommissionStatus::Reversed);

        // Second reversal finds nothing left to reverse
        assert!(store.reverse_commissions(order_id, "USD").await.unwrap().is_empty());

        let totals = store.commission_totals().await.unwrap();
        assert_eq!(totals.reversed_count, 1);
        assert_eq!(totals.credited_count, 0);
    }

    #[tokio::test]
    async fn test_reverse_without_commissions_closes_pending_order() {
        let store = InMemoryStore::new();
        let order_id = paid_order(&store).await;

        assert!(store.reverse_commissions(order_id, "USD").await.unwrap().is_empty());

        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.commission_status, CommissionStatus::Skipped);
    }

    #[tokio::test]
    async fn test_failed_reversal_leaves_ledger_untouched() {
        let store = InMemoryStore::new();
        let order_id = paid_order(&store).await;
        let sponsor = Uuid::new_v4();
        let upline = Uuid::new_v4();
        store
            .record_commissions(order_id, "USD", &[draft(sponsor, 1, 120), draft(upline, 2, 120)])
            .await
            .unwrap();

        // Push the upline wallet close enough to i64::MIN that its reversal overflows
        for (i, amount) in [-i64::MAX, -71].into_iter().enumerate() {
            let mut adjustment = credit(upline, amount, &format!("adjust_{}", i));
            adjustment.kind = TransactionKind::Adjustment;
            adjustment.allow_negative = true;
            store.apply_transaction(&adjustment).await.unwrap();
        }
        let transactions_before = store.list_transactions(sponsor, 10).await.unwrap().len();

        let err = store.reverse_commissions(order_id, "USD").await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));

        assert_eq!(store.get_wallet(sponsor).await.unwrap().unwrap().balance_cents, 120);
        assert_eq!(store.list_transactions(sponsor, 10).await.unwrap().len(), transactions_before);
        let rows = store.list_commissions_for_order(order_id).await.unwrap();
        assert!(rows.iter().all(|c| c.status == CommissionRecordStatus::Credited));
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.commission_status, CommissionStatus::Calculated);
    }

    #[tokio::test]
    async fn test_update_status_rejects_stale_expected_status() {
        let store = InMemoryStore::new();
        let order_id = paid_order(&store).await;

        store.update_status(order_id, OrderStatus::Paid, OrderStatus::Refunded).await.unwrap();
        let stale = store.update_status(order_id, OrderStatus::Paid, OrderStatus::Processing).await;

        assert!(matches!(stale, Err(RepoError::Conflict(_))));
        assert_eq!(store.get_order(order_id).await.unwrap().unwrap().status, OrderStatus::Refunded);
        assert!(matches!(
            store.update_status(Uuid::new_v4(), OrderStatus::Paid, OrderStatus::Processing).await,
            Err(RepoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_commission_status_only_from_expected() {
        let store = InMemoryStore::new();
        let order_id = paid_order(&store).await;
        let open = [CommissionStatus::Pending, CommissionStatus::Failed];

        assert!(store.update_commission_status(order_id, &open, CommissionStatus::Failed).await.unwrap());
        assert!(store.update_commission_status(order_id, &open, CommissionStatus::Skipped).await.unwrap());
        assert!(!store.update_commission_status(order_id, &open, CommissionStatus::Failed).await.unwrap());
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.commission_status, CommissionStatus::Skipped);
    }

    #[tokio::test]
    async fn test_duplicate_transaction_order_conflicts() {
        let store = InMemoryStore::new();
        let order = Order::new_paid(Uuid::new_v4(), "mock".into(), "tx_9".into(), "USD".into());
        store.create_order(&order).await.unwrap();

        let again = Order::new_paid(order.user_id, "mock".into(), "tx_9".into(), "USD".into());
        assert!(matches!(store.create_order(&again).await, Err(RepoError::Conflict(_))));
        assert_eq!(store.find_by_transaction("tx_9").await.unwrap().unwrap().id, order.id);
    }
}
