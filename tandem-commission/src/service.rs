use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use tandem_core::repository::{LedgerRepository, OrderRepository, PhaseLevelRepository, ProfileRepository};
use tandem_core::{AppSettings, Commission, CommissionRecording, CommissionStatus, Order};

use crate::calculator::{CommissionCalculator, SkippedUpline, UplineMember};
use crate::CommissionError;

/// Runtime knobs for a commission run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionPlan {
    pub max_levels: i32,
}

impl From<&AppSettings> for CommissionPlan {
    fn from(settings: &AppSettings) -> Self {
        Self { max_levels: settings.max_commission_levels }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommissionOutcome {
    pub status: CommissionStatus,
    /// Commissions credited by this run; empty on a replay
    pub commissions: Vec<Commission>,
    pub skipped: Vec<SkippedUpline>,
    /// The order was cancelled or refunded before it could be credited
    pub closed: bool,
}

impl CommissionOutcome {
    fn empty(status: CommissionStatus, closed: bool) -> Self {
        Self { status, commissions: Vec::new(), skipped: Vec::new(), closed }
    }
}

/// Commission states a run may still move out of
const OPEN: [CommissionStatus; 2] = [CommissionStatus::Pending, CommissionStatus::Failed];

/// Resolves the sponsor chain of an order, prices it and credits the ledger.
pub struct CommissionService {
    orders: Arc<dyn OrderRepository>,
    profiles: Arc<dyn ProfileRepository>,
    phases: Arc<dyn PhaseLevelRepository>,
    ledger: Arc<dyn LedgerRepository>,
}

impl CommissionService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        profiles: Arc<dyn ProfileRepository>,
        phases: Arc<dyn PhaseLevelRepository>,
        ledger: Arc<dyn LedgerRepository>,
    ) -> Self {
        Self { orders, profiles, phases, ledger }
    }

    /// Walk up from the attributed affiliate, nearest first.
    ///
    /// Stops at `max_levels`, at a missing profile or sponsor, and on any
    /// cycle back to the buyer or an already visited member.
    pub async fn resolve_upline(
        &self,
        buyer_id: Uuid,
        affiliate_id: Uuid,
        plan: &CommissionPlan,
    ) -> Result<Vec<UplineMember>, CommissionError> {
        let phases: HashMap<i32, _> = self
            .phases
            .list_phase_levels()
            .await?
            .into_iter()
            .map(|p| (p.phase, p))
            .collect();

        let mut upline = Vec::new();
        let mut visited = HashSet::from([buyer_id]);
        let mut current = Some(affiliate_id);

        while let Some(user_id) = current {
            if upline.len() as i32 >= plan.max_levels {
                break;
            }
            if !visited.insert(user_id) {
                warn!(%buyer_id, %user_id, "Sponsor cycle detected, stopping upline walk");
                break;
            }

            let Some(profile) = self.profiles.get_profile(user_id).await? else {
                warn!(%user_id, "Sponsor profile missing, stopping upline walk");
                break;
            };

            let subscription = self.profiles.get_subscription(user_id).await?;
            let phase_level = subscription.as_ref().and_then(|s| phases.get(&s.phase).cloned());

            upline.push(UplineMember { user_id, subscription, phase_level });
            current = profile.sponsor_id;
        }

        Ok(upline)
    }

    /// Compute and credit commissions for a paid order, then record the
    /// outcome on the order. Safe to call again for the same order.
    ///
    /// A cancelled or refunded order is closed instead of credited, even when
    /// the cancellation lands between this call's read and its ledger write.
    pub async fn process_order(
        &self,
        order: &Order,
        plan: &CommissionPlan,
    ) -> Result<CommissionOutcome, CommissionError> {
        if order.status.reverses_commissions() {
            let status = order.commission_status.closed(false);
            self.orders.update_commission_status(order.id, &OPEN, status).await?;
            info!(order_id = %order.id, status = %order.status.as_str(), "Order closed, no commissions");
            return Ok(CommissionOutcome::empty(status, true));
        }

        let Some(affiliate_id) = order.affiliate_id else {
            self.orders.update_commission_status(order.id, &OPEN, CommissionStatus::Skipped).await?;
            return Ok(CommissionOutcome::empty(CommissionStatus::Skipped, false));
        };

        let upline = self.resolve_upline(order.user_id, affiliate_id, plan).await?;
        let calc = CommissionCalculator::calculate(order.user_id, order.subtotal_cents, &upline)?;

        match self.ledger.record_commissions(order.id, &order.currency, &calc.drafts).await? {
            CommissionRecording::Credited(commissions) => {
                info!(
                    order_id = %order.id,
                    credited = commissions.len(),
                    total_cents = calc.total_cents(),
                    skipped = calc.skipped.len(),
                    "Commissions processed"
                );
                Ok(CommissionOutcome {
                    status: CommissionStatus::Calculated,
                    commissions,
                    skipped: calc.skipped,
                    closed: false,
                })
            }
            CommissionRecording::OrderClosed(status) => {
                warn!(order_id = %order.id, status = %status.as_str(), "Order closed before commissions were credited");
                Ok(CommissionOutcome::empty(status, true))
            }
        }
    }

    /// Claw back every credited commission of the order and close its
    /// commission status so no later run credits it again.
    pub async fn reverse_for_order(&self, order: &Order) -> Result<Vec<Commission>, CommissionError> {
        let reversed = self.ledger.reverse_commissions(order.id, &order.currency).await?;
        info!(order_id = %order.id, reversed = reversed.len(), "Commissions reversed");
        Ok(reversed)
    }

    pub async fn commissions_for_order(&self, order_id: Uuid) -> Result<Vec<Commission>, CommissionError> {
        Ok(self.ledger.list_commissions_for_order(order_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{OrderItem, OrderStatus, PhaseLevel, Profile, Subscription, SubscriptionStatus};
    use tandem_store::InMemoryStore;

    struct Fixture {
        store: InMemoryStore,
        service: CommissionService,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let service = CommissionService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        );
        Fixture { store, service }
    }

    async fn seed_member(store: &InMemoryStore, code: &str, sponsor: Option<Uuid>, status: SubscriptionStatus) -> Uuid {
        let profile = Profile::new(format!("{}@example.com", code), code.to_string(), sponsor);
        let id = profile.id;
        store.insert_profile(profile).await;
        store.insert_subscription(Subscription::new(id, status, 1)).await;
        id
    }

    async fn seed_phase(store: &InMemoryStore) {
        store
            .upsert_phase_level(&PhaseLevel {
                phase: 1,
                name: "Builder".into(),
                direct_rate_bps: 1000,
                network_rate_bps: 250,
                max_depth: 4,
                is_active: true,
            })
            .await
            .unwrap();
    }

    async fn paid_order(store: &InMemoryStore, buyer: Uuid, affiliate: Option<Uuid>, subtotal: i64) -> Order {
        let mut order = Order::new_paid(buyer, "mock".into(), format!("tx_{}", Uuid::new_v4()), "USD".into());
        order.add_item(OrderItem::new(order.id, Uuid::new_v4(), "Kit".into(), 1, subtotal).unwrap()).unwrap();
        order.affiliate_id = affiliate;
        store.create_order(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_process_order_credits_each_level_once() {
        let fx = fixture();
        seed_phase(&fx.store).await;
        let top = seed_member(&fx.store, "TOP", None, SubscriptionStatus::Active).await;
        let mid = seed_member(&fx.store, "MID", Some(top), SubscriptionStatus::Active).await;
        let buyer = seed_member(&fx.store, "BUY", Some(mid), SubscriptionStatus::Active).await;
        let order = paid_order(&fx.store, buyer, Some(mid), 20_000).await;
        let plan = CommissionPlan { max_levels: 5 };

        let outcome = fx.service.process_order(&order, &plan).await.unwrap();
        assert_eq!(outcome.status, CommissionStatus::Calculated);
        assert_eq!(outcome.commissions.len(), 2);

        // Replay credits nothing new
        let replay = fx.service.process_order(&order, &plan).await.unwrap();
        assert!(replay.commissions.is_empty());

        assert_eq!(fx.store.get_wallet(mid).await.unwrap().unwrap().balance_cents, 2_000);
        assert_eq!(fx.store.get_wallet(top).await.unwrap().unwrap().balance_cents, 500);
        let stored = fx.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.commission_status, CommissionStatus::Calculated);
    }

    #[tokio::test]
    async fn test_max_levels_caps_the_walk() {
        let fx = fixture();
        seed_phase(&fx.store).await;
        let top = seed_member(&fx.store, "L3", None, SubscriptionStatus::Active).await;
        let mid = seed_member(&fx.store, "L2", Some(top), SubscriptionStatus::Active).await;
        let near = seed_member(&fx.store, "L1", Some(mid), SubscriptionStatus::Active).await;
        let buyer = seed_member(&fx.store, "BUYER", Some(near), SubscriptionStatus::Active).await;

        let upline = fx
            .service
            .resolve_upline(buyer, near, &CommissionPlan { max_levels: 2 })
            .await
            .unwrap();

        let ids: Vec<_> = upline.iter().map(|m| m.user_id).collect();
        assert_eq!(ids, vec![near, mid]);
    }

    #[tokio::test]
    async fn test_cycle_back_to_buyer_stops_walk() {
        let fx = fixture();
        seed_phase(&fx.store).await;
        let buyer_profile = Profile::new("loop@example.com".into(), "LOOP".into(), None);
        let buyer = buyer_profile.id;
        let sponsor = seed_member(&fx.store, "SPON", Some(buyer), SubscriptionStatus::Active).await;
        let mut buyer_profile = buyer_profile;
        buyer_profile.sponsor_id = Some(sponsor);
        fx.store.insert_profile(buyer_profile).await;

        let upline = fx
            .service
            .resolve_upline(buyer, sponsor, &CommissionPlan { max_levels: 10 })
            .await
            .unwrap();

        assert_eq!(upline.len(), 1);
        assert_eq!(upline[0].user_id, sponsor);
    }

    #[tokio::test]
    async fn test_unattributed_order_is_skipped() {
        let fx = fixture();
        let buyer = seed_member(&fx.store, "SOLO", None, SubscriptionStatus::Active).await;
        let order = paid_order(&fx.store, buyer, None, 5_000).await;

        let outcome = fx.service.process_order(&order, &CommissionPlan { max_levels: 5 }).await.unwrap();

        assert_eq!(outcome.status, CommissionStatus::Skipped);
        assert_eq!(
            fx.store.get_order(order.id).await.unwrap().unwrap().commission_status,
            CommissionStatus::Skipped
        );
    }

    #[tokio::test]
    async fn test_reverse_for_order_debits_beneficiaries() {
        let fx = fixture();
        seed_phase(&fx.store).await;
        let sponsor = seed_member(&fx.store, "SP", None, SubscriptionStatus::Active).await;
        let buyer = seed_member(&fx.store, "BY", Some(sponsor), SubscriptionStatus::Active).await;
        let order = paid_order(&fx.store, buyer, Some(sponsor), 10_000).await;
        fx.service.process_order(&order, &CommissionPlan { max_levels: 5 }).await.unwrap();

        let order = fx.store.get_order(order.id).await.unwrap().unwrap();
        let reversed = fx.service.reverse_for_order(&order).await.unwrap();

        assert_eq!(reversed.len(), 1);
        assert_eq!(fx.store.get_wallet(sponsor).await.unwrap().unwrap().balance_cents, 0);
        assert_eq!(
            fx.store.get_order(order.id).await.unwrap().unwrap().commission_status,
            CommissionStatus::Reversed
        );
    }

    #[tokio::test]
    async fn test_cancelled_order_is_closed_not_credited() {
        let fx = fixture();
        seed_phase(&fx.store).await;
        let sponsor = seed_member(&fx.store, "CSP", None, SubscriptionStatus::Active).await;
        let buyer = seed_member(&fx.store, "CBY", Some(sponsor), SubscriptionStatus::Active).await;
        let order = paid_order(&fx.store, buyer, Some(sponsor), 10_000).await;
        fx.store.update_status(order.id, OrderStatus::Paid, OrderStatus::Cancelled).await.unwrap();

        // A run holding the pre-cancellation snapshot still credits nothing
        let outcome = fx.service.process_order(&order, &CommissionPlan { max_levels: 5 }).await.unwrap();

        assert!(outcome.closed);
        assert_eq!(outcome.status, CommissionStatus::Skipped);
        assert!(outcome.commissions.is_empty());
        assert!(fx.store.get_wallet(sponsor).await.unwrap().is_none());
        assert_eq!(
            fx.store.get_order(order.id).await.unwrap().unwrap().commission_status,
            CommissionStatus::Skipped
        );
    }

    #[tokio::test]
    async fn test_reverse_for_uncredited_order_closes_it() {
        let fx = fixture();
        let buyer = seed_member(&fx.store, "UNC", None, SubscriptionStatus::Active).await;
        let order = paid_order(&fx.store, buyer, Some(Uuid::new_v4()), 10_000).await;

        let reversed = fx.service.reverse_for_order(&order).await.unwrap();

        assert!(reversed.is_empty());
        assert_eq!(
            fx.store.get_order(order.id).await.unwrap().unwrap().commission_status,
            CommissionStatus::Skipped
        );
    }
}
