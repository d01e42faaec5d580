use std::sync::Arc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use tandem_commission::CommissionService;
use tandem_core::repository::OrderRepository;
use tandem_core::{Commission, Order, OrderStatus, RepoError};

use crate::OrderError;

/// Whether an order may move from `from` to `to`.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    matches!(
        (from, to),
        (Paid, Processing | Cancelled | Refunded)
            | (Processing, Shipped | Cancelled | Refunded)
            | (Shipped, Delivered | Refunded)
            | (Delivered, Refunded)
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub order: Order,
    pub previous: OrderStatus,
    /// Commissions clawed back by this change
    pub reversed: Vec<Commission>,
}

/// Manages order lifecycle and state transitions
pub struct OrderLifecycle {
    orders: Arc<dyn OrderRepository>,
    commissions: Arc<CommissionService>,
}

impl OrderLifecycle {
    pub fn new(orders: Arc<dyn OrderRepository>, commissions: Arc<CommissionService>) -> Self {
        Self { orders, commissions }
    }

    /// Move an order to `to`. Cancelling or refunding reverses its commissions.
    pub async fn transition(&self, order_id: Uuid, to: OrderStatus) -> Result<StatusChange, OrderError> {
        let mut order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;

        let previous = order.status;
        if !can_transition(previous, to) {
            return Err(OrderError::InvalidTransition { from: previous, to });
        }

        match self.orders.update_status(order_id, previous, to).await {
            Ok(()) => {}
            Err(RepoError::Conflict(_)) => {
                // Someone else moved the order after we read it
                let from = match self.orders.get_order(order_id).await? {
                    Some(current) => current.status,
                    None => return Err(OrderError::NotFound(order_id)),
                };
                return Err(OrderError::InvalidTransition { from, to });
            }
            Err(e) => return Err(e.into()),
        }
        order.update_status(to);
        info!(%order_id, from = previous.as_str(), to = to.as_str(), "Order status changed");

        let reversed = if to.reverses_commissions() {
            let reversed = self.commissions.reverse_for_order(&order).await?;
            if let Some(fresh) = self.orders.get_order(order_id).await? {
                order = fresh;
            }
            reversed
        } else {
            Vec::new()
        };

        Ok(StatusChange { order, previous, reversed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use crate::creation::tests::{harness, params, policy, seed_pair};
    use tandem_core::repository::LedgerRepository;
    use tandem_core::{CommissionRecordStatus, CommissionStatus};

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;

        assert!(can_transition(Paid, Processing));
        assert!(can_transition(Processing, Shipped));
        assert!(can_transition(Shipped, Delivered));
        assert!(can_transition(Delivered, Refunded));
        assert!(can_transition(Paid, Cancelled));

        assert!(!can_transition(Shipped, Cancelled));
        assert!(!can_transition(Delivered, Processing));
        assert!(!can_transition(Cancelled, Paid));
        assert!(!can_transition(Refunded, Refunded));
        assert!(!can_transition(Paid, Paid));
    }

    #[tokio::test]
    async fn test_order_lifecycle() {
        let h = harness();
        let (sponsor, buyer) = seed_pair(&h.store).await;
        let created = h.service.create_order_from_payment(params(buyer, "pi_life", Some(sponsor)), &policy()).await.unwrap();
        let lifecycle = OrderLifecycle::new(Arc::new(h.store.clone()), h.commissions.clone());
        let order_id = created.order.id;

        // Paid → Processing → Shipped
        lifecycle.transition(order_id, OrderStatus::Processing).await.unwrap();
        let change = lifecycle.transition(order_id, OrderStatus::Shipped).await.unwrap();
        assert_eq!(change.previous, OrderStatus::Processing);
        assert!(change.reversed.is_empty());

        let invalid = lifecycle.transition(order_id, OrderStatus::Cancelled).await;
        assert!(matches!(
            invalid,
            Err(OrderError::InvalidTransition { from: OrderStatus::Shipped, to: OrderStatus::Cancelled })
        ));

        // Shipped → Refunded claws the commission back
        let refund = lifecycle.transition(order_id, OrderStatus::Refunded).await.unwrap();
        assert_eq!(refund.reversed.len(), 1);
        assert_eq!(refund.order.status, OrderStatus::Refunded);
        assert_eq!(refund.order.commission_status, CommissionStatus::Reversed);
        assert_eq!(h.store.get_wallet(sponsor).await.unwrap().unwrap().balance_cents, 0);

        let commissions = h.store.list_commissions_for_order(order_id).await.unwrap();
        assert!(commissions.iter().all(|c| c.status == CommissionRecordStatus::Reversed));
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let h = harness();
        let lifecycle = OrderLifecycle::new(Arc::new(h.store.clone()), h.commissions.clone());
        let missing = Uuid::new_v4();

        let result = lifecycle.transition(missing, OrderStatus::Processing).await;
        assert!(matches!(result, Err(OrderError::NotFound(id)) if id == missing));
    }

    #[tokio::test]
    async fn test_refund_closes_failed_commissions() {
        let h = harness();
        let (sponsor, buyer) = seed_pair(&h.store).await;
        let lifecycle = OrderLifecycle::new(Arc::new(h.store.clone()), h.commissions.clone());

        h.ledger.failing.store(true, Ordering::SeqCst);
        let created = h.service.create_order_from_payment(params(buyer, "pi_refund", Some(sponsor)), &policy()).await.unwrap();
        assert_eq!(created.order.commission_status, CommissionStatus::Failed);
        h.ledger.failing.store(false, Ordering::SeqCst);

        let refund = lifecycle.transition(created.order.id, OrderStatus::Refunded).await.unwrap();

        assert!(refund.reversed.is_empty());
        assert_eq!(refund.order.commission_status, CommissionStatus::Skipped);
        assert!(h.store.get_wallet(sponsor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_status_write_is_refused() {
        let h = harness();
        let (sponsor, buyer) = seed_pair(&h.store).await;
        let created = h.service.create_order_from_payment(params(buyer, "pi_stale", Some(sponsor)), &policy()).await.unwrap();
        let lifecycle = OrderLifecycle::new(Arc::new(h.store.clone()), h.commissions.clone());
        let order_id = created.order.id;

        lifecycle.transition(order_id, OrderStatus::Refunded).await.unwrap();

        // A writer that still believes the order is paid cannot resurrect it
        let stale = h.store.update_status(order_id, OrderStatus::Paid, OrderStatus::Processing).await;
        assert!(matches!(stale, Err(RepoError::Conflict(_))));
        assert_eq!(h.store.get_order(order_id).await.unwrap().unwrap().status, OrderStatus::Refunded);
    }
}
