use std::sync::Arc;
use serde::Serialize;
use tracing::{info, warn};

use tandem_commission::{CommissionPlan, CommissionService};
use tandem_core::repository::OrderRepository;
use tandem_core::CommissionStatus;

use crate::OrderError;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct RetrySummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Orders cancelled or refunded before they were credited
    pub closed: usize,
    /// Commission rows credited across the batch
    pub credited: usize,
    pub credited_cents: i64,
}

/// Re-runs commissions for orders left `pending` or `failed`.
pub struct CommissionRetrier {
    orders: Arc<dyn OrderRepository>,
    commissions: Arc<CommissionService>,
}

impl CommissionRetrier {
    pub fn new(orders: Arc<dyn OrderRepository>, commissions: Arc<CommissionService>) -> Self {
        Self { orders, commissions }
    }

    pub async fn run_once(&self, limit: i64, plan: &CommissionPlan) -> Result<RetrySummary, OrderError> {
        let backlog = self
            .orders
            .list_by_commission_status(&[CommissionStatus::Pending, CommissionStatus::Failed], limit)
            .await?;

        let mut summary = RetrySummary::default();
        for order in backlog {
            summary.attempted += 1;
            match self.commissions.process_order(&order, plan).await {
                Ok(outcome) if outcome.closed => {
                    summary.closed += 1;
                }
                Ok(outcome) => {
                    summary.succeeded += 1;
                    summary.credited += outcome.commissions.len();
                    summary.credited_cents += outcome.commissions.iter().map(|c| c.amount_cents).sum::<i64>();
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(order_id = %order.id, error = %e, "Commission retry failed");
                    self.orders
                        .update_commission_status(order.id, &[CommissionStatus::Pending], CommissionStatus::Failed)
                        .await?;
                }
            }
        }

        if summary.attempted > 0 {
            info!(
                attempted = summary.attempted,
                succeeded = summary.succeeded,
                failed = summary.failed,
                closed = summary.closed,
                "Commission retry batch finished"
            );
        }
        Ok(summary)
    }
}
