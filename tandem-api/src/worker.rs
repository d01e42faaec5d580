use std::time::Duration;
use tracing::{error, info};

use tandem_commission::CommissionPlan;

use crate::state::AppState;

/// Periodically re-runs commissions for orders left `pending` or `failed`.
pub async fn start_commission_retry_worker(state: AppState, every: Duration, batch_size: i64) {
    info!(interval_secs = every.as_secs(), batch_size, "Commission retry worker started");

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = retry_once(&state, batch_size).await {
            error!("Commission retry pass failed: {:#}", e);
        }
    }
}

async fn retry_once(state: &AppState, batch_size: i64) -> anyhow::Result<()> {
    let settings = state.app_settings().await?;
    let summary = state.retrier.run_once(batch_size, &CommissionPlan::from(&settings)).await?;
    state.metrics.record_retry(&summary);
    Ok(())
}
