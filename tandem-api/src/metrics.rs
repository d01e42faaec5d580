use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

use tandem_order::{CommissionRun, CreatedOrder, RetrySummary};

/// Business counters exposed on `/metrics`
pub struct Metrics {
    registry: Registry,
    pub orders_created: IntCounter,
    pub orders_duplicate: IntCounter,
    pub commissions_credited: IntCounter,
    pub commission_cents: IntCounter,
    pub commission_failures: IntCounter,
    pub wallet_recharges: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tandem".to_string()), None)?;

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        Ok(Self {
            orders_created: counter("orders_created_total", "Orders created from payments")?,
            orders_duplicate: counter("orders_duplicate_total", "Payment webhooks for an already processed transaction")?,
            commissions_credited: counter("commissions_credited_total", "Commission rows credited to wallets")?,
            commission_cents: counter("commission_cents_total", "Commission cents credited to wallets")?,
            commission_failures: counter("commission_failures_total", "Commission runs that failed")?,
            wallet_recharges: counter("wallet_recharges_total", "Confirmed wallet recharges")?,
            registry,
        })
    }

    pub fn record_order(&self, created: &CreatedOrder) {
        self.orders_created.inc();
        match &created.commission {
            CommissionRun::Completed(outcome) => {
                self.commissions_credited.inc_by(outcome.commissions.len() as u64);
                let cents: i64 = outcome.commissions.iter().map(|c| c.amount_cents).sum();
                self.commission_cents.inc_by(cents.max(0) as u64);
            }
            CommissionRun::Failed { .. } => self.commission_failures.inc(),
        }
    }

    pub fn record_retry(&self, summary: &RetrySummary) {
        self.commissions_credited.inc_by(summary.credited as u64);
        self.commission_cents.inc_by(summary.credited_cents.max(0) as u64);
        self.commission_failures.inc_by(summary.failed as u64);
    }

    /// Prometheus text exposition
    pub fn render(&self) -> Result<String, anyhow::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
