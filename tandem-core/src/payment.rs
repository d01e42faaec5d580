use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use tandem_shared::Cents;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

/// A charge as the payment provider reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayTransaction {
    pub id: String,
    pub user_id: Option<Uuid>,
    pub amount_cents: Cents,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provider name stored on orders, e.g. `stripe`
    fn name(&self) -> &str;

    /// Look a transaction up with the provider
    async fn fetch_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<GatewayTransaction, Box<dyn std::error::Error + Send + Sync>>;
}

/// Gateway for local development and tests.
///
/// Transaction ids are `mock_<user uuid>_<amount cents>`; anything else is
/// reported as failed.
pub struct MockPaymentGateway;

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<GatewayTransaction, Box<dyn std::error::Error + Send + Sync>> {
        let parsed = transaction_id
            .strip_prefix("mock_")
            .and_then(|rest| rest.rsplit_once('_'))
            .and_then(|(user, amount)| Some((Uuid::parse_str(user).ok()?, amount.parse::<Cents>().ok()?)));

        let (user_id, amount_cents, status) = match parsed {
            Some((user, amount)) => (Some(user), amount, PaymentStatus::Succeeded),
            None => (None, 0, PaymentStatus::Failed),
        };

        tracing::debug!(transaction_id, ?status, "Mock gateway lookup");

        Ok(GatewayTransaction {
            id: transaction_id.to_string(),
            user_id,
            amount_cents,
            currency: "USD".to_string(),
            status,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_gateway_decodes_transaction_id() {
        let user = Uuid::new_v4();
        let tx = MockPaymentGateway
            .fetch_transaction(&format!("mock_{}_2500", user))
            .await
            .unwrap();
        assert_eq!(tx.status, PaymentStatus::Succeeded);
        assert_eq!(tx.user_id, Some(user));
        assert_eq!(tx.amount_cents, 2500);

        let bad = MockPaymentGateway.fetch_transaction("pi_123").await.unwrap();
        assert_eq!(bad.status, PaymentStatus::Failed);
    }
}
