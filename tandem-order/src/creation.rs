use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use tandem_commission::{CommissionOutcome, CommissionPlan, CommissionService};
use tandem_core::repository::OrderRepository;
use tandem_core::{AppSettings, CommissionStatus, Order, OrderItem, RepoError};
use tandem_shared::Cents;

use crate::referral::{AffiliateRef, Attribution, ReferralValidator};
use crate::{validation_issues, OrderError};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: i32,
    #[validate(range(min = 0))]
    pub unit_price_cents: i64,
}

/// A settled payment, as handed over by the gateway webhook
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "subtotal_matches_items", skip_on_field_errors = false))]
pub struct CreateOrderParams {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 40))]
    pub gateway: String,
    #[validate(length(min = 1, max = 255))]
    pub gateway_transaction_id: String,
    #[validate(length(equal = 3))]
    pub currency: String,
    #[validate(length(min = 1))]
    #[validate]
    pub items: Vec<NewOrderItem>,
    #[validate(range(min = 0))]
    pub subtotal_cents: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub shipping_cents: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub tax_cents: i64,
    #[serde(default)]
    pub shipping_address: serde_json::Value,
    #[serde(default)]
    pub affiliate_id: Option<Uuid>,
    #[serde(default)]
    pub referral_code: Option<String>,
}

fn subtotal_matches_items(params: &CreateOrderParams) -> Result<(), ValidationError> {
    let sum = params.items.iter().try_fold(0 as Cents, |acc, item| {
        item.unit_price_cents
            .checked_mul(item.quantity as Cents)
            .and_then(|line| acc.checked_add(line))
    });
    if sum == Some(params.subtotal_cents) {
        Ok(())
    } else {
        Err(ValidationError::new("subtotal_mismatch"))
    }
}

/// Knobs read from app settings for each order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderPolicy {
    /// Reject the order on a bad referral instead of dropping the referral
    pub strict_referrals: bool,
    pub plan: CommissionPlan,
}

impl From<&AppSettings> for OrderPolicy {
    fn from(settings: &AppSettings) -> Self {
        Self {
            strict_referrals: settings.strict_referrals,
            plan: CommissionPlan::from(settings),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommissionRun {
    Completed(CommissionOutcome),
    /// The order stands; the retrier picks it up later
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedOrder {
    pub order: Order,
    pub attribution: Attribution,
    pub commission: CommissionRun,
}

/// Turns a confirmed payment into an order and pays its upline.
///
/// The order is the source of truth: once it is stored, nothing that
/// happens in the commission step can undo it.
pub struct OrderCreationService {
    orders: Arc<dyn OrderRepository>,
    referrals: ReferralValidator,
    commissions: Arc<CommissionService>,
}

impl OrderCreationService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        referrals: ReferralValidator,
        commissions: Arc<CommissionService>,
    ) -> Self {
        Self { orders, referrals, commissions }
    }

    /// Id of the order already created for this gateway transaction, if any.
    pub async fn order_exists_for_transaction(&self, gateway_transaction_id: &str) -> Result<Option<Uuid>, OrderError> {
        Ok(self
            .orders
            .find_by_transaction(gateway_transaction_id)
            .await?
            .map(|o| o.id))
    }

    pub async fn create_order_from_payment(
        &self,
        params: CreateOrderParams,
        policy: &OrderPolicy,
    ) -> Result<CreatedOrder, OrderError> {
        params
            .validate()
            .map_err(|e| OrderError::Validation(validation_issues(&e)))?;

        let reference = AffiliateRef {
            affiliate_id: params.affiliate_id,
            referral_code: params.referral_code.clone(),
        };
        let attribution = match self.referrals.validate(params.user_id, &reference).await {
            Ok(attribution) => attribution,
            Err(e) if e.is_rejection() && !policy.strict_referrals => {
                warn!(user_id = %params.user_id, error = %e, "Dropping rejected referral");
                Attribution::Unattributed
            }
            Err(e) => return Err(e.into()),
        };

        let mut order = Order::new_paid(
            params.user_id,
            params.gateway,
            params.gateway_transaction_id,
            params.currency.to_uppercase(),
        );
        let invalid = |e: tandem_core::CoreError| OrderError::Validation(vec![e.to_string()]);
        for item in params.items {
            let line = OrderItem::new(order.id, item.product_id, item.name, item.quantity, item.unit_price_cents)
                .map_err(invalid)?;
            order.add_item(line).map_err(invalid)?;
        }
        order.set_charges(params.shipping_cents, params.tax_cents).map_err(invalid)?;
        order.shipping_address = params.shipping_address;
        order.affiliate_id = attribution.affiliate_id();

        match self.orders.create_order(&order).await {
            Ok(()) => {}
            Err(RepoError::Conflict(_)) => {
                return Err(OrderError::DuplicateTransaction(order.gateway_transaction_id));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            total_cents = order.total_cents,
            affiliate_id = ?order.affiliate_id,
            "Order created from payment"
        );

        let commission = match self.commissions.process_order(&order, &policy.plan).await {
            Ok(outcome) => {
                order.commission_status = outcome.status;
                CommissionRun::Completed(outcome)
            }
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Commission calculation failed, order kept");
                match self
                    .orders
                    .update_commission_status(order.id, &[CommissionStatus::Pending], CommissionStatus::Failed)
                    .await
                {
                    Ok(_) => {}
                    Err(mark) => error!(order_id = %order.id, error = %mark, "Could not flag order for commission retry"),
                }
                if let Some(stored) = self.orders.get_order(order.id).await.ok().flatten() {
                    order = stored;
                }
                CommissionRun::Failed { error: e.to_string() }
            }
        };

        Ok(CreatedOrder { order, attribution, commission })
    }
}
