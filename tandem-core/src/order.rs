use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use tandem_shared::Cents;

use crate::CoreError;

/// Order status in the fulfillment lifecycle. Orders are born `Paid`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Statuses that claw commissions back.
    pub fn reverses_commissions(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(OrderStatus::Paid),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(CoreError::UnknownVariant { kind: "order status", value: other.to_string() }),
        }
    }
}

/// Where the commission pipeline stands for an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Pending,
    Calculated,
    Failed,
    Skipped,
    Reversed,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Calculated => "calculated",
            CommissionStatus::Failed => "failed",
            CommissionStatus::Skipped => "skipped",
            CommissionStatus::Reversed => "reversed",
        }
    }

    pub fn needs_retry(&self) -> bool {
        matches!(self, CommissionStatus::Pending | CommissionStatus::Failed)
    }

    /// Final status once the order is cancelled or refunded.
    ///
    /// Orders that were never credited end `Skipped`; anything that paid out
    /// ends `Reversed`.
    pub fn closed(self, reversed_any: bool) -> CommissionStatus {
        match self {
            _ if reversed_any => CommissionStatus::Reversed,
            CommissionStatus::Calculated => CommissionStatus::Reversed,
            CommissionStatus::Pending | CommissionStatus::Failed => CommissionStatus::Skipped,
            other => other,
        }
    }
}

impl FromStr for CommissionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommissionStatus::Pending),
            "calculated" => Ok(CommissionStatus::Calculated),
            "failed" => Ok(CommissionStatus::Failed),
            "skipped" => Ok(CommissionStatus::Skipped),
            "reversed" => Ok(CommissionStatus::Reversed),
            other => Err(CoreError::UnknownVariant { kind: "commission status", value: other.to_string() }),
        }
    }
}

/// A paid purchase. The order row is the source of truth; commissions hang off it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gateway: String,
    pub gateway_transaction_id: String,
    pub status: OrderStatus,
    pub subtotal_cents: Cents,
    pub shipping_cents: Cents,
    pub tax_cents: Cents,
    pub total_cents: Cents,
    pub currency: String,
    pub affiliate_id: Option<Uuid>,
    pub shipping_address: serde_json::Value,
    pub commission_status: CommissionStatus,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new_paid(
        user_id: Uuid,
        gateway: String,
        gateway_transaction_id: String,
        currency: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            gateway,
            gateway_transaction_id,
            status: OrderStatus::Paid,
            subtotal_cents: 0,
            shipping_cents: 0,
            tax_cents: 0,
            total_cents: 0,
            currency,
            affiliate_id: None,
            shipping_address: serde_json::Value::Null,
            commission_status: CommissionStatus::Pending,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add an item and keep subtotal/total in step. Nothing changes on overflow.
    pub fn add_item(&mut self, item: OrderItem) -> Result<(), CoreError> {
        let subtotal = self
            .subtotal_cents
            .checked_add(item.total_cents)
            .ok_or_else(|| CoreError::ValidationError("order subtotal overflows".into()))?;
        self.total_cents = total_of(subtotal, self.shipping_cents, self.tax_cents)?;
        self.subtotal_cents = subtotal;
        self.items.push(item);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_charges(&mut self, shipping_cents: Cents, tax_cents: Cents) -> Result<(), CoreError> {
        self.total_cents = total_of(self.subtotal_cents, shipping_cents, tax_cents)?;
        self.shipping_cents = shipping_cents;
        self.tax_cents = tax_cents;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn update_status(&mut self, new_status: OrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    pub fn item_count(&self) -> i64 {
        self.items.iter().map(|i| i.quantity as i64).sum()
    }
}

fn total_of(subtotal: Cents, shipping: Cents, tax: Cents) -> Result<Cents, CoreError> {
    subtotal
        .checked_add(shipping)
        .and_then(|t| t.checked_add(tax))
        .ok_or_else(|| CoreError::ValidationError("order total overflows".into()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: Cents,
    pub total_cents: Cents,
}

impl OrderItem {
    pub fn new(
        order_id: Uuid,
        product_id: Uuid,
        name: String,
        quantity: i32,
        unit_price_cents: Cents,
    ) -> Result<Self, CoreError> {
        let total_cents = unit_price_cents
            .checked_mul(quantity as i64)
            .ok_or_else(|| CoreError::ValidationError(format!("line total for {} overflows", name)))?;
        Ok(Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            name,
            quantity,
            unit_price_cents,
            total_cents,
        })
    }
}

/// Aggregate numbers for the analytics dashboard
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SalesSummary {
    pub order_count: i64,
    pub revenue_cents: Cents,
    pub refunded_count: i64,
}
