use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde_json::json;

use tandem_core::Order;

/// Builds the back-office fulfillment report
pub struct FulfillmentReport;

impl FulfillmentReport {
    /// One row per order created in `[from, to)`, plus totals per status.
    pub fn build(orders: &[Order], from: DateTime<Utc>, to: DateTime<Utc>) -> serde_json::Value {
        let mut totals: BTreeMap<&'static str, (i64, i64)> = BTreeMap::new();
        let mut rows = Vec::new();

        for order in orders.iter().filter(|o| o.created_at >= from && o.created_at < to) {
            let entry = totals.entry(order.status.as_str()).or_default();
            entry.0 += 1;
            entry.1 += order.total_cents;

            rows.push(json!({
                "order_id": order.id,
                "created_at": order.created_at.to_rfc3339(),
                "user_id": order.user_id,
                "status": order.status,
                "item_count": order.item_count(),
                "total_cents": order.total_cents,
                "currency": order.currency,
            }));
        }

        let by_status: serde_json::Map<String, serde_json::Value> = totals
            .into_iter()
            .map(|(status, (count, cents))| (status.to_string(), json!({ "orders": count, "total_cents": cents })))
            .collect();

        json!({
            "from": from.to_rfc3339(),
            "to": to.to_rfc3339(),
            "generated_at": Utc::now().to_rfc3339(),
            "order_count": rows.len(),
            "rows": rows,
            "totals": by_status,
        })
    }
}
