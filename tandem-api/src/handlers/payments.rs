use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use tandem_core::CommissionStatus;
use tandem_order::{CreateOrderParams, OrderError, OrderPolicy};

use crate::error::AppError;
use crate::state::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    #[serde(rename = "type")]
    pub type_: String,
    pub data: CreateOrderParams,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub order_id: Option<Uuid>,
    pub commission_status: Option<CommissionStatus>,
}

impl WebhookResponse {
    fn already_processed(order_id: Option<Uuid>) -> Self {
        Self { status: "already_processed", order_id, commission_status: None }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/payments/webhook", post(handle_payment_webhook))
}

/// POST /api/payments/webhook
/// Turns a succeeded payment into an order. Replays answer 200 without side effects.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PaymentWebhook>,
) -> Result<(StatusCode, Json<WebhookResponse>), AppError> {
    let secret = headers.get(WEBHOOK_SECRET_HEADER).and_then(|h| h.to_str().ok());
    if secret != Some(state.webhook_secret.as_str()) {
        return Err(AppError::AuthenticationError("Invalid webhook secret".to_string()));
    }

    let transaction_id = payload.data.gateway_transaction_id.clone();
    info!(event = %payload.type_, %transaction_id, "Received payment webhook");

    if payload.type_ != "payment.succeeded" {
        return Ok((StatusCode::OK, Json(WebhookResponse { status: "ignored", order_id: None, commission_status: None })));
    }

    if let Some(order_id) = state.order_creation.order_exists_for_transaction(&transaction_id).await? {
        state.metrics.orders_duplicate.inc();
        return Ok((StatusCode::OK, Json(WebhookResponse::already_processed(Some(order_id)))));
    }

    let policy = OrderPolicy::from(&state.app_settings().await?);
    match state.order_creation.create_order_from_payment(payload.data, &policy).await {
        Ok(created) => {
            state.metrics.record_order(&created);
            Ok((
                StatusCode::CREATED,
                Json(WebhookResponse {
                    status: "created",
                    order_id: Some(created.order.id),
                    commission_status: Some(created.order.commission_status),
                }),
            ))
        }
        // Lost a race with a concurrent delivery of the same payment
        Err(OrderError::DuplicateTransaction(_)) => {
            state.metrics.orders_duplicate.inc();
            let existing = state.order_creation.order_exists_for_transaction(&transaction_id).await?;
            Ok((StatusCode::OK, Json(WebhookResponse::already_processed(existing))))
        }
        Err(e) => Err(e.into()),
    }
}
