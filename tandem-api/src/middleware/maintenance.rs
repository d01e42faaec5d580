use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use tandem_core::AppSettings;

use crate::error::AppError;
use crate::state::AppState;

/// Paths that stay reachable while the storefront is in maintenance
fn is_exempt(path: &str) -> bool {
    path == "/health"
        || path == "/metrics"
        || path == "/api/payments/webhook"
        || path.starts_with("/api/admin/")
}

pub async fn maintenance_gate(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    if is_exempt(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let settings = state.app_settings().await?;
    if let Some(reason) = closed_reason(&settings) {
        return Err(AppError::ServiceUnavailable(reason.to_string()));
    }

    Ok(next.run(req).await)
}

/// Why the storefront is closed, if it is. Maintenance wins over launch.
fn closed_reason(settings: &AppSettings) -> Option<&'static str> {
    if settings.maintenance_mode {
        Some("Down for maintenance")
    } else if settings.coming_soon {
        Some("Coming soon")
    } else {
        None
    }
}
