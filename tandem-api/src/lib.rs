use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod state;
pub mod worker;

pub use state::{AppState, AuthConfig, Repositories};

use crate::error::AppError;
use crate::middleware::{csrf_guard, maintenance_gate, require_admin, require_auth};

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::USER_AGENT,
            HeaderName::from_static(middleware::csrf::CSRF_HEADER),
        ]);

    // Layers run bottom-up: auth, then the admin check, then CSRF
    let member = Router::new()
        .merge(handlers::profile::routes())
        .merge(handlers::analytics::consent_routes())
        .route_layer(from_fn(csrf_guard))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let admin = Router::new()
        .merge(handlers::admin::routes())
        .merge(handlers::analytics::metrics_routes())
        .route_layer(from_fn(csrf_guard))
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .merge(handlers::payments::routes())
        .merge(member)
        .merge(admin)
        .layer(from_fn_with_state(state.clone(), maintenance_gate))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn prometheus_metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.render()?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
