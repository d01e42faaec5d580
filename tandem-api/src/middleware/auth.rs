use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tandem_core::ProfileRole;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// The caller, as established by a verified token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: ProfileRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ProfileRole::Admin
    }
}

fn authenticate(state: &AppState, req: &Request) -> Result<AuthUser, AppError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(format!("Invalid token: {}", e)))?;

    let user_id = Uuid::parse_str(&token_data.claims.sub)
        .map_err(|_| AppError::AuthenticationError("Invalid token subject".to_string()))?;
    let role = token_data
        .claims
        .role
        .to_lowercase()
        .parse::<ProfileRole>()
        .map_err(|_| AppError::AuthenticationError("Invalid token role".to_string()))?;

    Ok(AuthUser { user_id, role })
}

// ============================================================================
// Member Authentication Middleware
// ============================================================================

pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let user = authenticate(&state, &req)?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

// ============================================================================
// Admin Authentication Middleware
// ============================================================================

/// Runs after `require_auth`; rejects anyone without the admin role.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .copied()
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    if !user.is_admin() {
        tracing::warn!(user_id = %user.user_id, "Admin route denied");
        return Err(AppError::AuthorizationError("Admin role required".to_string()));
    }

    Ok(next.run(req).await)
}
