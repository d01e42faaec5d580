use axum::{
    extract::Request,
    http::Method,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Cookie, HeaderMapExt};

use crate::error::AppError;

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_COOKIE: &str = "csrf_token";

/// Double-submit check: mutating requests must echo the `csrf_token`
/// cookie in the `x-csrf-token` header.
pub async fn csrf_guard(req: Request, next: Next) -> Result<Response, AppError> {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok(next.run(req).await);
    }

    let header = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty());
    let cookie = req.headers().typed_get::<Cookie>();
    let valid = match (header, cookie.as_ref().and_then(|c| c.get(CSRF_COOKIE))) {
        (Some(h), Some(c)) => h == c,
        _ => false,
    };

    if !valid {
        tracing::debug!(path = %req.uri().path(), "CSRF token missing or mismatched");
        return Err(AppError::AuthorizationError("Invalid CSRF token".to_string()));
    }

    Ok(next.run(req).await)
}
