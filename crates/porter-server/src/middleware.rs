//! Admin authentication middleware.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::AppState;

/// Constant-time bearer token comparison.
///
/// Length is revealed by the comparison; token values are not.
fn token_matches(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Middleware guarding the admin trust-store surface.
///
/// Requires `Authorization: Bearer <admin token>`. When no admin token is
/// configured the surface is disabled: every request is unauthorized, with
/// no unauthenticated fallback.
pub async fn admin_auth_middleware(
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    let Some(expected) = state.admin_token.as_deref() else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let presented = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !token_matches(presented, expected) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}
