//! Authenticated message endpoint.
//!
//! Every authentication failure — unknown peer, wrong secret, non-active
//! peer — yields the same 401. The response contract is "received", not
//! "processed": liveness recording and hook forwarding are best-effort and
//! never change the sender's response.

use crate::AppState;
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use porter_trust::{store, CredentialCheck};
use porter_types::{HookNotification, InboxMessage};
use serde_json::json;
use std::sync::Arc;

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "status": "unauthorized" })),
    )
        .into_response()
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "status": "rejected" }))).into_response()
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "status": "error" }))).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
}

/// Handler for `POST /inbox`.
pub async fn inbox_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    // Credential first: an unparseable body with no valid bearer is a 401,
    // not a hint about the body.
    let Some(token) = bearer_token(&headers) else {
        return unauthorized();
    };

    let message: InboxMessage = match serde_json::from_str(&body) {
        Ok(message) => message,
        Err(_) => return bad_request(),
    };

    // The sender's identity is the `from` field; without it the credential
    // cannot be attributed to any peer.
    let Some(from) = message.from.clone() else {
        return unauthorized();
    };

    let pool = state.pool.clone();
    let from_clone = from.clone();
    let check = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| e.to_string())?;
        store::validate_credential(&conn, &from_clone, &token).map_err(|e| e.to_string())
    })
    .await;

    let check = match check {
        Ok(Ok(check)) => check,
        Ok(Err(e)) => {
            tracing::error!(from = %from, "credential check failed: {}", e);
            return internal_error();
        }
        Err(e) => {
            tracing::error!("credential check task join error: {}", e);
            return internal_error();
        }
    };

    let key_id = match check {
        CredentialCheck::Valid { key_id, key_status } => {
            tracing::debug!(from = %from, key_id = %key_id, key_status = key_status.as_str(), "inbox authenticated");
            key_id
        }
        CredentialCheck::Invalid { reason } => {
            // The reason stays internal; the response is uniform.
            tracing::info!(from = %from, reason = ?reason, "inbox rejected");
            return unauthorized();
        }
    };

    // Message shape, after auth: `body` is required and bounded.
    let max_body_chars = match state.policy.read() {
        Ok(policy) => policy.max_body_chars,
        Err(_) => return internal_error(),
    };
    match &message.body {
        Some(text) if text.chars().count() <= max_body_chars => {}
        _ => return bad_request(),
    }

    // Liveness, best-effort: a failure here must not block delivery.
    {
        let pool = state.pool.clone();
        let from_clone = from.clone();
        let contact = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| e.to_string())?;
            store::record_contact(&conn, &from_clone).map_err(|e| e.to_string())
        })
        .await;
        match contact {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(from = %from, "failed to record contact: {}", e),
            Err(e) => tracing::warn!("record contact task join error: {}", e),
        }
    }

    tracing::info!(from = %from, key_id = %key_id, "message delivered");

    state.hook.forward(HookNotification {
        kind: "message".into(),
        from: Some(from.clone()),
        to: message.to.clone(),
        vouched: false,
        payload: serde_json::to_value(&message).unwrap_or(serde_json::Value::Null),
    });

    (
        StatusCode::OK,
        Json(json!({
            "status": "delivered",
            "from": from,
            "type": message.message_type,
        })),
    )
        .into_response()
}
