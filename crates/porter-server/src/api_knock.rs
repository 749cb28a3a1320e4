//! Public introduction endpoint.
//!
//! The knock surface is deliberately opaque: every rejected request gets
//! the same response shape with no field-level detail, so an outside caller
//! cannot distinguish malformed JSON from a missing field from a stale
//! timestamp. The only distinguishable outcome is 429, which is allowed to
//! reveal that the source IP is active.

use crate::{knock_log, knock_log::KnockRecord, rate_limit, AppState};
use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use porter_types::{HookNotification, KnockOutcome, KnockRequest, TrustTier};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// The generic rejection. Byte-identical body for every 400-class outcome.
fn rejected() -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "status": "rejected" }))).into_response()
}

fn rate_limited(retry_after_seconds: u64) -> Response {
    let mut response =
        (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "status": "rejected" }))).into_response();
    if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_seconds.to_string()) {
        response
            .headers_mut()
            .insert(axum::http::header::RETRY_AFTER, value);
    }
    response
}

fn received() -> Response {
    (StatusCode::OK, Json(json!({ "status": "received" }))).into_response()
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "status": "error" }))).into_response()
}

/// Resolves the source address the rate limiter keys on.
///
/// The socket address is authoritative. `X-Forwarded-For` is consulted only
/// when the operator has declared the fronting proxy trustworthy — the
/// header is client-supplied, and honoring it unconditionally would let a
/// direct client pick a fresh rate-limit bucket per request.
pub(crate) fn source_ip(headers: &HeaderMap, addr: SocketAddr, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return forwarded.to_string();
        }
    }
    addr.ip().to_string()
}

fn timestamp_in_window(timestamp: &str, skew_seconds: i64) -> bool {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(ts) => {
            let delta = Utc::now()
                .signed_duration_since(ts.with_timezone(&Utc))
                .num_seconds();
            delta.abs() <= skew_seconds
        }
        Err(_) => false,
    }
}

fn base_record(source: &str, knock: Option<&KnockRequest>) -> KnockRecord {
    KnockRecord {
        source: source.to_string(),
        from: knock.and_then(|k| k.from.clone()),
        to: knock.and_then(|k| k.to.clone()),
        referrer: knock.and_then(|k| k.referrer.clone()),
        nonce: knock.and_then(|k| k.nonce.clone()),
        outcome: KnockOutcome::Rejected,
        reason: None,
        upgrade_token_offered: knock.is_some_and(|k| k.upgrade_token.is_some()),
        vouched: false,
        tier: TrustTier::Unknown,
        received_at: knock_log::now_rfc3339(),
    }
}

/// Appends an audit record, absorbing storage failures; a broken audit
/// trail must not change the response the caller sees.
fn audit(state: &Arc<AppState>, record: KnockRecord) {
    let pool = state.pool.clone();
    let retention_days = match state.policy.read() {
        Ok(policy) => policy.knock_retention_days,
        Err(_) => return,
    };
    tokio::task::spawn_blocking(move || {
        let conn = match pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!("knock audit skipped, no db connection: {}", e);
                return;
            }
        };
        if let Err(e) = knock_log::append(&conn, &record, retention_days) {
            tracing::error!("failed to append knock record: {}", e);
        }
    });
}

/// Handler for `POST /knock`.
///
/// Validation order, short-circuiting at the first failure: body parse,
/// required fields, timestamp window, rate limit. Only then is the knock
/// recorded as accepted and forwarded to the local hook.
pub async fn knock_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let source = source_ip(&headers, addr, state.trust_forwarded_header);

    // 1. Parse. A body that is not a JSON object is still an attempt worth
    // auditing, with nothing but the source to record.
    let knock: KnockRequest = match serde_json::from_str(&body) {
        Ok(knock) => knock,
        Err(_) => {
            tracing::info!(source = %source, reason = "malformed", "knock rejected");
            let mut record = base_record(&source, None);
            record.reason = Some("malformed".into());
            audit(&state, record);
            return rejected();
        }
    };

    // 2. Required fields and type tag.
    if !knock.has_required_fields() {
        tracing::info!(source = %source, reason = "missing_fields", "knock rejected");
        let mut record = base_record(&source, Some(&knock));
        record.reason = Some("missing_fields".into());
        audit(&state, record);
        return rejected();
    }

    // 3. Replay window. The nonce is not globally deduplicated; the
    // timestamp bound is the whole defense.
    let skew = match state.policy.read() {
        Ok(policy) => policy.timestamp_skew_seconds,
        Err(_) => return internal_error(),
    };
    let timestamp = knock.timestamp.as_deref().unwrap_or_default();
    if !timestamp_in_window(timestamp, skew) {
        tracing::info!(source = %source, reason = "bad_timestamp", "knock rejected");
        let mut record = base_record(&source, Some(&knock));
        record.reason = Some("bad_timestamp".into());
        audit(&state, record);
        return rejected();
    }

    // 4. Rate limit, per source IP.
    let limits = match state.policy.read() {
        Ok(policy) => policy.knock_limits.clone(),
        Err(_) => return internal_error(),
    };
    let pool = state.pool.clone();
    let source_clone = source.clone();
    let admission = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| e.to_string())?;
        rate_limit::admit(
            &conn,
            &source_clone,
            limits.max_per_window,
            limits.window_seconds,
        )
        .map_err(|e| e.to_string())
    })
    .await;

    let admission = match admission {
        Ok(Ok(admission)) => admission,
        Ok(Err(e)) => {
            tracing::error!(source = %source, "rate limit check failed: {}", e);
            return internal_error();
        }
        Err(e) => {
            tracing::error!("rate limit task join error: {}", e);
            return internal_error();
        }
    };
    if !admission.admitted {
        tracing::info!(source = %source, reason = "rate_limited", "knock rejected");
        let mut record = base_record(&source, Some(&knock));
        record.reason = Some("rate_limited".into());
        audit(&state, record);
        return rate_limited(limits.window_seconds);
    }

    // 5. Accept. Vouching only checks whether the referrer is an active
    // peer; it raises review priority and changes nothing else.
    let vouched = match &knock.referrer {
        Some(referrer) => {
            let pool = state.pool.clone();
            let referrer = referrer.clone();
            tokio::task::spawn_blocking(move || {
                let conn = pool.get().ok()?;
                porter_trust::store::get_peer(&conn, &referrer).ok().flatten()
            })
            .await
            .ok()
            .flatten()
            .map(|peer| peer.status == porter_types::PeerStatus::Active)
            .unwrap_or(false)
        }
        None => false,
    };

    let tier = TrustTier::after_knock(true, vouched);
    let mut record = base_record(&source, Some(&knock));
    record.outcome = KnockOutcome::Accepted;
    record.vouched = vouched;
    record.tier = tier;
    audit(&state, record);

    tracing::info!(
        source = %source,
        from = knock.from.as_deref().unwrap_or("-"),
        tier = tier.as_str(),
        upgrade_token = knock.upgrade_token.is_some(),
        "knock accepted"
    );

    // Forward the full payload, upgrade token included — the token is for
    // the local agent's eyes, not for storage.
    state.hook.forward(HookNotification {
        kind: "knock".into(),
        from: knock.from.clone(),
        to: knock.to.clone(),
        vouched,
        payload: serde_json::to_value(&knock).unwrap_or(serde_json::Value::Null),
    });

    received()
}

/// Handler for `GET /knock` — static capability descriptor.
pub async fn descriptor_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<serde_json::Value> {
    Json(json!({
        "service": "porter",
        "protocol": "knock",
        "version": 1,
        "domain": state.public_domain,
        "accepts": ["knock"],
    }))
}
