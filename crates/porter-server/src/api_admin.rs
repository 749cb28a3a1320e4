//! Admin API for trust-store administration.
//!
//! Everything here sits behind the admin bearer token. Unlike the public
//! surface, these handlers return real error detail — the operator is
//! authenticated and needs it.

use crate::{knock_log, AppState};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use porter_trust::{store, AddPeerRequest, Peer, PeerKey, TrustStoreError};
use porter_types::PeerStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<TrustStoreError> for ApiError {
    fn from(e: TrustStoreError) -> Self {
        match e {
            TrustStoreError::NotFound(_) | TrustStoreError::UnknownKey { .. } => {
                ApiError::NotFound(e.to_string())
            }
            TrustStoreError::AlreadyExists(_)
            | TrustStoreError::Conflict(_)
            | TrustStoreError::IllegalTransition { .. } => ApiError::Conflict(e.to_string()),
            TrustStoreError::InvalidPeerId(_) => ApiError::BadRequest(e.to_string()),
            TrustStoreError::Codec(_) | TrustStoreError::Kv(_) => {
                ApiError::InternalServerError(e.to_string())
            }
        }
    }
}

/// Runs a blocking trust-store call on the blocking pool.
async fn with_conn<T, F>(state: Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T, TrustStoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        f(&conn).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
}

/// Request body for `POST /peers`.
#[derive(Debug, Deserialize)]
pub struct AddPeerBody {
    /// Domain identity of the new peer.
    pub peer_id: String,
    /// Human label.
    pub display_name: String,
    /// Delivery endpoints.
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Initial bearer secret. Digested on arrival; never stored.
    pub credential: String,
    /// Operator labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Operator annotations.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Request body for `POST /peers/{id}/rotate`.
#[derive(Debug, Deserialize)]
pub struct RotateBody {
    /// The new bearer secret.
    pub credential: String,
    /// Key to move into the retiring overlap, if any.
    pub old_key_id: Option<String>,
}

/// Request body for `POST /peers/{id}/downgrade`.
#[derive(Debug, Deserialize)]
pub struct DowngradeBody {
    /// `false`: active → pending. `true`: active → revoked.
    #[serde(default)]
    pub hard: bool,
}

/// Request body for `POST /peers/{id}/cleanup`.
#[derive(Debug, Deserialize)]
pub struct CleanupBody {
    /// Only retiring keys older than this many days are removed.
    #[serde(default = "default_cleanup_days")]
    pub older_than_days: u32,
}

fn default_cleanup_days() -> u32 {
    7
}

#[derive(Debug, Deserialize)]
pub struct ListPeersQuery {
    /// Optional status filter: `pending`, `active`, or `revoked`.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecayQuery {
    /// Staleness threshold in days. Defaults to 30.
    pub threshold_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct KnocksQuery {
    /// Maximum records to return. Defaults to 100.
    pub limit: Option<usize>,
}

/// A peer plus its key set, for single-peer reads.
#[derive(Debug, Serialize)]
pub struct PeerDetail {
    #[serde(flatten)]
    pub peer: Peer,
    pub keys: Vec<PeerKey>,
}

/// Handler for `GET /peers`.
pub async fn list_peers_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ListPeersQuery>,
) -> Result<Json<Vec<Peer>>, ApiError> {
    let filter = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            PeerStatus::parse(raw)
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        ),
    };
    let peers = with_conn(state, move |conn| store::list_peers(conn, filter)).await?;
    Ok(Json(peers))
}

/// Handler for `POST /peers`.
pub async fn add_peer_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<AddPeerBody>,
) -> Result<Response, ApiError> {
    if body.credential.len() < 16 {
        return Err(ApiError::BadRequest(
            "credential must be at least 16 characters".to_string(),
        ));
    }
    let peer = with_conn(state, move |conn| {
        store::add_peer(
            conn,
            AddPeerRequest {
                peer_id: body.peer_id,
                display_name: body.display_name,
                endpoints: body.endpoints,
                credential: body.credential,
                labels: body.labels,
                annotations: body.annotations,
            },
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(peer)).into_response())
}

/// Handler for `GET /peers/{id}`.
pub async fn get_peer_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(peer_id): Path<String>,
) -> Result<Json<PeerDetail>, ApiError> {
    let detail = with_conn(state, move |conn| {
        let peer = store::get_peer(conn, &peer_id)?
            .ok_or(TrustStoreError::NotFound(peer_id.clone()))?;
        let keys = store::list_keys(conn, &peer_id)?;
        Ok(PeerDetail { peer, keys })
    })
    .await?;
    Ok(Json(detail))
}

/// Handler for `POST /peers/{id}/activate`.
pub async fn activate_peer_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(peer_id): Path<String>,
) -> Result<Json<Peer>, ApiError> {
    let peer = with_conn(state, move |conn| store::activate_peer(conn, &peer_id)).await?;
    Ok(Json(peer))
}

/// Handler for `POST /peers/{id}/revoke`.
pub async fn revoke_peer_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(peer_id): Path<String>,
) -> Result<Json<Peer>, ApiError> {
    let peer = with_conn(state, move |conn| store::revoke_peer(conn, &peer_id)).await?;
    Ok(Json(peer))
}

/// Handler for `POST /peers/{id}/rotate`.
pub async fn rotate_key_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(peer_id): Path<String>,
    Json(body): Json<RotateBody>,
) -> Result<Json<porter_trust::KeyRotation>, ApiError> {
    if body.credential.len() < 16 {
        return Err(ApiError::BadRequest(
            "credential must be at least 16 characters".to_string(),
        ));
    }
    let rotation = with_conn(state, move |conn| {
        store::rotate_key(conn, &peer_id, &body.credential, body.old_key_id.as_deref())
    })
    .await?;
    Ok(Json(rotation))
}

/// Handler for `POST /peers/{id}/downgrade`.
pub async fn downgrade_peer_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(peer_id): Path<String>,
    Json(body): Json<DowngradeBody>,
) -> Result<Json<Peer>, ApiError> {
    let peer =
        with_conn(state, move |conn| store::downgrade_trust(conn, &peer_id, body.hard)).await?;
    Ok(Json(peer))
}

/// Handler for `POST /peers/{id}/cleanup` — removes retiring keys whose
/// overlap window has passed.
pub async fn cleanup_keys_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(peer_id): Path<String>,
    Json(body): Json<CleanupBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = with_conn(state, move |conn| {
        store::cleanup_retiring_keys(conn, &peer_id, body.older_than_days)
    })
    .await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

/// Handler for `GET /peers/decay` — advisory staleness report.
pub async fn decay_report_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<DecayQuery>,
) -> Result<Json<Vec<porter_trust::StalenessEntry>>, ApiError> {
    let threshold = query.threshold_days.unwrap_or(30);
    let report = with_conn(state, move |conn| store::check_staleness(conn, threshold)).await?;
    Ok(Json(report))
}

/// Handler for `GET /knocks` — recent knock audit records, newest first.
pub async fn recent_knocks_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<KnocksQuery>,
) -> Result<Json<Vec<knock_log::KnockRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(100).min(1000);
    let records = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        knock_log::recent(&conn, limit)
            .map_err(|e| ApiError::InternalServerError(e.to_string()))
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;
    Ok(Json(records))
}
