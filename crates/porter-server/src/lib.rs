//! Porter server library logic.

pub mod api_admin;
pub mod api_inbox;
pub mod api_knock;
pub mod background;
pub mod config;
pub mod hook;
pub mod knock_log;
pub mod middleware;
pub mod rate_limit;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use porter_db::DbPool;
use porter_types::GatewayPolicy;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Gateway policy (rate limits, replay window, retention).
    ///
    /// Uses `std::sync::RwLock`: every acquisition is a brief read of a small
    /// struct that never spans an `.await` point.
    pub policy: RwLock<GatewayPolicy>,
    /// Admin bearer token. `None` disables the admin surface entirely.
    pub admin_token: Option<String>,
    /// Outbound hook client for knock and message notifications.
    pub hook: hook::HookClient,
    /// The domain identity this instance answers for.
    pub public_domain: String,
    /// Whether `X-Forwarded-For` may override the socket address as the
    /// rate-limit source. Only safe behind a proxy that rewrites the header.
    pub trust_forwarded_header: bool,
}

/// Maximum request body size (64 KiB). Knocks and inbox messages are small;
/// anything bigger is noise.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/peers",
            get(api_admin::list_peers_handler).post(api_admin::add_peer_handler),
        )
        .route("/peers/decay", get(api_admin::decay_report_handler))
        .route("/peers/{peerId}", get(api_admin::get_peer_handler))
        .route(
            "/peers/{peerId}/activate",
            post(api_admin::activate_peer_handler),
        )
        .route(
            "/peers/{peerId}/revoke",
            post(api_admin::revoke_peer_handler),
        )
        .route(
            "/peers/{peerId}/rotate",
            post(api_admin::rotate_key_handler),
        )
        .route(
            "/peers/{peerId}/downgrade",
            post(api_admin::downgrade_peer_handler),
        )
        .route(
            "/peers/{peerId}/cleanup",
            post(api_admin::cleanup_keys_handler),
        )
        .route("/knocks", get(api_admin::recent_knocks_handler))
        .layer(axum::middleware::from_fn(middleware::admin_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route(
            "/knock",
            post(api_knock::knock_handler).get(api_knock::descriptor_handler),
        )
        .route("/inbox", post(api_inbox::inbox_handler))
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
