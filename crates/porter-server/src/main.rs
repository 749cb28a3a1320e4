//! Porter server binary — trust gateway for autonomous agents.
//!
//! Starts an axum HTTP server with structured logging, database
//! initialization, a background purge task, and graceful shutdown on
//! SIGTERM/SIGINT.

use porter_server::{background, config, hook::HookClient, AppState};
use std::net::SocketAddr;
use std::sync::RwLock;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Interval between expired-entry purge sweeps.
const PURGE_INTERVAL_SECONDS: u64 = 3600;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("PORTER_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    if config.admin.token.is_none() {
        tracing::warn!("no admin token configured — admin endpoints will reject all requests");
    }

    // Initialize database
    let pool = porter_db::create_pool(
        &config.database.path,
        porter_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool — check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied = porter_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    let hook = HookClient::new(
        config.hook.url.clone(),
        config.hook.token.clone(),
        config.hook.timeout_seconds,
    )
    .expect("failed to build hook HTTP client");
    if hook.enabled() {
        tracing::info!(url = config.hook.url.as_deref().unwrap_or("-"), "hook forwarding enabled");
    }

    // Background purge of expired knock records and rate-limit windows
    tokio::spawn(background::start_purge_task(
        pool.clone(),
        PURGE_INTERVAL_SECONDS,
    ));

    // Build application
    let state = AppState {
        pool,
        policy: RwLock::new(config.gateway.clone()),
        admin_token: config.admin.token.clone(),
        hook,
        public_domain: config.server.public_domain.clone(),
        trust_forwarded_header: config.server.trust_forwarded_header,
    };
    let app = porter_server::app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, domain = %config.server.public_domain, "starting porter server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    tracing::info!("porter server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
