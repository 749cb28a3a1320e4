//! Admin surface tests: bearer gating and the peer lifecycle driven
//! entirely over HTTP.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use porter_db::{create_pool, DbPool, DbRuntimeSettings};
use porter_server::{hook::HookClient, AppState};
use porter_types::GatewayPolicy;
use serde_json::{json, Value};
use std::sync::RwLock;
use tempfile::TempDir;
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "admin-token-for-tests";

fn setup(admin_token: Option<&str>) -> (Router, DbPool, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let pool = create_pool(db_path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        porter_db::run_migrations(&conn).unwrap();
    }

    let state = AppState {
        pool: pool.clone(),
        policy: RwLock::new(GatewayPolicy::default()),
        admin_token: admin_token.map(|t| t.to_string()),
        hook: HookClient::new(None, None, 5).unwrap(),
        public_domain: "b.example".to_string(),
        trust_forwarded_header: false,
    };
    (porter_server::app(state), pool, dir)
}

fn admin_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
        .header("content-type", "application/json");
    match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn add_peer_body(peer_id: &str) -> Value {
    json!({
        "peer_id": peer_id,
        "display_name": "Agent A",
        "endpoints": ["https://a.example/inbox"],
        "credential": "a-long-enough-credential",
        "labels": { "env": "test" },
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn admin_routes_require_the_token() {
    let (app, _pool, _dir) = setup(Some(ADMIN_TOKEN));

    // No token.
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/peers").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong token.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/peers")
                .header("authorization", "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Right token.
    let response = app
        .oneshot(admin_request(Method::GET, "/peers", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_surface_is_disabled_without_a_configured_token() {
    let (app, _pool, _dir) = setup(None);

    let response = app
        .oneshot(admin_request(Method::GET, "/peers", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn peer_lifecycle_over_http() {
    let (app, _pool, _dir) = setup(Some(ADMIN_TOKEN));

    // Create.
    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/peers",
            Some(add_peer_body("a.example")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let peer = body_json(response).await;
    assert_eq!(peer["status"], "pending");
    // The raw credential never appears in any response.
    assert!(!peer.to_string().contains("a-long-enough-credential"));

    // Duplicate create conflicts.
    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/peers",
            Some(add_peer_body("a.example")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Filtered listing.
    let response = app
        .clone()
        .oneshot(admin_request(Method::GET, "/peers?status=pending", None))
        .await
        .unwrap();
    let pending = body_json(response).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);

    // Activate.
    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/peers/a.example/activate",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "active");

    // Detail view includes the key set, digests only.
    let response = app
        .clone()
        .oneshot(admin_request(Method::GET, "/peers/a.example", None))
        .await
        .unwrap();
    let detail = body_json(response).await;
    assert_eq!(detail["keys"].as_array().unwrap().len(), 1);
    assert_eq!(detail["keys"][0]["status"], "active");

    // Rotate against the current key.
    let old_key_id = detail["keys"][0]["key_id"].as_str().unwrap().to_string();
    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/peers/a.example/rotate",
            Some(json!({
                "credential": "the-replacement-credential",
                "old_key_id": old_key_id,
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rotation = body_json(response).await;
    assert_eq!(rotation["overlap_required"], true);

    // Cleanup removes the retiring key once the overlap has passed.
    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/peers/a.example/cleanup",
            Some(json!({ "older_than_days": 0 })),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["removed"], 1);

    // Soft downgrade back to pending.
    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/peers/a.example/downgrade",
            Some(json!({ "hard": false })),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["status"], "pending");

    // Downgrading a non-active peer is an illegal transition.
    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/peers/a.example/downgrade",
            Some(json!({ "hard": false })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Revoke is terminal.
    let response = app
        .clone()
        .oneshot(admin_request(Method::POST, "/peers/a.example/revoke", None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["status"], "revoked");

    let response = app
        .oneshot(admin_request(
            Method::POST,
            "/peers/a.example/activate",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn bad_input_is_rejected_with_detail() {
    let (app, _pool, _dir) = setup(Some(ADMIN_TOKEN));

    // Invalid peer id.
    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/peers",
            Some(add_peer_body("Not A Domain!")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());

    // Short credential.
    let mut body = add_peer_body("a.example");
    body["credential"] = json!("short");
    let response = app
        .clone()
        .oneshot(admin_request(Method::POST, "/peers", Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown peer.
    let response = app
        .clone()
        .oneshot(admin_request(Method::GET, "/peers/ghost.example", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Rotation naming a key the peer does not hold.
    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/peers",
            Some(add_peer_body("a.example")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/peers/a.example/rotate",
            Some(json!({
                "credential": "the-replacement-credential",
                "old_key_id": "k-000099-nothere",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Bad status filter.
    let response = app
        .oneshot(admin_request(Method::GET, "/peers?status=bogus", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn decay_report_flags_silent_peers() {
    let (app, pool, _dir) = setup(Some(ADMIN_TOKEN));

    {
        let conn = pool.get().unwrap();
        porter_trust::store::add_peer(
            &conn,
            porter_trust::AddPeerRequest {
                peer_id: "quiet.example".to_string(),
                display_name: "Quiet".to_string(),
                endpoints: vec![],
                credential: "quiet-peer-credential".to_string(),
                labels: Default::default(),
                annotations: Default::default(),
            },
        )
        .unwrap();
        porter_trust::store::activate_peer(&conn, "quiet.example").unwrap();
    }

    // Never contacted, so any threshold flags it.
    let response = app
        .oneshot(admin_request(
            Method::GET,
            "/peers/decay?threshold_days=30",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    let entries = report.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["peer"]["peer_id"], "quiet.example");
    assert_eq!(entries[0]["reason"], "never_contacted");
}
