#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tally_core::ledger::LedgerStore;
use tally_db::PgLedgerStore;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use tally_api::config::ServerConfig;
use tally_api::engine::dispatch::DispatchTable;
use tally_api::engine::settlement::Settler;
use tally_api::router::build_app_router;
use tally_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        dispatch_shards: 4,
        ..ServerConfig::default()
    }
}

/// Build a settler over a Postgres ledger store backed by `pool`.
pub fn test_settler(pool: &PgPool, shutdown: CancellationToken) -> Settler {
    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(pool.clone()));
    Settler::new(store, DispatchTable::new(test_config().dispatch_shards), shutdown)
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    let settler = test_settler(&pool, CancellationToken::new());

    let state = AppState { pool, settler };

    build_app_router(state, &config)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create an account through the API and return its id.
pub async fn create_account(app: Router) -> i64 {
    let json = body_json(post(app, "/api/v1/accounts").await).await;
    json["data"]["id"].as_i64().unwrap()
}

/// Read a JSON string field holding a decimal amount.
pub fn decimal(value: &serde_json::Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}
