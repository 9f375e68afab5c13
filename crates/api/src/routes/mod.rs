pub mod accounts;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /accounts                              create
/// /accounts/{id}                         get
/// /accounts/{id}/receipt/{amount}        deposit and wait (POST)
/// /accounts/{id}/withdraw/{amount}       withdraw and wait (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/accounts", accounts::router())
}
