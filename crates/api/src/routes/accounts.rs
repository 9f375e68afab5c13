use axum::routing::{get, post};
use axum::Router;

use crate::handlers::accounts;
use crate::state::AppState;

/// Routes mounted at `/accounts`.
///
/// ```text
/// POST   /                          -> create
/// GET    /{id}                      -> get_by_id
/// POST   /{id}/receipt/{amount}     -> receipt
/// POST   /{id}/withdraw/{amount}    -> withdraw
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(accounts::create))
        .route("/{id}", get(accounts::get_by_id))
        .route("/{id}/receipt/{amount}", post(accounts::receipt))
        .route("/{id}/withdraw/{amount}", post(accounts::withdraw))
}
