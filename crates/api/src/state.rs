use crate::engine::settlement::Settler;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the pool and settler are reference-counted internally.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: tally_db::DbPool,
    /// Submit-and-wait entry point into the settlement engine.
    pub settler: Settler,
}
