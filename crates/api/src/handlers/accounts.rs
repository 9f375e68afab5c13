//! Handlers for the `/accounts` resource.
//!
//! Balance changes never touch the `accounts` row directly: they are queued
//! and settled through [`Settler`](crate::engine::settlement::Settler), and
//! the response is only sent once the queued adjustment has been applied
//! or rejected.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tally_core::error::CoreError;
use tally_core::ledger::DrainReport;
use tally_core::validation::{parse_account_id, parse_amount};
use tally_db::models::account::{Account, AccountOverview};
use tally_db::repositories::AccountRepo;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/accounts
pub async fn create(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<DataResponse<Account>>)> {
    let account = AccountRepo::create(&state.pool).await?;
    tracing::info!(account_id = account.id, "Account created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: account })))
}

/// GET /api/v1/accounts/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<AccountOverview>>> {
    let id = parse_account_id(&id)?;
    let account = AccountRepo::overview(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Account",
            id,
        }))?;
    Ok(Json(DataResponse { data: account }))
}

/// POST /api/v1/accounts/{id}/receipt/{amount}
///
/// Credits `amount` and waits until it is reflected in the balance.
pub async fn receipt(
    State(state): State<AppState>,
    Path((id, amount)): Path<(String, String)>,
) -> AppResult<Json<DataResponse<DrainReport>>> {
    let id = parse_account_id(&id)?;
    let amount = parse_amount(&amount)?;
    let report = state.settler.deposit(id, amount).await?;
    Ok(Json(DataResponse { data: report }))
}

/// POST /api/v1/accounts/{id}/withdraw/{amount}
///
/// Debits `amount` and waits for settlement. Fails with 422 when the
/// account's queue would take the balance below zero.
pub async fn withdraw(
    State(state): State<AppState>,
    Path((id, amount)): Path<(String, String)>,
) -> AppResult<Json<DataResponse<DrainReport>>> {
    let id = parse_account_id(&id)?;
    let amount = parse_amount(&amount)?;
    let report = state.settler.withdraw(id, amount).await?;
    Ok(Json(DataResponse { data: report }))
}
