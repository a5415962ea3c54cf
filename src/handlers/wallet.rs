// src/handlers/wallet.rs

use axum::{Extension, Json, extract::State};
use serde::Deserialize;

use crate::{
    config::CostTable, error::AppError, models::wallet::Wallet, state::AppState, utils::jwt::Claims,
};

#[derive(Debug, Deserialize)]
pub struct AutoDeductRequest {
    pub enabled: bool,
}

pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Wallet>, AppError> {
    let caller = claims.caller();
    let wallet = state.stores.ledger.wallet(caller.user_id).await?;
    Ok(Json(wallet))
}

/// Toggles the silent-deduction preference the credit gate honors.
pub async fn set_auto_deduct(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AutoDeductRequest>,
) -> Result<Json<Wallet>, AppError> {
    let caller = claims.caller();
    state
        .stores
        .ledger
        .set_auto_deduct(caller.user_id, payload.enabled)
        .await?;
    let wallet = state.stores.ledger.wallet(caller.user_id).await?;
    Ok(Json(wallet))
}

/// The configured cost table. Read-only; external surfaces (profile edits,
/// display-name changes) price their actions from here too.
pub async fn get_costs(State(state): State<AppState>) -> Json<CostTable> {
    Json(state.config.costs.clone())
}
