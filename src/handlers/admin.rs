// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        prize::{CreatePrizeRuleRequest, PrizeRule},
        question::{ChapterKey, NewQuestion},
    },
    state::AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct UploadQuestionsRequest {
    #[serde(flatten)]
    #[validate(nested)]
    pub chapter: ChapterKey,
    #[validate(length(min = 1), nested)]
    pub questions: Vec<NewQuestion>,
}

/// Replaces one chapter's question bank.
pub async fn upload_questions(
    State(state): State<AppState>,
    Json(payload): Json<UploadQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut records = Vec::with_capacity(payload.questions.len());
    for question in payload.questions {
        let record = question
            .into_record()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        records.push(record);
    }

    let stored = records.len();
    state
        .stores
        .content
        .put_bank(&payload.chapter, records)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "stored": stored }))))
}

pub async fn list_prize_rules(
    State(state): State<AppState>,
) -> Result<Json<Vec<PrizeRule>>, AppError> {
    let rules = state.stores.rewards.rules().await?;
    Ok(Json(rules))
}

pub async fn create_prize_rule(
    State(state): State<AppState>,
    Json(payload): Json<CreatePrizeRuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let rule = state
        .stores
        .rewards
        .add_rule(
            payload.enabled,
            payload.category,
            payload.min_questions,
            payload.min_percentage,
            payload.reward,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(rule)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreditWalletRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
}

/// Tops up a user's balance (the payment flow itself is external).
pub async fn credit_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(payload): Json<CreditWalletRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let balance = state
        .stores
        .ledger
        .credit(user_id, payload.amount)
        .await?;
    Ok(Json(json!({ "user_id": user_id, "balance": balance })))
}

/// Replays result artifacts whose durable write failed at submit time.
pub async fn flush_sync(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let replayed = state.engine.flush_pending_sync().await;
    Ok(Json(json!({
        "replayed": replayed,
        "pending": state.engine.pending_sync_len(),
    })))
}
