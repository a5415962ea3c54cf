// src/handlers/session.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
    engine::session::{AnswerOutcome, SessionView, StartOutcome, SubmitOutcome, SubmitPrompt},
    error::AppError,
    models::question::ChapterKey,
    state::AppState,
    utils::jwt::Claims,
};

#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    #[serde(flatten)]
    #[validate(nested)]
    pub chapter: ChapterKey,

    /// Timed "premium test" attempt: credit-gated and proctored.
    #[serde(default)]
    pub proctored: bool,

    /// Prize-rule category; defaults to the subject name.
    pub category: Option<String>,

    /// Confirmation round trip for the premium-test charge.
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub enable_auto_deduct: bool,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question_index: usize,
    pub option_index: usize,
}

/// Starts or re-enters the attempt for a chapter. A prior in-progress
/// attempt surfaces as a resume prompt instead of being clobbered.
pub async fn start_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<Json<StartOutcome>, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let outcome = state
        .engine
        .start(
            claims.caller(),
            payload.chapter,
            payload.category,
            payload.proctored,
            payload.confirm,
            payload.enable_auto_deduct,
        )
        .await?;
    Ok(Json(outcome))
}

pub async fn view_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let view = state.engine.view(claims.caller(), &chapter_id).await?;
    Ok(Json(view))
}

pub async fn resume_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let view = state.engine.resume(claims.caller(), &chapter_id).await?;
    Ok(Json(view))
}

pub async fn restart_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let view = state.engine.restart(claims.caller(), &chapter_id).await?;
    Ok(Json(view))
}

/// Records one answer selection. Invalid selections come back with
/// `accepted: false` rather than an error.
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<String>,
    Json(payload): Json<AnswerRequest>,
) -> Result<Json<AnswerOutcome>, AppError> {
    let outcome = state
        .engine
        .select_answer(
            claims.caller(),
            &chapter_id,
            payload.question_index,
            payload.option_index,
        )
        .await?;
    Ok(Json(outcome))
}

pub async fn next_batch(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let view = state.engine.next_batch(claims.caller(), &chapter_id).await?;
    Ok(Json(view))
}

pub async fn prev_batch(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let view = state.engine.prev_batch(claims.caller(), &chapter_id).await?;
    Ok(Json(view))
}

/// One-second heartbeat; the elapsed clock only runs while answering.
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let elapsed = state.engine.tick(claims.caller(), &chapter_id).await?;
    Ok(Json(json!({ "elapsed_seconds": elapsed })))
}

pub async fn request_submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<String>,
) -> Result<Json<SubmitPrompt>, AppError> {
    let prompt = state
        .engine
        .request_submit(claims.caller(), &chapter_id)
        .await?;
    Ok(Json(prompt))
}

pub async fn cancel_submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let view = state
        .engine
        .cancel_submit(claims.caller(), &chapter_id)
        .await?;
    Ok(Json(view))
}

pub async fn confirm_submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<String>,
) -> Result<Json<SubmitOutcome>, AppError> {
    let outcome = state
        .engine
        .confirm_submit(claims.caller(), &chapter_id)
        .await?;
    Ok(Json(outcome))
}

/// Anti-cheat report: loss of foreground focus during a proctored attempt.
/// Force-submits silently; everything else is absorbed as a no-op.
pub async fn report_violation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chapter_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .engine
        .report_violation(claims.caller(), &chapter_id)
        .await?;

    match outcome {
        Some(submission) => Ok(Json(json!({
            "notice": "Test submitted automatically: the assessment window lost focus.",
            "submission": submission,
        }))),
        None => Ok(Json(json!({ "ignored": true }))),
    }
}
