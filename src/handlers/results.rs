// src/handlers/results.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    engine::{
        credits::{self, ActionClass, GateInput, GateOutcome},
        scoring,
    },
    error::AppError,
    models::result::{HistorySummary, ResultArtifact},
    state::AppState,
    utils::jwt::Claims,
};

/// Confirmation fields shared by every gated result action.
#[derive(Debug, Default, Deserialize)]
pub struct GateBody {
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub enable_auto_deduct: bool,
}

impl GateBody {
    fn input(&self, claims: &Claims) -> GateInput {
        let caller = claims.caller();
        GateInput {
            user_id: caller.user_id,
            is_admin: caller.is_admin,
            confirm: self.confirm,
            enable_auto_deduct: self.enable_auto_deduct,
        }
    }
}

pub async fn list_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<HistorySummary>>, AppError> {
    let caller = claims.caller();
    let summaries = state.stores.history.list(caller.user_id).await?;
    Ok(Json(summaries))
}

pub async fn get_result(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResultArtifact>, AppError> {
    let artifact = fetch_artifact(&state, &claims, id).await?;
    Ok(Json(artifact))
}

/// Re-opens a historical result behind the credit gate.
pub async fn reopen_result(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(body): Json<GateBody>,
) -> Result<impl IntoResponse, AppError> {
    // The artifact must exist before anything is charged.
    let artifact = fetch_artifact(&state, &claims, id).await?;

    let gate = credits::authorize(
        state.stores.ledger.as_ref(),
        &state.config.costs,
        &ActionClass::HistoryReopen,
        &body.input(&claims),
    )
    .await?;

    match gate {
        GateOutcome::ConfirmationRequired { .. } => Ok(Json(json!(gate))),
        GateOutcome::Proceed { charged } => Ok(Json(json!({
            "charged": charged,
            "result": artifact,
        }))),
    }
}

/// Unlocks the deep-analysis report for one attempt.
///
/// The report is written at most once; later unlock attempts return the
/// cached text at zero cost. Subscribers pay a question-count-scaled price.
pub async fn unlock_analysis(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(body): Json<GateBody>,
) -> Result<impl IntoResponse, AppError> {
    let caller = claims.caller();
    let artifact = fetch_artifact(&state, &claims, id).await?;

    if let Some(report) = artifact.ultra_analysis_report.as_deref() {
        return Ok(Json(json!({
            "charged": 0,
            "cached": true,
            "report": report,
        })));
    }

    let gate = credits::authorize(
        state.stores.ledger.as_ref(),
        &state.config.costs,
        &ActionClass::DeepAnalysis {
            question_count: artifact.total_questions,
        },
        &body.input(&claims),
    )
    .await?;

    let charged = match gate {
        GateOutcome::ConfirmationRequired { .. } => return Ok(Json(json!(gate))),
        GateOutcome::Proceed { charged } => charged,
    };

    let report = scoring::compose_analysis(&artifact);

    // Deduction and grant are one logical step: any failure to attach the
    // report refunds the charge.
    match state
        .stores
        .history
        .attach_analysis(caller.user_id, id, &report)
        .await
    {
        Ok(true) => Ok(Json(json!({
            "charged": charged,
            "cached": false,
            "report": report,
        }))),
        Ok(false) => {
            // Raced with an earlier unlock: serve the stored report for free.
            credits::refund(state.stores.ledger.as_ref(), caller.user_id, charged).await;
            let artifact = fetch_artifact(&state, &claims, id).await?;
            Ok(Json(json!({
                "charged": 0,
                "cached": true,
                "report": artifact.ultra_analysis_report,
            })))
        }
        Err(e) => {
            credits::refund(state.stores.ledger.as_ref(), caller.user_id, charged).await;
            Err(e)
        }
    }
}

/// Grants audio narration of an unlocked analysis report. Playback itself
/// happens client-side; this endpoint only gates and hands over the text.
pub async fn narrate_analysis(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(body): Json<GateBody>,
) -> Result<impl IntoResponse, AppError> {
    let artifact = fetch_artifact(&state, &claims, id).await?;

    let Some(report) = artifact.ultra_analysis_report else {
        return Err(AppError::BadRequest(
            "unlock the analysis report before requesting narration".to_string(),
        ));
    };

    let gate = credits::authorize(
        state.stores.ledger.as_ref(),
        &state.config.costs,
        &ActionClass::AudioNarration,
        &body.input(&claims),
    )
    .await?;

    match gate {
        GateOutcome::ConfirmationRequired { .. } => Ok(Json(json!(gate))),
        GateOutcome::Proceed { charged } => Ok(Json(json!({
            "charged": charged,
            "narration_text": report,
        }))),
    }
}

async fn fetch_artifact(
    state: &AppState,
    claims: &Claims,
    id: Uuid,
) -> Result<ResultArtifact, AppError> {
    let caller = claims.caller();
    state
        .stores
        .history
        .get(caller.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("result not found".to_string()))
}
