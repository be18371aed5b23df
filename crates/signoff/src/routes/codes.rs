//! Verification code endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use questgate_common::{Gate, IssuedCode, QuestGateError, Redemption};

use super::ApiError;
use super::extract::{ApiJson, ApiPath};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct IssueRequest {
    participant_id: String,
    quest_id: String,
    level_index: u32,
}

/// Issue a code for a gate (facilitator)
pub async fn issue_code(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<IssueRequest>,
) -> Result<Json<IssuedCode>, ApiError> {
    let gate = Gate::new(payload.participant_id, payload.quest_id, payload.level_index);
    let issued = state.codes.issue(gate).await?;
    Ok(Json(issued))
}

#[derive(Serialize)]
pub struct OutstandingResponse {
    code: String,
    display: String,
    expires_at: i64,
    expires_in_secs: i64,
}

/// Show the gate's outstanding code (facilitator)
pub async fn outstanding_code(
    State(state): State<AppState>,
    ApiPath((participant_id, quest_id, level_index)): ApiPath<(String, String, u32)>,
) -> Result<Json<OutstandingResponse>, ApiError> {
    let gate = Gate::new(participant_id, quest_id, level_index);

    let record = state
        .codes
        .outstanding(&gate)
        .await?
        .ok_or_else(|| QuestGateError::NotFound(format!("no outstanding code for {gate}")))?;

    let now = chrono::Utc::now().timestamp();
    Ok(Json(OutstandingResponse {
        display: record.display(),
        expires_in_secs: (record.expires_at - now).max(0),
        expires_at: record.expires_at,
        code: record.code,
    }))
}

/// Withdraw the gate's outstanding code (facilitator)
pub async fn revoke_code(
    State(state): State<AppState>,
    ApiPath((participant_id, quest_id, level_index)): ApiPath<(String, String, u32)>,
) -> Result<StatusCode, ApiError> {
    let gate = Gate::new(participant_id, quest_id, level_index);

    match state.codes.revoke(&gate).await? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(QuestGateError::NotFound(format!("no outstanding code for {gate}")).into()),
    }
}

#[derive(Deserialize)]
pub struct RedeemRequest {
    /// As typed by the participant; case and dashes do not matter
    code: String,
    participant_id: String,
}

/// Redeem a code (participant)
pub async fn redeem_code(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RedeemRequest>,
) -> Result<Json<Redemption>, ApiError> {
    let redemption = state
        .codes
        .redeem(&payload.code, &payload.participant_id)
        .await?;
    Ok(Json(redemption))
}
