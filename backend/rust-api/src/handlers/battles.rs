use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::ApiError;
use crate::battle::{Battle, BattleSnapshot};
use crate::extractors::AppJson;
use crate::models::BattleSettings;
use crate::services::AppState;

#[derive(Debug, Serialize)]
pub struct CreateBattleResponse {
    pub id: Uuid,
    pub battle: BattleSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct SelectAnswerRequest {
    pub answer: String,
}

pub(crate) async fn find_battle(state: &AppState, battle_id: &Uuid) -> Result<Battle, ApiError> {
    state
        .battles
        .get(battle_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Battle {} not found", battle_id)))
}

/// POST /api/v1/battles
pub async fn create_battle(
    State(state): State<Arc<AppState>>,
    AppJson(settings): AppJson<BattleSettings>,
) -> Result<(StatusCode, Json<CreateBattleResponse>), ApiError> {
    let (id, battle) = state.battles.create(settings).await?;
    Ok((StatusCode::CREATED, Json(CreateBattleResponse { id, battle })))
}

/// GET /api/v1/battles/{id}
pub async fn get_battle(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
) -> Result<Json<BattleSnapshot>, ApiError> {
    let battle = find_battle(&state, &battle_id).await?;
    Ok(Json(battle.snapshot().await))
}

/// POST /api/v1/battles/{id}/start
pub async fn start_battle(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
    AppJson(settings): AppJson<BattleSettings>,
) -> Result<Json<BattleSnapshot>, ApiError> {
    let battle = find_battle(&state, &battle_id).await?;
    Ok(Json(battle.start(settings).await?))
}

/// POST /api/v1/battles/{id}/select
pub async fn select_answer(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
    AppJson(request): AppJson<SelectAnswerRequest>,
) -> Result<Json<BattleSnapshot>, ApiError> {
    let battle = find_battle(&state, &battle_id).await?;
    Ok(Json(battle.select_answer(request.answer).await?))
}

/// POST /api/v1/battles/{id}/check
pub async fn check_answer(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
) -> Result<Json<BattleSnapshot>, ApiError> {
    let battle = find_battle(&state, &battle_id).await?;
    Ok(Json(battle.check_answer().await?))
}

/// POST /api/v1/battles/{id}/next
pub async fn next_question(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
) -> Result<Json<BattleSnapshot>, ApiError> {
    let battle = find_battle(&state, &battle_id).await?;
    Ok(Json(battle.next_question().await?))
}

/// POST /api/v1/battles/{id}/previous
pub async fn previous_question(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
) -> Result<Json<BattleSnapshot>, ApiError> {
    let battle = find_battle(&state, &battle_id).await?;
    Ok(Json(battle.previous_question().await?))
}

/// POST /api/v1/battles/{id}/finish
pub async fn finish_battle(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
) -> Result<Json<BattleSnapshot>, ApiError> {
    let battle = find_battle(&state, &battle_id).await?;
    Ok(Json(battle.finish().await?))
}

/// POST /api/v1/battles/{id}/restart
pub async fn restart_battle(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
) -> Result<Json<BattleSnapshot>, ApiError> {
    let battle = find_battle(&state, &battle_id).await?;
    Ok(Json(battle.restart().await))
}

/// DELETE /api/v1/battles/{id}
pub async fn delete_battle(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .battles
        .remove(&battle_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Battle {} not found", battle_id)))?;
    Ok(StatusCode::NO_CONTENT)
}
