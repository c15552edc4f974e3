use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::ApiError;
use crate::extractors::AppJson;
use crate::models::battle::{BattleDetail, BattleRecord, BattleResult};
use crate::services::AppState;

/// POST /api/battles
pub async fn save_battle(
    State(state): State<Arc<AppState>>,
    AppJson(result): AppJson<BattleResult>,
) -> Result<(StatusCode, Json<BattleRecord>), ApiError> {
    let record = state.store.save(result).await.map_err(|e| {
        tracing::warn!("Rejected battle result: {}", e);
        e
    })?;
    tracing::info!("Saved battle {}", record.id);
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/battles
pub async fn list_battles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BattleRecord>>, ApiError> {
    Ok(Json(state.store.list_history().await?))
}

/// GET /api/battles/{id}
pub async fn get_battle(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<u64>,
) -> Result<Json<BattleDetail>, ApiError> {
    let battle = state
        .store
        .get_battle(battle_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Battle {} not found", battle_id)))?;

    let answers = state.store.get_battle_answers(battle_id).await?;
    let mut questions = Vec::with_capacity(answers.len());
    for answer in &answers {
        if let Some(question) = state.store.get_question(answer.question_id).await? {
            questions.push(question);
        }
    }

    Ok(Json(BattleDetail {
        battle,
        answers,
        questions,
    }))
}
