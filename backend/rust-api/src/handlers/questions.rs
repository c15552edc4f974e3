use axum::{extract::State, Json};
use std::sync::Arc;
use validator::Validate;

use super::ApiError;
use crate::extractors::AppJson;
use crate::models::battle::{AiAnswerRequest, AiAnswerResponse, GenerateQuestionsResponse};
use crate::models::BattleSettings;
use crate::services::AppState;

/// POST /api/questions/generate
pub async fn generate_questions(
    State(state): State<Arc<AppState>>,
    AppJson(settings): AppJson<BattleSettings>,
) -> Result<Json<GenerateQuestionsResponse>, ApiError> {
    settings.validate()?;
    tracing::info!(
        "Generating {} questions at {} difficulty",
        settings.num_questions,
        settings.difficulty
    );

    let questions = state
        .question_source
        .generate(settings.difficulty, settings.num_questions)
        .await?;

    Ok(Json(GenerateQuestionsResponse { questions }))
}

/// POST /api/ai/answer
pub async fn ai_answer(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<AiAnswerRequest>,
) -> Result<Json<AiAnswerResponse>, ApiError> {
    request.validate()?;

    let answer = state
        .oracle
        .answer(&request.question, &request.options)
        .await?;

    Ok(Json(AiAnswerResponse { answer }))
}
