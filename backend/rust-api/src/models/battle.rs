use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::Question;

/// Payload handed to the persistence store when a battle completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_result_shape"))]
pub struct BattleResult {
    pub user_score: u32,
    pub ai_score: u32,
    pub total_questions: u32,
    pub user_answers: Vec<Option<String>>,
    pub ai_answers: Vec<Option<String>>,
    #[validate(length(min = 1, message = "A battle result needs at least one question"))]
    pub questions: Vec<Question>,
}

fn validate_result_shape(result: &BattleResult) -> Result<(), ValidationError> {
    let total = result.questions.len();
    if result.total_questions as usize != total {
        return Err(ValidationError::new("total_questions_mismatch"));
    }
    if result.user_answers.len() != total || result.ai_answers.len() != total {
        return Err(ValidationError::new("answers_not_sized_to_questions"));
    }
    if result.user_score as usize > total || result.ai_score as usize > total {
        return Err(ValidationError::new("score_exceeds_total"));
    }
    Ok(())
}

/// Stored battle summary, as listed in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleRecord {
    pub id: u64,
    pub user_score: u32,
    pub ai_score: u32,
    pub total_questions: u32,
    pub difficulty: String,
    pub created_at: DateTime<Utc>,
}

/// Per-question outcome stored alongside a battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleAnswer {
    pub id: u64,
    pub battle_id: u64,
    pub question_id: u64,
    pub user_answer: Option<String>,
    pub ai_answer: Option<String>,
    pub is_user_correct: bool,
    pub is_ai_correct: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleDetail {
    pub battle: BattleRecord,
    pub answers: Vec<BattleAnswer>,
    pub questions: Vec<Question>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateQuestionsResponse {
    pub questions: Vec<Question>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AiAnswerRequest {
    #[validate(length(min = 1, message = "Question text must not be empty"))]
    pub question: String,
    #[validate(length(min = 1, message = "At least one option is required"))]
    pub options: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AiAnswerResponse {
    pub answer: String,
}
