use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::{Validate, ValidationError};

pub mod battle;
pub mod timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Mcq,
    Analogy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Mixed,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single vocabulary or analogy question as produced by the question source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_question_options"))]
pub struct Question {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(rename = "type")]
    pub kind: QuestionType,

    /// Question text shown to both players
    #[serde(rename = "question")]
    #[validate(length(min = 1, message = "Question text must not be empty"))]
    pub prompt: String,

    #[validate(length(equal = 4, message = "A question must have exactly 4 options"))]
    pub options: Vec<String>,

    pub correct_answer: String,

    #[serde(default)]
    pub explanation: String,

    pub difficulty: String,
}

impl Question {
    pub fn has_option(&self, candidate: &str) -> bool {
        self.options.iter().any(|option| option == candidate)
    }

    pub fn is_correct(&self, candidate: &str) -> bool {
        candidate == self.correct_answer
    }
}

fn validate_question_options(question: &Question) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for option in &question.options {
        if option.trim().is_empty() {
            return Err(ValidationError::new("empty_option"));
        }
        if !seen.insert(option.as_str()) {
            return Err(ValidationError::new("duplicate_option"));
        }
    }

    if !question.has_option(&question.correct_answer) {
        return Err(ValidationError::new("correct_answer_not_in_options"));
    }

    Ok(())
}

/// Caller-owned battle configuration, copied into a battle when it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BattleSettings {
    #[serde(default)]
    pub difficulty: Difficulty,

    #[validate(range(
        min = 1,
        max = 50,
        message = "Number of questions must be between 1 and 50"
    ))]
    pub num_questions: u32,

    pub enable_timer: bool,
}

impl Default for BattleSettings {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::Medium,
            num_questions: 5,
            enable_timer: true,
        }
    }
}
