use std::collections::HashSet;
use std::sync::Arc;

use validator::Validate;

use super::error::GenerationError;
use crate::models::Question;

/// The ordered questions of one battle. Fixed once loaded.
#[derive(Debug, Clone)]
pub struct QuestionSet {
    questions: Arc<[Question]>,
}

impl QuestionSet {
    /// Builds the set from whatever the question source produced.
    ///
    /// Malformed questions and repeated prompts are dropped, extra questions
    /// beyond `requested` are truncated, and a short delivery is accepted as
    /// is. Only an empty result is an error.
    pub fn from_generated(
        generated: Vec<Question>,
        requested: u32,
    ) -> Result<Self, GenerationError> {
        let received = generated.len();
        let mut seen_prompts = HashSet::new();
        let mut questions = Vec::with_capacity(received.min(requested as usize));

        for question in generated {
            if questions.len() == requested as usize {
                break;
            }
            if let Err(e) = question.validate() {
                tracing::warn!(
                    "Dropping malformed question {:?}: {}",
                    question.prompt,
                    e
                );
                continue;
            }
            if !seen_prompts.insert(question.prompt.trim().to_lowercase()) {
                tracing::warn!("Dropping repeated question {:?}", question.prompt);
                continue;
            }
            questions.push(question);
        }

        if questions.is_empty() {
            return Err(GenerationError::Empty);
        }

        if questions.len() < requested as usize {
            tracing::warn!(
                "Question source under-delivered: requested={}, received={}, usable={}",
                requested,
                received,
                questions.len()
            );
        }

        Ok(Self {
            questions: questions.into(),
        })
    }

    pub fn last_index(&self) -> usize {
        self.questions.len().saturating_sub(1)
    }

    pub fn as_slice(&self) -> &[Question] {
        &self.questions
    }
}
