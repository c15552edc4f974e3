//! Scoring ledger: per-question answer records and the scores derived from them.

use serde::{Deserialize, Serialize};

use crate::models::Question;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub user_answer: Option<String>,
    pub ai_answer: Option<String>,
    pub user_correct: bool,
    pub ai_correct: bool,
}

impl AnswerRecord {
    /// Grades both answers against the question's correct answer. An absent
    /// answer is never correct.
    pub fn graded(question: &Question, user_answer: Option<String>, ai_answer: Option<String>) -> Self {
        let user_correct = user_answer
            .as_deref()
            .is_some_and(|answer| question.is_correct(answer));
        let ai_correct = ai_answer
            .as_deref()
            .is_some_and(|answer| question.is_correct(answer));
        Self {
            user_answer,
            ai_answer,
            user_correct,
            ai_correct,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    UserWins,
    AiWins,
    Tie,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub user_score: u32,
    pub ai_score: u32,
    pub total_questions: u32,
    pub user_percentage: u32,
    pub ai_percentage: u32,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    OutOfRange(usize),
    AlreadyCommitted(usize),
}

/// One slot per question. A slot is written once, when that question's
/// answer is checked, and only read afterwards.
#[derive(Debug, Clone)]
pub struct ScoreLedger {
    slots: Vec<Option<AnswerRecord>>,
}

impl ScoreLedger {
    pub fn new(total: usize) -> Self {
        Self {
            slots: vec![None; total],
        }
    }

    pub fn commit(&mut self, index: usize, record: AnswerRecord) -> Result<(), LedgerError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(LedgerError::OutOfRange(index))?;
        if slot.is_some() {
            return Err(LedgerError::AlreadyCommitted(index));
        }
        *slot = Some(record);
        Ok(())
    }

    pub fn record(&self, index: usize) -> Option<&AnswerRecord> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn slots(&self) -> &[Option<AnswerRecord>] {
        &self.slots
    }

    pub fn total(&self) -> usize {
        self.slots.len()
    }

    pub fn user_score(&self) -> u32 {
        self.count(|record| record.user_correct)
    }

    pub fn ai_score(&self) -> u32 {
        self.count(|record| record.ai_correct)
    }

    fn count(&self, predicate: impl Fn(&AnswerRecord) -> bool) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|record| predicate(record))
            .count() as u32
    }

    pub fn user_answers(&self) -> Vec<Option<String>> {
        self.slots
            .iter()
            .map(|slot| slot.as_ref().and_then(|r| r.user_answer.clone()))
            .collect()
    }

    pub fn ai_answers(&self) -> Vec<Option<String>> {
        self.slots
            .iter()
            .map(|slot| slot.as_ref().and_then(|r| r.ai_answer.clone()))
            .collect()
    }

    pub fn summary(&self) -> ScoreSummary {
        let total = self.total() as u32;
        let user_score = self.user_score();
        let ai_score = self.ai_score();
        let outcome = match user_score.cmp(&ai_score) {
            std::cmp::Ordering::Greater => Outcome::UserWins,
            std::cmp::Ordering::Less => Outcome::AiWins,
            std::cmp::Ordering::Equal => Outcome::Tie,
        };
        ScoreSummary {
            user_score,
            ai_score,
            total_questions: total,
            user_percentage: percentage(user_score, total),
            ai_percentage: percentage(ai_score, total),
            outcome,
        }
    }
}

/// `round(score / total * 100)`, rounding halves up. Zero when `total` is zero.
pub fn percentage(score: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (score * 200 + total) / (total * 2)
}
