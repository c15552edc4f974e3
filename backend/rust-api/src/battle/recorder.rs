//! Hands completed battles to the persistence store off the caller's path.

use std::sync::Arc;

use serde::Serialize;

use super::external::BattleStore;
use super::BattleSession;
use crate::metrics::BATTLE_RESULTS_SAVED_TOTAL;
use crate::models::battle::BattleResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordingStatus {
    #[default]
    NotStarted,
    Pending,
    Saved {
        battle_id: u64,
    },
    Failed {
        message: String,
    },
}

#[derive(Clone)]
pub struct BattleRecorder {
    store: Arc<dyn BattleStore>,
}

impl BattleRecorder {
    pub fn new(store: Arc<dyn BattleStore>) -> Self {
        Self { store }
    }

    /// Builds the result payload for a finished session.
    pub fn payload(session: &BattleSession) -> BattleResult {
        BattleResult {
            user_score: session.ledger.user_score(),
            ai_score: session.ledger.ai_score(),
            total_questions: session.questions.as_slice().len() as u32,
            user_answers: session.ledger.user_answers(),
            ai_answers: session.ledger.ai_answers(),
            questions: session.questions.as_slice().to_vec(),
        }
    }

    /// Saves the result. Failures are logged and returned as a status, never
    /// as an error.
    pub async fn record(&self, result: BattleResult) -> RecordingStatus {
        let total = result.total_questions;
        match self.store.save(result).await {
            Ok(record) => {
                BATTLE_RESULTS_SAVED_TOTAL
                    .with_label_values(&["success"])
                    .inc();
                tracing::info!(
                    "Battle result saved: id={}, user={}/{}, ai={}/{}",
                    record.id,
                    record.user_score,
                    total,
                    record.ai_score,
                    total
                );
                RecordingStatus::Saved {
                    battle_id: record.id,
                }
            }
            Err(e) => {
                BATTLE_RESULTS_SAVED_TOTAL.with_label_values(&["error"]).inc();
                tracing::warn!("Failed to save battle result: {}", e);
                RecordingStatus::Failed {
                    message: format!(
                        "Failed to save battle results, but you can still view them ({})",
                        e
                    ),
                }
            }
        }
    }
}
