//! Narrow interfaces to the collaborators a battle depends on.

use async_trait::async_trait;

use super::error::{GenerationError, OracleError, PersistenceError};
use crate::models::battle::{BattleAnswer, BattleRecord, BattleResult};
use crate::models::{Difficulty, Question};

/// Produces the questions for a battle.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn generate(
        &self,
        difficulty: Difficulty,
        count: u32,
    ) -> Result<Vec<Question>, GenerationError>;
}

/// Picks the AI's answer for a question. Must return one of `options`.
#[async_trait]
pub trait AnswerOracle: Send + Sync {
    async fn answer(&self, prompt: &str, options: &[String]) -> Result<String, OracleError>;
}

/// Durable home for completed battles.
#[async_trait]
pub trait BattleStore: Send + Sync {
    async fn save(&self, result: BattleResult) -> Result<BattleRecord, PersistenceError>;

    /// Past battles, newest first.
    async fn list_history(&self) -> Result<Vec<BattleRecord>, PersistenceError>;

    async fn get_battle(&self, id: u64) -> Result<Option<BattleRecord>, PersistenceError>;

    async fn get_battle_answers(&self, id: u64) -> Result<Vec<BattleAnswer>, PersistenceError>;

    async fn get_question(&self, id: u64) -> Result<Option<Question>, PersistenceError>;
}
