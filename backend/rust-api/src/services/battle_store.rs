use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use validator::Validate;

use crate::battle::external::BattleStore;
use crate::battle::PersistenceError;
use crate::models::battle::{BattleAnswer, BattleRecord, BattleResult};
use crate::models::Question;

#[derive(Default)]
struct Tables {
    questions: HashMap<u64, Question>,
    battles: HashMap<u64, BattleRecord>,
    answers: HashMap<u64, BattleAnswer>,
    next_question_id: u64,
    next_battle_id: u64,
    next_answer_id: u64,
}

impl Tables {
    fn next_id(counter: &mut u64) -> u64 {
        *counter += 1;
        *counter
    }
}

/// In-process battle history. Contents are lost on restart.
#[derive(Default)]
pub struct MemStorage {
    tables: RwLock<Tables>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BattleStore for MemStorage {
    async fn save(&self, result: BattleResult) -> Result<BattleRecord, PersistenceError> {
        result
            .validate()
            .map_err(|e| PersistenceError::Rejected(e.to_string()))?;

        let mut tables = self.tables.write().await;
        let battle_id = Tables::next_id(&mut tables.next_battle_id);
        let difficulty = result
            .questions
            .first()
            .map(|q| q.difficulty.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "medium".to_string());

        let record = BattleRecord {
            id: battle_id,
            user_score: result.user_score,
            ai_score: result.ai_score,
            total_questions: result.total_questions,
            difficulty,
            created_at: Utc::now(),
        };
        tables.battles.insert(battle_id, record.clone());

        let answers = result.user_answers.into_iter().zip(result.ai_answers);
        for (question, (user_answer, ai_answer)) in result.questions.into_iter().zip(answers) {
            let question_id = Tables::next_id(&mut tables.next_question_id);
            let answer_id = Tables::next_id(&mut tables.next_answer_id);

            // Correctness is recomputed here rather than trusted from the caller
            let answer = BattleAnswer {
                id: answer_id,
                battle_id,
                question_id,
                is_user_correct: user_answer
                    .as_deref()
                    .is_some_and(|a| question.is_correct(a)),
                is_ai_correct: ai_answer.as_deref().is_some_and(|a| question.is_correct(a)),
                user_answer,
                ai_answer,
            };

            tables.questions.insert(
                question_id,
                Question {
                    id: Some(question_id),
                    ..question
                },
            );
            tables.answers.insert(answer_id, answer);
        }

        tracing::debug!("Stored battle {} with {} answers", battle_id, record.total_questions);
        Ok(record)
    }

    async fn list_history(&self) -> Result<Vec<BattleRecord>, PersistenceError> {
        let tables = self.tables.read().await;
        let mut history: Vec<BattleRecord> = tables.battles.values().cloned().collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(history)
    }

    async fn get_battle(&self, id: u64) -> Result<Option<BattleRecord>, PersistenceError> {
        Ok(self.tables.read().await.battles.get(&id).cloned())
    }

    async fn get_battle_answers(&self, id: u64) -> Result<Vec<BattleAnswer>, PersistenceError> {
        let tables = self.tables.read().await;
        let mut answers: Vec<BattleAnswer> = tables
            .answers
            .values()
            .filter(|answer| answer.battle_id == id)
            .cloned()
            .collect();
        answers.sort_by_key(|answer| answer.id);
        Ok(answers)
    }

    async fn get_question(&self, id: u64) -> Result<Option<Question>, PersistenceError> {
        Ok(self.tables.read().await.questions.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionType;

    fn question(prompt: &str, difficulty: &str) -> Question {
        Question {
            id: None,
            kind: QuestionType::Mcq,
            prompt: prompt.to_string(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer: "a".to_string(),
            explanation: String::new(),
            difficulty: difficulty.to_string(),
        }
    }

    fn result() -> BattleResult {
        BattleResult {
            user_score: 1,
            ai_score: 1,
            total_questions: 2,
            user_answers: vec![Some("a".into()), Some("c".into())],
            ai_answers: vec![None, Some("a".into())],
            questions: vec![question("one", "hard"), question("two", "easy")],
        }
    }

    #[tokio::test]
    async fn save_assigns_ids_and_recomputes_correctness() {
        let store = MemStorage::new();
        let record = store.save(result()).await.unwrap();
        assert_eq!(record.id, 1);
        assert_eq!(record.difficulty, "hard");

        let answers = store.get_battle_answers(record.id).await.unwrap();
        assert_eq!(answers.len(), 2);
        assert!(answers[0].is_user_correct);
        assert!(!answers[0].is_ai_correct);
        assert!(!answers[1].is_user_correct);
        assert!(answers[1].is_ai_correct);

        let stored = store
            .get_question(answers[1].question_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.prompt, "two");
        assert_eq!(stored.id, Some(answers[1].question_id));
    }

    #[tokio::test]
    async fn rejects_inconsistent_results() {
        let store = MemStorage::new();
        let mut bad = result();
        bad.user_answers.pop();

        assert!(matches!(
            store.save(bad).await,
            Err(PersistenceError::Rejected(_))
        ));
        assert!(store.list_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let store = MemStorage::new();
        let first = store.save(result()).await.unwrap();
        let second = store.save(result()).await.unwrap();

        let history = store.list_history().await.unwrap();
        let ids: Vec<u64> = history.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(store.get_battle(99).await.unwrap().is_none());
    }
}
