use std::sync::Arc;

use crate::battle::external::{AnswerOracle, BattleStore, QuestionSource};
use crate::config::Config;

use battle_registry::BattleRegistry;
use battle_store::MemStorage;
use openai_service::OpenAiService;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn BattleStore>,
    pub question_source: Arc<dyn QuestionSource>,
    pub oracle: Arc<dyn AnswerOracle>,
    pub battles: Arc<BattleRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let openai = Arc::new(OpenAiService::new(&config));
        tracing::info!(
            "Using OpenAI model {} at {}",
            config.openai_model,
            config.openai_base_url
        );
        Self::with_components(config, openai.clone(), openai, Arc::new(MemStorage::new()))
    }

    /// Wires the state around explicit collaborators.
    pub fn with_components(
        config: Config,
        question_source: Arc<dyn QuestionSource>,
        oracle: Arc<dyn AnswerOracle>,
        store: Arc<dyn BattleStore>,
    ) -> Self {
        let battles = Arc::new(BattleRegistry::new(
            question_source.clone(),
            oracle.clone(),
            store.clone(),
            config.battle_options(),
            config.battle_ttl(),
        ));
        Self {
            config,
            store,
            question_source,
            oracle,
            battles,
        }
    }
}

pub mod battle_registry;
pub mod battle_store;
pub mod openai_service;
