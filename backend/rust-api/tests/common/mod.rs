#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tower::ServiceExt;
use wordbattle_api::{
    battle::{
        external::{AnswerOracle, BattleStore, QuestionSource},
        Battle, BattleOptions, GenerationError, OracleError, PersistenceError,
    },
    config::Config,
    create_router,
    models::{
        battle::{BattleAnswer, BattleRecord, BattleResult},
        BattleSettings, Difficulty, Question, QuestionType,
    },
    services::{battle_store::MemStorage, AppState},
};

pub const OPTIONS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A question whose correct answer is `alpha`.
pub fn question(index: usize) -> Question {
    Question {
        id: None,
        kind: if index % 2 == 0 {
            QuestionType::Mcq
        } else {
            QuestionType::Analogy
        },
        prompt: format!("Question {}", index + 1),
        options: OPTIONS.iter().map(|o| o.to_string()).collect(),
        correct_answer: "alpha".to_string(),
        explanation: format!("Explanation {}", index + 1),
        difficulty: "medium".to_string(),
    }
}

pub fn questions(count: usize) -> Vec<Question> {
    (0..count).map(question).collect()
}

pub fn settings(num_questions: u32, enable_timer: bool) -> BattleSettings {
    BattleSettings {
        difficulty: Difficulty::Medium,
        num_questions,
        enable_timer,
    }
}

/// Question source that serves queued replies, then falls back to
/// generating exactly what was asked for.
#[derive(Default)]
pub struct ScriptedSource {
    replies: Mutex<VecDeque<Result<Vec<Question>, GenerationError>>>,
    gate: Option<Arc<Semaphore>>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: Result<Vec<Question>, GenerationError>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    /// Holds every generate call until a permit is added to `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl QuestionSource for ScriptedSource {
    async fn generate(
        &self,
        _difficulty: Difficulty,
        count: u32,
    ) -> Result<Vec<Question>, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let queued = self.replies.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| Ok(questions(count as usize)))
    }
}

#[derive(Debug, Clone)]
pub enum OracleMode {
    /// Always answers the given option.
    Fixed(String),
    Fail,
    /// Answers something that is not an option.
    OffScript,
}

pub struct ScriptedOracle {
    mode: Mutex<OracleMode>,
    gate: Option<Arc<Semaphore>>,
    pub calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new(mode: OracleMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(answer: &str) -> Self {
        Self::new(OracleMode::Fixed(answer.to_string()))
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn set_mode(&self, mode: OracleMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerOracle for ScriptedOracle {
    async fn answer(&self, _prompt: &str, _options: &[String]) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let mode = self.mode.lock().unwrap().clone();
        match mode {
            OracleMode::Fixed(answer) => Ok(answer),
            OracleMode::Fail => Err(OracleError::Unavailable("oracle offline".to_string())),
            OracleMode::OffScript => Ok("epsilon".to_string()),
        }
    }
}

/// Store that refuses every write.
pub struct FailingStore;

#[async_trait]
impl BattleStore for FailingStore {
    async fn save(&self, _result: BattleResult) -> Result<BattleRecord, PersistenceError> {
        Err(PersistenceError::Unavailable("disk full".to_string()))
    }

    async fn list_history(&self) -> Result<Vec<BattleRecord>, PersistenceError> {
        Ok(Vec::new())
    }

    async fn get_battle(&self, _id: u64) -> Result<Option<BattleRecord>, PersistenceError> {
        Ok(None)
    }

    async fn get_battle_answers(&self, _id: u64) -> Result<Vec<BattleAnswer>, PersistenceError> {
        Ok(Vec::new())
    }

    async fn get_question(&self, _id: u64) -> Result<Option<Question>, PersistenceError> {
        Ok(None)
    }
}

/// In-memory store whose saves wait for a permit on `gate`.
pub struct GatedStore {
    pub inner: MemStorage,
    gate: Arc<Semaphore>,
}

impl GatedStore {
    pub fn new(gate: Arc<Semaphore>) -> Self {
        Self {
            inner: MemStorage::new(),
            gate,
        }
    }
}

#[async_trait]
impl BattleStore for GatedStore {
    async fn save(&self, result: BattleResult) -> Result<BattleRecord, PersistenceError> {
        self.gate.acquire().await.unwrap().forget();
        self.inner.save(result).await
    }

    async fn list_history(&self) -> Result<Vec<BattleRecord>, PersistenceError> {
        self.inner.list_history().await
    }

    async fn get_battle(&self, id: u64) -> Result<Option<BattleRecord>, PersistenceError> {
        self.inner.get_battle(id).await
    }

    async fn get_battle_answers(&self, id: u64) -> Result<Vec<BattleAnswer>, PersistenceError> {
        self.inner.get_battle_answers(id).await
    }

    async fn get_question(&self, id: u64) -> Result<Option<Question>, PersistenceError> {
        self.inner.get_question(id).await
    }
}

pub fn test_options() -> BattleOptions {
    BattleOptions {
        question_seconds: 3,
        tick: Duration::from_secs(1),
    }
}

pub fn new_battle(
    source: Arc<ScriptedSource>,
    oracle: Arc<ScriptedOracle>,
    store: Arc<dyn BattleStore>,
) -> Battle {
    init_tracing();
    Battle::new(source, oracle, store, test_options())
}

pub fn test_config() -> Config {
    Config {
        question_time_limit_seconds: 3,
        timer_tick_ms: 1000,
        llm_max_attempts: 1,
        battle_ttl_seconds: 60,
        ..Config::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub source: Arc<ScriptedSource>,
    pub oracle: Arc<ScriptedOracle>,
    pub store: Arc<MemStorage>,
}

pub fn create_test_app_with(source: ScriptedSource, oracle: ScriptedOracle) -> TestApp {
    init_tracing();

    let source = Arc::new(source);
    let oracle = Arc::new(oracle);
    let store = Arc::new(MemStorage::new());
    let state = Arc::new(AppState::with_components(
        test_config(),
        source.clone(),
        oracle.clone(),
        store.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        source,
        oracle,
        store,
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(ScriptedSource::new(), ScriptedOracle::always("alpha"))
}

/// Sends a request and returns the status with the body parsed as JSON
/// (`Value::Null` for an empty body).
pub async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}
