//! Battle orchestration: one user against the AI over a fixed set of questions.
//!
//! A [`Battle`] moves through `Idle -> Loading -> InProgress -> Completed`.
//! While in progress each question is `Answering`, briefly `Checking` while
//! the answer oracle is consulted, then `Revealed`. All transitions run under
//! one mutex, and the per-question countdown reports expiry through that same
//! mutex, so an explicit check and a timed-out check never interleave.
//! Results of suspended calls carry the battle generation they were issued
//! for and are dropped if the battle was restarted in the meantime.

pub mod error;
pub mod external;
pub mod ledger;
pub mod question_set;
pub mod recorder;
pub mod timer;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::IndexedRandom;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use validator::Validate;

pub use error::{BattleError, GenerationError, OracleError, PersistenceError, Result};
use external::{AnswerOracle, BattleStore, QuestionSource};
use ledger::{AnswerRecord, ScoreLedger, ScoreSummary};
use question_set::QuestionSet;
use recorder::{BattleRecorder, RecordingStatus};
use timer::{ArmingId, Countdown, DEFAULT_QUESTION_SECONDS};

use crate::metrics::{
    ANSWERS_CHECKED_TOTAL, BATTLES_ACTIVE, BATTLES_TOTAL, ORACLE_FAILURES_TOTAL,
    TIMER_EXPIRIES_TOTAL,
};
use crate::models::battle::BattleResult;
use crate::models::{BattleSettings, Question, QuestionType};

const NOTICE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct BattleOptions {
    /// Countdown length per question, in ticks.
    pub question_seconds: u32,
    pub tick: Duration,
}

impl Default for BattleOptions {
    fn default() -> Self {
        Self {
            question_seconds: DEFAULT_QUESTION_SECONDS,
            tick: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStage {
    Answering,
    Checking,
    Revealed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "name", content = "stage", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Loading,
    InProgress(QuestionStage),
    Completed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Phase::Idle => "idle",
            Phase::Loading => "loading questions",
            Phase::InProgress(QuestionStage::Answering) => "answering",
            Phase::InProgress(QuestionStage::Checking) => "checking an answer",
            Phase::InProgress(QuestionStage::Revealed) => "showing a revealed answer",
            Phase::Completed => "completed",
        };
        f.write_str(text)
    }
}

/// A question has been revealed exactly when its answer record exists.
pub fn derive_stage(record: Option<&AnswerRecord>) -> QuestionStage {
    match record {
        Some(_) => QuestionStage::Revealed,
        None => QuestionStage::Answering,
    }
}

/// Side-channel messages about things that happened outside any caller's call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BattleNotice {
    TimeExpired {
        question_index: usize,
    },
    OracleUnavailable {
        question_index: usize,
        message: String,
    },
    ResultSaved {
        battle_id: u64,
    },
    PersistenceFailed {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(rename = "question")]
    pub prompt: String,
    pub options: Vec<String>,
    pub difficulty: String,
    /// Only present once the question is revealed.
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
}

impl QuestionView {
    fn new(question: &Question, reveal: bool) -> Self {
        Self {
            kind: question.kind,
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            difficulty: question.difficulty.clone(),
            correct_answer: reveal.then(|| question.correct_answer.clone()),
            explanation: reveal.then(|| question.explanation.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleSnapshot {
    pub phase: Phase,
    pub settings: Option<BattleSettings>,
    pub current_index: Option<usize>,
    pub total_questions: usize,
    pub question: Option<QuestionView>,
    pub pending_choice: Option<String>,
    pub answers: Vec<Option<AnswerRecord>>,
    pub user_score: u32,
    pub ai_score: u32,
    pub timer_remaining: Option<u32>,
    pub summary: Option<ScoreSummary>,
    pub questions: Option<Vec<Question>>,
    pub recording: RecordingStatus,
}

/// The aggregate root of one battle, owned by the state machine.
#[derive(Debug)]
pub struct BattleSession {
    settings: BattleSettings,
    questions: QuestionSet,
    current_index: usize,
    ledger: ScoreLedger,
    pending_choice: Option<String>,
    in_flight: Option<InFlightCheck>,
}

#[derive(Debug)]
struct InFlightCheck {
    index: usize,
    choice: String,
}

impl BattleSession {
    fn new(settings: BattleSettings, questions: QuestionSet) -> Self {
        let ledger = ScoreLedger::new(questions.as_slice().len());
        Self {
            settings,
            questions,
            current_index: 0,
            ledger,
            pending_choice: None,
            in_flight: None,
        }
    }

    fn question(&self, index: usize) -> &Question {
        &self.questions.as_slice()[index]
    }

    fn current_question(&self) -> &Question {
        self.question(self.current_index)
    }

    fn stage(&self) -> QuestionStage {
        if self.in_flight.is_some() {
            QuestionStage::Checking
        } else {
            derive_stage(self.ledger.record(self.current_index))
        }
    }

    fn is_last_question(&self) -> bool {
        self.current_index >= self.questions.last_index()
    }

    fn wants_timer(&self) -> bool {
        self.settings.enable_timer && self.stage() == QuestionStage::Answering
    }
}

enum PhaseState {
    Idle,
    Loading,
    InProgress(BattleSession),
    Completed(BattleSession),
}

struct BattleState {
    generation: u64,
    phase: PhaseState,
    timer: Countdown,
    recording: RecordingStatus,
}

/// Everything needed to finish an answer check once the oracle replies.
struct CheckTicket {
    generation: u64,
    index: usize,
    choice: String,
    prompt: String,
    options: Vec<String>,
}

impl BattleState {
    fn phase(&self) -> Phase {
        match &self.phase {
            PhaseState::Idle => Phase::Idle,
            PhaseState::Loading => Phase::Loading,
            PhaseState::InProgress(session) => Phase::InProgress(session.stage()),
            PhaseState::Completed(_) => Phase::Completed,
        }
    }

    fn begin_check(&mut self, operation: &'static str) -> Result<CheckTicket> {
        let phase = self.phase();
        let generation = self.generation;
        let session = match &mut self.phase {
            PhaseState::InProgress(session) if session.stage() == QuestionStage::Answering => {
                session
            }
            _ => return Err(BattleError::invalid(operation, phase)),
        };

        let choice =
            session
                .pending_choice
                .take()
                .ok_or_else(|| BattleError::InvalidTransition {
                    operation,
                    state: "answering with no choice selected".to_string(),
                })?;

        let index = session.current_index;
        let question = session.current_question();
        let ticket = CheckTicket {
            generation,
            index,
            choice: choice.clone(),
            prompt: question.prompt.clone(),
            options: question.options.clone(),
        };
        session.in_flight = Some(InFlightCheck { index, choice });
        self.timer.cancel();

        Ok(ticket)
    }

    fn snapshot(&self) -> BattleSnapshot {
        let phase = self.phase();
        let (session, completed) = match &self.phase {
            PhaseState::InProgress(session) => (session, false),
            PhaseState::Completed(session) => (session, true),
            PhaseState::Idle | PhaseState::Loading => {
                return BattleSnapshot {
                    phase,
                    settings: None,
                    current_index: None,
                    total_questions: 0,
                    question: None,
                    pending_choice: None,
                    answers: Vec::new(),
                    user_score: 0,
                    ai_score: 0,
                    timer_remaining: None,
                    summary: None,
                    questions: None,
                    recording: self.recording.clone(),
                }
            }
        };

        let reveal = completed || session.stage() == QuestionStage::Revealed;
        let pending_choice = session
            .pending_choice
            .clone()
            .or_else(|| session.in_flight.as_ref().map(|f| f.choice.clone()));

        BattleSnapshot {
            phase,
            settings: Some(session.settings.clone()),
            current_index: Some(session.current_index),
            total_questions: session.questions.as_slice().len(),
            question: (!completed).then(|| QuestionView::new(session.current_question(), reveal)),
            pending_choice,
            answers: session.ledger.slots().to_vec(),
            user_score: session.ledger.user_score(),
            ai_score: session.ledger.ai_score(),
            timer_remaining: self.timer.remaining(),
            summary: completed.then(|| session.ledger.summary()),
            questions: completed.then(|| session.questions.as_slice().to_vec()),
            recording: self.recording.clone(),
        }
    }
}

struct BattleInner {
    state: Mutex<BattleState>,
    source: Arc<dyn QuestionSource>,
    oracle: Arc<dyn AnswerOracle>,
    recorder: BattleRecorder,
    options: BattleOptions,
    notices: broadcast::Sender<BattleNotice>,
}

/// Handle to one battle. Clones share the same battle.
#[derive(Clone)]
pub struct Battle {
    inner: Arc<BattleInner>,
}

impl Battle {
    pub fn new(
        source: Arc<dyn QuestionSource>,
        oracle: Arc<dyn AnswerOracle>,
        store: Arc<dyn BattleStore>,
        options: BattleOptions,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(BattleInner {
                state: Mutex::new(BattleState {
                    generation: 0,
                    phase: PhaseState::Idle,
                    timer: Countdown::new(),
                    recording: RecordingStatus::NotStarted,
                }),
                source,
                oracle,
                recorder: BattleRecorder::new(store),
                options,
                notices,
            }),
        }
    }

    /// Receives non-fatal notices (oracle outages, persistence results).
    pub fn subscribe(&self) -> broadcast::Receiver<BattleNotice> {
        self.inner.notices.subscribe()
    }

    pub async fn snapshot(&self) -> BattleSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    pub async fn phase(&self) -> Phase {
        self.inner.state.lock().await.phase()
    }

    pub async fn timer_remaining(&self) -> Option<u32> {
        self.inner.state.lock().await.timer.remaining()
    }

    pub async fn current_question(&self) -> Option<QuestionView> {
        self.snapshot().await.question
    }

    pub async fn scores(&self) -> (u32, u32) {
        let snapshot = self.snapshot().await;
        (snapshot.user_score, snapshot.ai_score)
    }

    /// Loads a fresh question set and begins at the first question.
    pub async fn start(&self, settings: BattleSettings) -> Result<BattleSnapshot> {
        settings
            .validate()
            .map_err(|e| BattleError::InvalidSettings(e.to_string()))?;

        let generation = {
            let mut state = self.inner.state.lock().await;
            if !matches!(state.phase, PhaseState::Idle | PhaseState::Completed(_)) {
                return Err(BattleError::invalid("start", state.phase()));
            }
            state.timer.cancel();
            state.generation += 1;
            state.phase = PhaseState::Loading;
            state.recording = RecordingStatus::NotStarted;
            state.generation
        };

        tracing::info!(
            "Starting battle: difficulty={}, questions={}, timer={}",
            settings.difficulty,
            settings.num_questions,
            settings.enable_timer
        );

        let generated = self
            .inner
            .source
            .generate(settings.difficulty, settings.num_questions)
            .await;

        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            tracing::info!("Battle was restarted while loading; discarding generated questions");
            return Err(BattleError::Superseded("start"));
        }

        let questions = match generated
            .and_then(|questions| QuestionSet::from_generated(questions, settings.num_questions))
        {
            Ok(questions) => questions,
            Err(e) => {
                state.phase = PhaseState::Idle;
                BATTLES_TOTAL
                    .with_label_values(&["generation_failed"])
                    .inc();
                tracing::error!("Failed to generate questions: {}", e);
                return Err(e.into());
            }
        };

        let session = BattleSession::new(settings, questions);
        let wants_timer = session.wants_timer();
        tracing::info!(
            "Battle started with {} questions",
            session.questions.as_slice().len()
        );
        state.phase = PhaseState::InProgress(session);
        if wants_timer {
            self.arm_timer(&mut state);
        }

        BATTLES_TOTAL.with_label_values(&["started"]).inc();
        BATTLES_ACTIVE.inc();

        Ok(state.snapshot())
    }

    /// Records a not-yet-submitted choice for the current question.
    pub async fn select_answer(&self, choice: impl Into<String>) -> Result<BattleSnapshot> {
        let choice = choice.into();
        let mut state = self.inner.state.lock().await;
        let phase = state.phase();
        let session = match &mut state.phase {
            PhaseState::InProgress(session) if session.stage() == QuestionStage::Answering => {
                session
            }
            _ => return Err(BattleError::invalid("select_answer", phase)),
        };

        if !session.current_question().has_option(&choice) {
            return Err(BattleError::UnknownOption(choice));
        }
        session.pending_choice = Some(choice);

        Ok(state.snapshot())
    }

    /// Submits the pending choice, asks the oracle, and reveals the question.
    pub async fn check_answer(&self) -> Result<BattleSnapshot> {
        let ticket = {
            let mut state = self.inner.state.lock().await;
            state.begin_check("check_answer")?
        };
        self.resolve_check(ticket).await
    }

    pub async fn next_question(&self) -> Result<BattleSnapshot> {
        let mut state = self.inner.state.lock().await;
        let phase = state.phase();
        let is_last = match &state.phase {
            PhaseState::InProgress(session) if session.stage() == QuestionStage::Revealed => {
                session.is_last_question()
            }
            _ => return Err(BattleError::invalid("next_question", phase)),
        };

        if is_last {
            return Ok(self.finish_locked(&mut state));
        }

        state.timer.cancel();
        let wants_timer = match &mut state.phase {
            PhaseState::InProgress(session) => {
                session.current_index += 1;
                session.pending_choice = None;
                session.wants_timer()
            }
            _ => false,
        };
        if wants_timer {
            self.arm_timer(&mut state);
        }

        Ok(state.snapshot())
    }

    /// Moves back one question for review. Never submits anything.
    pub async fn previous_question(&self) -> Result<BattleSnapshot> {
        let mut state = self.inner.state.lock().await;
        let phase = state.phase();
        let allowed = matches!(
            &state.phase,
            PhaseState::InProgress(session)
                if session.current_index > 0 && session.stage() != QuestionStage::Checking
        );
        if !allowed {
            return Err(BattleError::invalid("previous_question", phase));
        }

        state.timer.cancel();
        if let PhaseState::InProgress(session) = &mut state.phase {
            session.current_index -= 1;
            session.pending_choice = None;
        }

        Ok(state.snapshot())
    }

    /// Ends the battle and saves the result in the background.
    pub async fn finish(&self) -> Result<BattleSnapshot> {
        let mut state = self.inner.state.lock().await;
        if !matches!(state.phase, PhaseState::InProgress(_)) {
            return Err(BattleError::invalid("finish", state.phase()));
        }
        Ok(self.finish_locked(&mut state))
    }

    /// Abandons whatever is going on and returns to idle.
    pub async fn restart(&self) -> BattleSnapshot {
        let mut state = self.inner.state.lock().await;
        state.timer.cancel();
        if matches!(state.phase, PhaseState::InProgress(_)) {
            BATTLES_TOTAL.with_label_values(&["abandoned"]).inc();
            BATTLES_ACTIVE.dec();
        }
        state.generation += 1;
        state.phase = PhaseState::Idle;
        state.recording = RecordingStatus::NotStarted;
        tracing::info!("Battle reset to idle");
        state.snapshot()
    }

    fn arm_timer(&self, state: &mut BattleState) {
        let weak = Arc::downgrade(&self.inner);
        let BattleOptions {
            question_seconds,
            tick,
        } = self.inner.options;

        state
            .timer
            .arm(question_seconds, tick, move |arming| async move {
                if let Some(inner) = weak.upgrade() {
                    Battle { inner }.on_timer_expired(arming).await;
                }
            });
    }

    async fn on_timer_expired(&self, arming: ArmingId) {
        let ticket = {
            let mut state = self.inner.state.lock().await;
            if !state.timer.take_expired(arming) {
                tracing::debug!("Ignoring stale timer expiry {:?}", arming);
                return;
            }

            if let PhaseState::InProgress(session) = &mut state.phase {
                if session.stage() == QuestionStage::Answering {
                    TIMER_EXPIRIES_TOTAL.inc();
                    let _ = self.inner.notices.send(BattleNotice::TimeExpired {
                        question_index: session.current_index,
                    });
                    if session.pending_choice.is_none() {
                        session.pending_choice = random_option(session.current_question());
                        tracing::info!(
                            "Time expired on question {} without a choice; submitting {:?}",
                            session.current_index,
                            session.pending_choice
                        );
                    } else {
                        tracing::info!(
                            "Time expired on question {}; submitting pending choice",
                            session.current_index
                        );
                    }
                }
            }

            match state.begin_check("auto_submit") {
                Ok(ticket) => ticket,
                Err(e) => {
                    tracing::debug!("Timer expiry did not submit: {}", e);
                    return;
                }
            }
        };

        if let Err(e) = self.resolve_check(ticket).await {
            tracing::debug!("Timed-out answer check discarded: {}", e);
        }
    }

    async fn resolve_check(&self, ticket: CheckTicket) -> Result<BattleSnapshot> {
        let verdict = self
            .inner
            .oracle
            .answer(&ticket.prompt, &ticket.options)
            .await
            .and_then(|answer| {
                if ticket.options.contains(&answer) {
                    Ok(answer)
                } else {
                    Err(OracleError::UnknownOption(answer))
                }
            });

        let mut state = self.inner.state.lock().await;
        if state.generation != ticket.generation {
            tracing::debug!("Discarding oracle answer for a restarted battle");
            return Err(BattleError::Superseded("check_answer"));
        }

        let session = match &mut state.phase {
            PhaseState::InProgress(session)
                if session
                    .in_flight
                    .as_ref()
                    .is_some_and(|flight| flight.index == ticket.index) =>
            {
                session
            }
            _ => {
                tracing::debug!("Discarding oracle answer; question {} is no longer being checked", ticket.index);
                return Err(BattleError::Superseded("check_answer"));
            }
        };
        session.in_flight = None;

        let ai_answer = match verdict {
            Ok(answer) => Some(answer),
            Err(e) => {
                tracing::warn!(
                    "Answer oracle failed on question {}: {}; scoring the AI as wrong",
                    ticket.index,
                    e
                );
                ORACLE_FAILURES_TOTAL.with_label_values(&[e.reason()]).inc();
                let _ = self.inner.notices.send(BattleNotice::OracleUnavailable {
                    question_index: ticket.index,
                    message: e.to_string(),
                });
                None
            }
        };

        let record = AnswerRecord::graded(
            session.question(ticket.index),
            Some(ticket.choice),
            ai_answer,
        );
        record_checked_metrics(&record);

        if let Err(e) = session.ledger.commit(ticket.index, record) {
            tracing::error!("Answer record for question {} rejected: {:?}", ticket.index, e);
            return Err(BattleError::Superseded("check_answer"));
        }

        Ok(state.snapshot())
    }

    fn finish_locked(&self, state: &mut BattleState) -> BattleSnapshot {
        state.timer.cancel();

        let mut session = match std::mem::replace(&mut state.phase, PhaseState::Idle) {
            PhaseState::InProgress(session) => session,
            other => {
                state.phase = other;
                return state.snapshot();
            }
        };

        if let Some(flight) = session.in_flight.take() {
            tracing::info!(
                "Finishing while question {} awaits the AI; recording it without an AI answer",
                flight.index
            );
            let record =
                AnswerRecord::graded(session.question(flight.index), Some(flight.choice), None);
            if let Err(e) = session.ledger.commit(flight.index, record) {
                tracing::error!("Answer record for question {} rejected: {:?}", flight.index, e);
            }
        }
        session.pending_choice = None;

        let result = BattleRecorder::payload(&session);
        tracing::info!(
            "Battle completed: user={}, ai={}, total={}",
            result.user_score,
            result.ai_score,
            result.total_questions
        );

        state.phase = PhaseState::Completed(session);
        state.recording = RecordingStatus::Pending;
        BATTLES_TOTAL.with_label_values(&["completed"]).inc();
        BATTLES_ACTIVE.dec();

        self.spawn_recording(state.generation, result);
        state.snapshot()
    }

    fn spawn_recording(&self, generation: u64, result: BattleResult) {
        let recorder = self.inner.recorder.clone();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let status = recorder.record(result).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };

            let notice = match &status {
                RecordingStatus::Saved { battle_id } => BattleNotice::ResultSaved {
                    battle_id: *battle_id,
                },
                RecordingStatus::Failed { message } => BattleNotice::PersistenceFailed {
                    message: message.clone(),
                },
                RecordingStatus::NotStarted | RecordingStatus::Pending => return,
            };

            let mut state = inner.state.lock().await;
            if state.generation != generation {
                tracing::debug!("Dropping recording outcome of a superseded battle");
                return;
            }
            state.recording = status;
            drop(state);
            let _ = inner.notices.send(notice);
        });
    }
}

fn random_option(question: &Question) -> Option<String> {
    question.options.choose(&mut rand::rng()).cloned()
}

fn record_checked_metrics(record: &AnswerRecord) {
    ANSWERS_CHECKED_TOTAL
        .with_label_values(&["user", if record.user_correct { "true" } else { "false" }])
        .inc();
    ANSWERS_CHECKED_TOTAL
        .with_label_values(&["ai", if record.ai_correct { "true" } else { "false" }])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_follows_committed_record() {
        assert_eq!(derive_stage(None), QuestionStage::Answering);
        let record = AnswerRecord {
            user_answer: Some("a".into()),
            ai_answer: None,
            user_correct: true,
            ai_correct: false,
        };
        assert_eq!(derive_stage(Some(&record)), QuestionStage::Revealed);
    }

    #[test]
    fn phase_serializes_with_stage() {
        let json = serde_json::to_value(Phase::InProgress(QuestionStage::Revealed)).unwrap();
        assert_eq!(json["name"], "in_progress");
        assert_eq!(json["stage"], "revealed");

        let idle = serde_json::to_value(Phase::Idle).unwrap();
        assert_eq!(idle["name"], "idle");
    }

    #[test]
    fn invalid_transition_names_operation_and_state() {
        let err = BattleError::invalid("next_question", Phase::InProgress(QuestionStage::Answering));
        assert_eq!(
            err.to_string(),
            "cannot next_question while battle is answering"
        );
    }
}
