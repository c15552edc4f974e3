use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use chrono::Utc;
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::sleep;
use uuid::Uuid;

use super::{battles::find_battle, ApiError};
use crate::{
    battle::{Battle, BattleNotice, Phase},
    metrics::SSE_CONNECTIONS_ACTIVE,
    models::timer::{BattleCompleted, TimeExpired, TimerEvent, TimerTick},
    services::AppState,
};

/// GET /api/v1/battles/{id}/stream
pub async fn battle_stream(
    State(state): State<Arc<AppState>>,
    Path(battle_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let battle = find_battle(&state, &battle_id).await?;
    let options = state.config.battle_options();

    tracing::info!(
        "Client connected to SSE stream: battle={}, tick={:?}",
        battle_id,
        options.tick
    );

    let stream = create_timer_stream(
        battle_id.to_string(),
        battle,
        options.question_seconds,
        options.tick,
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Keeps the connection gauge accurate however the stream ends.
struct ConnectionGuard;

impl ConnectionGuard {
    fn new() -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        Self
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
    }
}

struct StreamState {
    battle_id: String,
    battle: Battle,
    notices: broadcast::Receiver<BattleNotice>,
    total_seconds: u32,
    tick: Duration,
    first: bool,
    finished: bool,
    _guard: ConnectionGuard,
}

enum Wake {
    Tick,
    Expired(usize),
    Closed,
}

/// Emits a tick per timer unit while a countdown is live, a time-expired
/// event when a question runs out, and a final battle-completed event.
/// The stream ends once the battle completes or is reset.
fn create_timer_stream(
    battle_id: String,
    battle: Battle,
    total_seconds: u32,
    tick: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let notices = battle.subscribe();
    let initial = StreamState {
        battle_id,
        battle,
        notices,
        total_seconds,
        tick,
        first: true,
        finished: false,
        _guard: ConnectionGuard::new(),
    };

    stream::unfold(initial, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }

            let wake = if st.first {
                st.first = false;
                Wake::Tick
            } else {
                tokio::select! {
                    notice = st.notices.recv() => match notice {
                        Ok(BattleNotice::TimeExpired { question_index }) => Wake::Expired(question_index),
                        Ok(_) | Err(RecvError::Lagged(_)) => Wake::Tick,
                        Err(RecvError::Closed) => Wake::Closed,
                    },
                    _ = sleep(st.tick) => Wake::Tick,
                }
            };

            let timer_event = match wake {
                Wake::Closed => return None,
                Wake::Expired(question_index) => {
                    tracing::info!(
                        "Timer expired: battle={}, question={}",
                        st.battle_id,
                        question_index
                    );
                    TimerEvent::TimeExpired(TimeExpired {
                        battle_id: st.battle_id.clone(),
                        question_index,
                        timestamp: Utc::now(),
                        message: "Time's up! Your answer was submitted automatically".to_string(),
                    })
                }
                Wake::Tick => {
                    let snapshot = st.battle.snapshot().await;
                    match snapshot.phase {
                        Phase::Completed => {
                            st.finished = true;
                            TimerEvent::BattleCompleted(BattleCompleted {
                                battle_id: st.battle_id.clone(),
                                user_score: snapshot.user_score,
                                ai_score: snapshot.ai_score,
                                timestamp: Utc::now(),
                            })
                        }
                        Phase::InProgress(_) => match snapshot.timer_remaining {
                            Some(remaining) => TimerEvent::TimerTick(TimerTick {
                                battle_id: st.battle_id.clone(),
                                question_index: snapshot.current_index.unwrap_or(0),
                                remaining_seconds: remaining,
                                total_seconds: st.total_seconds,
                                timestamp: Utc::now(),
                            }),
                            None => continue,
                        },
                        Phase::Loading => continue,
                        Phase::Idle => return None,
                    }
                }
            };

            let event = Event::default()
                .event(timer_event.event_name())
                .data(timer_event.to_sse_data());
            return Some((Ok(event), st));
        }
    })
}
