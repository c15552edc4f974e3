use axum::{
    body::{Body, BodyDataStream},
    http::{Request, StatusCode},
    Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use serial_test::serial;
use std::time::Duration;
use tower::ServiceExt;
use wordbattle_api::metrics::SSE_CONNECTIONS_ACTIVE;

mod common;
use common::{create_test_app, send_json};

/// Reads `event:`/`data:` frames off an SSE body, skipping keep-alive comments.
struct Frames {
    body: BodyDataStream,
    buffer: String,
}

impl Frames {
    async fn next_event(&mut self) -> Option<(String, Value)> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let frame: String = self.buffer.drain(..end + 2).collect();
                let mut name = None;
                let mut data = None;
                for line in frame.lines() {
                    if let Some(value) = line.strip_prefix("event:") {
                        name = Some(value.trim_start().to_string());
                    } else if let Some(value) = line.strip_prefix("data:") {
                        data = Some(value.trim_start().to_string());
                    }
                }
                match (name, data) {
                    (Some(name), Some(data)) => {
                        return Some((name, serde_json::from_str(&data).unwrap()))
                    }
                    _ => continue,
                }
            }

            let chunk = self.body.next().await?.unwrap();
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}

async fn open_stream(app: &Router, battle_id: &str) -> (StatusCode, Frames) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/battles/{}/stream", battle_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let frames = Frames {
        body: response.into_body().into_data_stream(),
        buffer: String::new(),
    };
    (status, frames)
}

async fn create_battle(app: &Router, enable_timer: bool) -> String {
    let (status, created) = send_json(
        app,
        "POST",
        "/api/v1/battles",
        Some(json!({ "difficulty": "easy", "numQuestions": 1, "enableTimer": enable_timer })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    created["id"].as_str().unwrap().to_string()
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_stream_ticks_then_reports_expiry_and_completion() {
    let app = create_test_app();
    let id = create_battle(&app.router, true).await;
    let base = format!("/api/v1/battles/{}", id);

    let (status, mut frames) = open_stream(&app.router, &id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(SSE_CONNECTIONS_ACTIVE.get(), 1);

    let (name, tick) = frames.next_event().await.unwrap();
    assert_eq!(name, "timer-tick");
    assert_eq!(tick["type"], "timer-tick");
    assert_eq!(tick["battleId"], id.as_str());
    assert_eq!(tick["questionIndex"], 0);
    assert_eq!(tick["totalSeconds"], 3);
    let remaining = tick["remainingSeconds"].as_u64().unwrap();
    assert!((1..=3).contains(&remaining));

    let mut expired = None;
    for _ in 0..10 {
        let (name, data) = frames.next_event().await.unwrap();
        if name == "time-expired" {
            expired = Some(data);
            break;
        }
        assert_eq!(name, "timer-tick");
    }
    let expired = expired.expect("countdown never expired");
    assert_eq!(expired["questionIndex"], 0);

    let mut stage = Value::Null;
    for _ in 0..100 {
        let (_, snapshot) = send_json(&app.router, "GET", &base, None).await;
        stage = snapshot["phase"]["stage"].clone();
        if stage == "revealed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stage, "revealed");

    let (status, _) = send_json(&app.router, "POST", &format!("{}/finish", base), None).await;
    assert_eq!(status, StatusCode::OK);

    let (name, completed) = frames.next_event().await.unwrap();
    assert_eq!(name, "battle-completed");
    assert_eq!(completed["aiScore"], 1);
    assert!(frames.next_event().await.is_none());
    assert_eq!(SSE_CONNECTIONS_ACTIVE.get(), 0);
}

#[tokio::test]
#[serial]
async fn test_completed_battle_stream_sends_one_event_and_ends() {
    let app = create_test_app();
    let id = create_battle(&app.router, false).await;
    let base = format!("/api/v1/battles/{}", id);

    send_json(
        &app.router,
        "POST",
        &format!("{}/select", base),
        Some(json!({ "answer": "beta" })),
    )
    .await;
    send_json(&app.router, "POST", &format!("{}/check", base), None).await;
    send_json(&app.router, "POST", &format!("{}/finish", base), None).await;

    let (_, mut frames) = open_stream(&app.router, &id).await;
    let (name, completed) = frames.next_event().await.unwrap();
    assert_eq!(name, "battle-completed");
    assert_eq!(completed["userScore"], 0);
    assert_eq!(completed["aiScore"], 1);

    assert!(frames.next_event().await.is_none());
    assert_eq!(SSE_CONNECTIONS_ACTIVE.get(), 0);
}

#[tokio::test]
#[serial]
async fn test_restart_closes_the_stream() {
    let app = create_test_app();
    let id = create_battle(&app.router, false).await;

    let (_, mut frames) = open_stream(&app.router, &id).await;
    assert_eq!(SSE_CONNECTIONS_ACTIVE.get(), 1);

    let (status, _) = send_json(
        &app.router,
        "POST",
        &format!("/api/v1/battles/{}/restart", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert!(frames.next_event().await.is_none());
    assert_eq!(SSE_CONNECTIONS_ACTIVE.get(), 0);
}

#[tokio::test]
#[serial]
async fn test_dropped_client_releases_connection() {
    let app = create_test_app();
    let id = create_battle(&app.router, false).await;

    let (_, frames) = open_stream(&app.router, &id).await;
    assert_eq!(SSE_CONNECTIONS_ACTIVE.get(), 1);
    drop(frames);
    assert_eq!(SSE_CONNECTIONS_ACTIVE.get(), 0);
}

#[tokio::test]
#[serial]
async fn test_stream_for_unknown_battle_is_not_found() {
    let app = create_test_app();
    let (status, _) = open_stream(&app.router, "550e8400-e29b-41d4-a716-446655440000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
