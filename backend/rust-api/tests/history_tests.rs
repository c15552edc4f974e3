use axum::http::StatusCode;
use serde_json::json;

mod common;
use common::{create_test_app, questions, send_json};

fn battle_result(user_answers: serde_json::Value, ai_answers: serde_json::Value) -> serde_json::Value {
    json!({
        "userScore": 1,
        "aiScore": 1,
        "totalQuestions": 2,
        "userAnswers": user_answers,
        "aiAnswers": ai_answers,
        "questions": questions(2),
    })
}

#[tokio::test]
async fn test_save_and_fetch_battle_detail() {
    let app = create_test_app();

    let (status, saved) = send_json(
        &app.router,
        "POST",
        "/api/battles",
        Some(battle_result(json!(["alpha", "beta"]), json!([null, "alpha"]))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(saved["userScore"], 1);
    assert_eq!(saved["difficulty"], "medium");
    assert!(saved["createdAt"].is_string());
    let id = saved["id"].as_u64().unwrap();

    let (status, detail) =
        send_json(&app.router, "GET", &format!("/api/battles/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["battle"]["id"], id);

    let answers = detail["answers"].as_array().unwrap();
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0]["isUserCorrect"], true);
    assert_eq!(answers[0]["isAiCorrect"], false);
    assert!(answers[0]["aiAnswer"].is_null());
    assert_eq!(answers[1]["isUserCorrect"], false);
    assert_eq!(answers[1]["isAiCorrect"], true);

    let stored_questions = detail["questions"].as_array().unwrap();
    assert_eq!(stored_questions.len(), 2);
    assert_eq!(stored_questions[0]["question"], "Question 1");
    assert_eq!(stored_questions[0]["id"], answers[0]["questionId"]);
}

#[tokio::test]
async fn test_history_lists_newest_first() {
    let app = create_test_app();

    let mut ids = Vec::new();
    for _ in 0..3 {
        let (_, saved) = send_json(
            &app.router,
            "POST",
            "/api/battles",
            Some(battle_result(json!(["alpha", "beta"]), json!(["alpha", "beta"]))),
        )
        .await;
        ids.push(saved["id"].as_u64().unwrap());
    }

    let (status, history) = send_json(&app.router, "GET", "/api/battles", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<u64> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_u64().unwrap())
        .collect();
    ids.reverse();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn test_inconsistent_result_is_rejected() {
    let app = create_test_app();

    let (status, _) = send_json(
        &app.router,
        "POST",
        "/api/battles",
        Some(battle_result(json!(["alpha"]), json!([null, "alpha"]))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, history) = send_json(&app.router, "GET", "/api/battles", None).await;
    assert!(history.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_battle_is_not_found() {
    let app = create_test_app();
    let (status, body) = send_json(&app.router, "GET", "/api/battles/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_completed_server_battle_lands_in_history() {
    let app = create_test_app();

    let (_, created) = send_json(
        &app.router,
        "POST",
        "/api/v1/battles",
        Some(json!({ "difficulty": "hard", "numQuestions": 1, "enableTimer": false })),
    )
    .await;
    let base = format!("/api/v1/battles/{}", created["id"].as_str().unwrap());
    send_json(
        &app.router,
        "POST",
        &format!("{}/select", base),
        Some(json!({ "answer": "alpha" })),
    )
    .await;
    send_json(&app.router, "POST", &format!("{}/check", base), None).await;
    send_json(&app.router, "POST", &format!("{}/next", base), None).await;

    let mut saved = serde_json::Value::Null;
    for _ in 0..100 {
        let (_, snapshot) = send_json(&app.router, "GET", &base, None).await;
        if snapshot["recording"]["status"] == "saved" {
            saved = snapshot;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let battle_id = saved["recording"]["battle_id"].as_u64().unwrap();

    let (_, history) = send_json(&app.router, "GET", "/api/battles", None).await;
    assert_eq!(history[0]["id"], battle_id);
    assert_eq!(history[0]["userScore"], 1);
    assert_eq!(history[0]["aiScore"], 1);
}
