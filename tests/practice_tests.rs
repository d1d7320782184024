// tests/practice_tests.rs

mod common;

use common::{FREE_USER, PREMIUM_USER, spawn_app};
use serde_json::{Value, json};

#[tokio::test]
async fn practice_questions_are_filtered_and_stripped() {
    let app = spawn_app().await;

    let response = app
        .get(FREE_USER, "/api/practice/questions?category=VERBAL_ABILITY&difficulty=EASY&count=3")
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let questions: Vec<Value> = response.json().await.unwrap();
    assert_eq!(questions.len(), 3);
    for q in &questions {
        assert_eq!(q["category"], "VERBAL_ABILITY");
        assert_eq!(q["difficulty"], "EASY");
        assert!(q.get("correct_option_id").is_none());
    }

    let response = app.get(FREE_USER, "/api/practice/questions?count=0").await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn practice_answers_are_metered_for_free_users() {
    let app = spawn_app().await;

    for i in 1..=20 {
        let response = app
            .post(
                FREE_USER,
                "/api/practice/answers",
                json!({ "question_id": i, "option_id": "A" }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["is_correct"], true);
        assert_eq!(body["practice_used_today"], i);
        assert_eq!(body["current_streak"], 1);
    }

    let response = app
        .post(FREE_USER, "/api/practice/answers", json!({ "question_id": 21, "option_id": "A" }))
        .await;
    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["quota"]["kind"], "practice_questions");
    assert_eq!(body["quota"]["used"], 20);

    let status: Value = app.get(FREE_USER, "/api/subscription").await.json().await.unwrap();
    assert_eq!(status["practice_used_today"], 20);

    // Premium users are never denied.
    for i in 1..=25 {
        let response = app
            .post(
                PREMIUM_USER,
                "/api/practice/answers",
                json!({ "question_id": i, "option_id": "B" }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200);
    }
}

#[tokio::test]
async fn explanations_are_metered() {
    let app = spawn_app().await;

    for i in 1..=5 {
        let response = app
            .get(FREE_USER, &format!("/api/practice/questions/{}/explanation", i))
            .await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["correct_option_id"], "A");
        assert_eq!(body["views_used_today"], i);
    }

    let response = app.get(FREE_USER, "/api/practice/questions/6/explanation").await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app.get(PREMIUM_USER, "/api/practice/questions/999/explanation").await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn streak_and_analytics_follow_practice() {
    let app = spawn_app().await;

    let streak: Value = app.get(FREE_USER, "/api/streak").await.json().await.unwrap();
    assert_eq!(streak["current_streak"], 0);
    assert_eq!(streak["repairable"], false);

    app.post(FREE_USER, "/api/practice/answers", json!({ "question_id": 5, "option_id": "A" }))
        .await;
    app.post(FREE_USER, "/api/practice/answers", json!({ "question_id": 10, "option_id": "C" }))
        .await;

    let streak: Value = app.get(FREE_USER, "/api/streak").await.json().await.unwrap();
    assert_eq!(streak["current_streak"], 1);
    assert_eq!(streak["is_active"], true);
    assert_eq!(streak["repair_cost"], 50);

    // Nothing to repair while the streak is intact.
    let response = app.post(FREE_USER, "/api/streak/repair", json!({})).await;
    assert_eq!(response.status().as_u16(), 409);

    let dashboard: Value = app.get(FREE_USER, "/api/analytics/dashboard").await.json().await.unwrap();
    assert_eq!(dashboard["practice_answered"], 2);
    assert_eq!(dashboard["practice_correct"], 1);
    assert_eq!(dashboard["practice_accuracy"], 50.0);
    assert_eq!(dashboard["current_streak"], 1);

    // Questions 5 and 10 are both verbal ability.
    let categories: Vec<Value> = app
        .get(FREE_USER, "/api/analytics/categories")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(categories.len(), 5);
    let verbal = categories
        .iter()
        .find(|c| c["category"] == "VERBAL_ABILITY")
        .unwrap();
    assert_eq!(verbal["answered"], 2);

    let weekly: Vec<Value> = app.get(FREE_USER, "/api/analytics/weekly").await.json().await.unwrap();
    assert_eq!(weekly.len(), 7);
    assert_eq!(weekly[6]["practice_answered"], 2);
}

#[tokio::test]
async fn redeeming_a_pass_lifts_limits() {
    let app = spawn_app().await;
    app.store.insert_pass_code("SEASON-2025", 90).await;

    let response = app
        .post(FREE_USER, "/api/mock-exams", json!({
            "question_count": 30,
            "time_limit_minutes": 30,
            "passing_score": 75
        }))
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .post(FREE_USER, "/api/subscription/redeem", json!({ "code": "SEASON-2025" }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let status: Value = response.json().await.unwrap();
    assert_eq!(status["is_premium"], true);
    assert!(status["premium_expires_at"].is_string());
    assert!(status["limits"]["practice_limit_per_day"].is_null());

    let response = app
        .post(FREE_USER, "/api/subscription/redeem", json!({ "code": "SEASON-2025" }))
        .await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app
        .post(FREE_USER, "/api/mock-exams", json!({
            "question_count": 30,
            "time_limit_minutes": 30,
            "passing_score": 75
        }))
        .await;
    assert_eq!(response.status().as_u16(), 201);
}
