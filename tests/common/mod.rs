// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use exam_prep::{
    config::{Config, FreeTierLimits},
    models::{
        question::{Category, Difficulty, Question, QuestionOption},
        user::User,
    },
    repository::MemoryStore,
    routes,
    state::AppState,
    utils::jwt::sign_jwt,
};

pub const JWT_SECRET: &str = "test_secret_for_integration_tests";
pub const FREE_USER: i64 = 1;
pub const PREMIUM_USER: i64 = 2;

pub struct TestApp {
    pub address: String,
    pub store: Arc<MemoryStore>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn token(&self, user_id: i64) -> String {
        sign_jwt(user_id, "user", JWT_SECRET, 600).expect("Failed to sign token")
    }

    pub async fn get(&self, user_id: i64, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(self.token(user_id))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, user_id: i64, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(self.token(user_id))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn patch(&self, user_id: i64, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .patch(self.url(path))
            .bearer_auth(self.token(user_id))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }
}

/// Question `id` has category `ALL[id % 5]` and correct option "A".
pub fn question(id: i64) -> Question {
    Question {
        id,
        category: Category::ALL[(id as usize) % Category::ALL.len()],
        difficulty: if id % 2 == 0 { Difficulty::Easy } else { Difficulty::Medium },
        content: format!("Question {}", id),
        options: ["A", "B", "C", "D"]
            .iter()
            .map(|o| QuestionOption {
                id: o.to_string(),
                text: format!("Choice {}", o),
            })
            .collect(),
        correct_option_id: "A".to_string(),
        explanation: Some(format!("Why {} is A", id)),
        ai_explanation: None,
    }
}

/// Spawns the app on a random port over an in-memory store seeded with 60 questions,
/// one free user and one premium user.
pub async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    for id in 1..=60 {
        store.insert_question(question(id)).await;
    }
    for (id, is_premium) in [(FREE_USER, false), (PREMIUM_USER, true)] {
        store
            .insert_user(User {
                id,
                username: format!("user{}", id),
                is_premium,
                premium_expires_at: None,
                created_at: None,
            })
            .await;
    }

    let config = Config {
        database_url: String::new(),
        jwt_secret: JWT_SECRET.to_string(),
        rust_log: "error".to_string(),
        port: 0,
        free_tier: FreeTierLimits::default(),
        streak_repair_cost: 50,
    };

    let state = AppState::new(config, store.clone());
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        store,
        client: reqwest::Client::new(),
    }
}
