#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use quiz_attempts_api::{
    config::{Config, StoreBackend},
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    services::{attempt_store::InMemoryAttemptStore, clock::ManualClock, AppState},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "integration-test-secret";
pub const METRICS_AUTH: &str = "metrics:secret";

pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryAttemptStore>,
}

pub fn test_start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 14, 10, 0, 0).unwrap()
}

pub fn test_config() -> Config {
    Config {
        store_backend: StoreBackend::Memory,
        mongo_uri: "mongodb://unused:27017".to_string(),
        mongo_database: "quiz_attempts_test".to_string(),
        redis_uri: None,
        jwt_secret: JWT_SECRET.to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        conflict_retries: 5,
        metrics_auth: METRICS_AUTH.to_string(),
    }
}

pub async fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let clock = Arc::new(ManualClock::new(test_start_time()));
    let store = Arc::new(InMemoryAttemptStore::new());
    let app_state = Arc::new(AppState::with_store(
        test_config(),
        store.clone(),
        clock.clone(),
    ));

    TestApp {
        router: create_router(app_state),
        clock,
        store,
    }
}

pub fn token_for(sub: &str, role: &str) -> String {
    let now = Utc::now().timestamp();
    JwtService::new(JWT_SECRET)
        .generate_token(JwtClaims {
            sub: sub.to_string(),
            role: role.to_string(),
            group_ids: vec![],
            exp: (now + 3600) as usize,
            iat: now as usize,
        })
        .unwrap()
}

impl TestApp {
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
        };

        (status, json)
    }

    /// Starts an attempt as `learner_id` and returns its id.
    pub async fn start_attempt(&self, learner_id: &str, extra: Value) -> String {
        let mut body = json!({
            "quiz_id": "quiz-algebra-1",
            "learner_id": learner_id,
        });
        if let (Some(target), Some(fields)) = (body.as_object_mut(), extra.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }

        let token = token_for(learner_id, "student");
        let (status, json) = self
            .send("POST", "/api/v1/attempts", Some(&token), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "unexpected body {}", json);
        json["id"].as_str().unwrap().to_string()
    }

    pub async fn get_attempt(&self, attempt_id: &str, token: &str) -> Value {
        let (status, json) = self
            .send(
                "GET",
                &format!("/api/v1/attempts/{}", attempt_id),
                Some(token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "unexpected body {}", json);
        json
    }
}
