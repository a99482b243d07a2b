use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use std::sync::Arc;
use tower::ServiceExt;

use quiztrack_api::config::{Config, MasteryConfig, ScoringConfig, SweeperConfig};
use quiztrack_api::{create_router, AppState};

/// App wired to an unreachable MongoDB. The driver connects lazily, so the
/// router itself works; anything touching storage reports unhealthy.
async fn create_test_app() -> axum::Router {
    let config = Config {
        mongo_uri: "mongodb://127.0.0.1:1/quiztrack_test".to_string(),
        mongo_database: "quiztrack_test".to_string(),
        metadata_api_url: None,
        scoring: ScoringConfig::default(),
        sweeper: SweeperConfig::default(),
        mastery: MasteryConfig::default(),
    };
    let client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .expect("client construction is offline");
    let mongo = client.database(&config.mongo_database);

    create_router(Arc::new(AppState { config, mongo }))
}

#[tokio::test]
async fn health_reports_degraded_without_mongo() {
    let app = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["dependencies"]["mongodb"]["status"], "unhealthy");
}

#[tokio::test]
async fn metrics_requires_basic_auth() {
    let app = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/v1/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_attempt_rejects_empty_ids() {
    let app = create_test_app().await;

    // Validation runs before any storage access, so the unreachable
    // database does not matter here.
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/attempts")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "user_id": "",
                        "kid_index": "0",
                        "quiz_id": "q1"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_window_rejects_inverted_bounds() {
    let app = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(
                    "/api/v1/kids/u1/0/metrics?from=2024-03-07T00:00:00Z&to=2024-03-01T00:00:00Z",
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
