//! Router-level tests that never reach the database

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

use talentdesk_server::auth::issue_token;
use talentdesk_server::config::{Config, Environment};
use talentdesk_server::models::UserRole;
use talentdesk_server::routes::api_router;
use talentdesk_server::state::AppState;
use talentdesk_server::websocket::WsState;

const SECRET: &str = "router-test-secret";

fn test_config(webhook_secret: Option<&str>) -> Config {
    Config {
        database_url: "postgresql://localhost/talentdesk_unreachable".to_string(),
        environment: Environment::Development,
        port: 0,
        db_max_connections: 1,
        rate_limit_rps: 100,
        webhook_secret: webhook_secret.map(str::to_string),
        cors_allowed_origins: None,
        log_level: "debug".to_string(),
        jwt_secret: SECRET.to_string(),
        reference_retry_budget: 3,
        default_payment_terms_days: 30,
        document_storage_dir: std::env::temp_dir()
            .join("talentdesk-router-tests")
            .to_string_lossy()
            .into_owned(),
        pdf_renderer_url: None,
        bank_feed_url: None,
        bank_feed_token: None,
    }
}

/// Lazy pool: nothing connects unless a handler actually queries
fn app(webhook_secret: Option<&str>) -> Router {
    let config = test_config(webhook_secret);
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy(&config.database_url)
        .expect("lazy pool");
    api_router(AppState::from_config(&config, pool, WsState::new()))
}

fn bearer(role: UserRole) -> String {
    let token = issue_token(Uuid::new_v4(), role, SECRET, 300).expect("token");
    format!("Bearer {}", token)
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_root_is_public() {
    let response = app(None)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let response = app(None)
        .oneshot(
            Request::builder()
                .uri("/api/talents")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_another_secret_is_unauthorized() {
    let token = issue_token(Uuid::new_v4(), UserRole::Admin, "someone-else", 300).unwrap();

    let response = app(None)
        .oneshot(
            Request::builder()
                .uri("/api/documents")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_forbidden_role_gets_no_details() {
    let body = serde_json::json!({
        "first_name": "Lea",
        "last_name": "Martin",
        "commission_inbound": "20",
        "commission_outbound": "30"
    });

    let response = app(None)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/talents")
                .header(header::AUTHORIZATION, bearer(UserRole::Sales))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "FORBIDDEN");
    assert!(json["error"].get("details").map_or(true, |d| d.is_null()));
}

#[tokio::test]
async fn test_payment_requires_admin() {
    let body = serde_json::json!({ "payment_date": "2025-03-01" });

    let response = app(None)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/documents/{}/paid", Uuid::new_v4()))
                .header(header::AUTHORIZATION, bearer(UserRole::HeadOf))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_webhook_rejected_without_configured_secret() {
    let response = app(None)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/bank-transactions/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-webhook-secret", "anything")
                .body(Body::from(r#"{"transactions":[]}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_rejected_with_wrong_secret() {
    let response = app(Some("expected"))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/bank-transactions/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-webhook-secret", "wrong")
                .body(Body::from(r#"{"transactions":[]}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
