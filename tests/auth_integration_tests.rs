mod common;

use axum::http::{Method, StatusCode, header};
use career_hub::{
    AppConfig, MockIdentityService,
    auth::Claims,
    models::Role,
};
use common::{TestAppBuilder, get, request, seeded_app, send};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const JWT_SECRET: &str = "test-jwt-secret";

fn token_for(sub: Uuid, expires_in: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let claims = Claims {
        sub,
        exp: (now + expires_in) as usize,
        iat: now as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

fn jwt_config() -> AppConfig {
    AppConfig {
        jwt_secret: Some(JWT_SECRET.to_string()),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _) = seeded_app().await;
    let (status, body) = send(&app.router, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let (app, _) = seeded_app().await;
    let (status, body) = send(&app.router, request(Method::GET, "/me", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Missing X-User-ID header.");
}

#[tokio::test]
async fn test_malformed_user_header_is_unauthorized() {
    let (app, _) = seeded_app().await;
    let req = axum::http::Request::builder()
        .uri("/me")
        .header("x-user-id", "not-a-uuid")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_user_is_unauthorized() {
    let (app, _) = seeded_app().await;
    let (status, _) = send(&app.router, get("/me", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_stored_role_is_forbidden() {
    let id = Uuid::new_v4();
    let app = TestAppBuilder::new(MockIdentityService::new().with_raw_role(id, 9)).build();
    let (status, _) = send(&app.router, get("/me", id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_identity_outage_is_service_unavailable() {
    let app = TestAppBuilder::new(MockIdentityService::new_unavailable()).build();
    let (status, _) = send(&app.router, get("/areas", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_me_reports_role_from_identity_service() {
    let (app, cast) = seeded_app().await;

    let (status, body) = send(&app.router, get("/me", cast.student)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], cast.student.to_string());
    assert_eq!(body["role"], 2);
    assert_eq!(body["role_name"], "student");
    assert_eq!(body["name"], "Ana Silva");

    let (_, body) = send(&app.router, get("/me", cast.reviewer)).await;
    assert_eq!(body["role"], 0);
}

#[tokio::test]
async fn test_user_without_local_mirror_still_resolves() {
    let id = Uuid::new_v4();
    let app = TestAppBuilder::new(
        MockIdentityService::new().with_user(id, Role::Company, "x@y.pt"),
    )
    .build();

    let (status, body) = send(&app.router, get("/me", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], 1);
    assert!(body["name"].is_null());
}

#[tokio::test]
async fn test_review_route_rejects_non_reviewers_before_the_handler() {
    let (app, cast) = seeded_app().await;
    let body = serde_json::json!({"status": 1});

    for user in [cast.student, cast.company] {
        let req = request(Method::POST, "/cvs/1/review", Some(user), Some(body.clone()));
        let (status, _) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let req = request(Method::POST, "/cvs/1/review", None, Some(body));
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_token_required_when_secret_configured() {
    let cast = common::Cast::new();
    let app = TestAppBuilder::new(cast.identity())
        .config(jwt_config())
        .build();

    let (status, body) = send(&app.router, get("/me", cast.student)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Missing bearer token.");

    let mut req = get("/me", cast.student);
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token_for(cast.student, 3600))
            .parse()
            .unwrap(),
    );
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bearer_subject_must_match_header() {
    let cast = common::Cast::new();
    let app = TestAppBuilder::new(cast.identity())
        .config(jwt_config())
        .build();

    let mut req = get("/me", cast.student);
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token_for(cast.reviewer, 3600))
            .parse()
            .unwrap(),
    );
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Token subject does not match X-User-ID.");
}

#[tokio::test]
async fn test_expired_bearer_token_is_rejected() {
    let cast = common::Cast::new();
    let app = TestAppBuilder::new(cast.identity())
        .config(jwt_config())
        .build();

    let mut req = get("/me", cast.student);
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token_for(cast.student, -3600))
            .parse()
            .unwrap(),
    );
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Token expired.");
}

#[tokio::test]
async fn test_wrong_method_is_method_not_allowed() {
    let (app, cast) = seeded_app().await;
    let req = request(Method::DELETE, "/notifications", Some(cast.student), None);
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
