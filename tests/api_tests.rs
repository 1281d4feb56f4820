mod common;

use common::{Cast, TestAppBuilder};
use tokio::net::TcpListener;

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
    pub cast: Cast,
}

/// Serves the in-memory app on a random port.
async fn spawn_app() -> TestApp {
    let cast = Cast::new();
    let app = TestAppBuilder::new(cast.identity()).build();
    cast.seed(&app.repo).await;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let router = app.router;
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address, cast }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = reqwest::Client::new()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let app = spawn_app().await;
    let doc: serde_json::Value = reqwest::get(format!("{}/api-docs/openapi.json", app.address))
        .await
        .expect("req fail")
        .json()
        .await
        .unwrap();

    let paths = doc["paths"].as_object().unwrap();
    for path in [
        "/me",
        "/students",
        "/jobs/{id}",
        "/cvs/me",
        "/cvs/{id}/review",
        "/cvs/{id}/signed-url",
        "/notifications/{id}",
    ] {
        assert!(paths.contains_key(path), "missing {path}");
    }
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = spawn_app().await;
    let response = reqwest::Client::new()
        .get(format!("{}/me", app.address))
        .header("x-user-id", app.cast.student.to_string())
        .header("x-request-id", "trace-me")
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-request-id"], "trace-me");
}
