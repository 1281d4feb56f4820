#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use career_hub::{
    AppConfig, AppState, InMemoryRepository, MockIdentityService, MockMailer, MockStorageService,
    create_router,
    identity::IdentityState,
    mailer::MailerState,
    models::{Notification, Role},
    repository::RepositoryState,
    storage::StorageState,
};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;
use uuid::Uuid;

pub const BOUNDARY: &str = "----career-hub-test-boundary";

/// Router plus handles on the in-memory collaborators behind it.
pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub storage: Arc<MockStorageService>,
    pub mailer: Arc<MockMailer>,
}

/// One user of each role, registered in the mock identity service and the repository.
#[derive(Debug, Clone, Copy)]
pub struct Cast {
    pub reviewer: Uuid,
    pub company: Uuid,
    pub student: Uuid,
    pub other_student: Uuid,
}

pub struct TestAppBuilder {
    identity: MockIdentityService,
    storage: MockStorageService,
    mailer: MockMailer,
    config: AppConfig,
}

impl TestAppBuilder {
    pub fn new(identity: MockIdentityService) -> Self {
        Self {
            identity,
            storage: MockStorageService::new(),
            mailer: MockMailer::new(),
            config: AppConfig::default(),
        }
    }

    pub fn storage(mut self, storage: MockStorageService) -> Self {
        self.storage = storage;
        self
    }

    pub fn mailer(mut self, mailer: MockMailer) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> TestApp {
        let repo = Arc::new(InMemoryRepository::new());
        let storage = Arc::new(self.storage);
        let mailer = Arc::new(self.mailer);

        let state = AppState::new(
            self.config,
            repo.clone() as RepositoryState,
            storage.clone() as StorageState,
            Arc::new(self.identity) as IdentityState,
            mailer.clone() as MailerState,
        );

        TestApp {
            router: create_router(state),
            repo,
            storage,
            mailer,
        }
    }
}

impl Cast {
    pub fn new() -> Self {
        Self {
            reviewer: Uuid::new_v4(),
            company: Uuid::new_v4(),
            student: Uuid::new_v4(),
            other_student: Uuid::new_v4(),
        }
    }

    pub fn identity(&self) -> MockIdentityService {
        MockIdentityService::new()
            .with_user(self.reviewer, Role::Reviewer, "gabinete@uni.pt")
            .with_user(self.company, Role::Company, "rh@empresa.pt")
            .with_user(self.student, Role::Student, "ana@alunos.pt")
            .with_user(self.other_student, Role::Student, "rui@alunos.pt")
    }

    /// Mirrors the cast into the repository. The main student consents to sharing,
    /// the other one does not.
    pub async fn seed(&self, repo: &InMemoryRepository) {
        repo.seed_user(self.reviewer, Role::Reviewer, "Gabinete").await;
        repo.seed_company(self.company, "Empresa XPTO").await;
        repo.seed_student(self.student, "Ana Silva", true).await;
        repo.seed_student(self.other_student, "Rui Costa", false).await;
    }
}

/// Builds an app with the default cast already seeded.
pub async fn seeded_app() -> (TestApp, Cast) {
    seeded_app_with(|builder| builder).await
}

pub async fn seeded_app_with(
    customize: impl FnOnce(TestAppBuilder) -> TestAppBuilder,
) -> (TestApp, Cast) {
    let cast = Cast::new();
    let app = customize(TestAppBuilder::new(cast.identity())).build();
    cast.seed(&app.repo).await;
    (app, cast)
}

// --- Requests ---

pub fn request(method: Method, uri: &str, user: Option<Uuid>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn get(uri: &str, user: Uuid) -> Request<Body> {
    request(Method::GET, uri, Some(user), None)
}

/// Multipart request with the PDF in `cv` and an optional `descricao` field.
pub fn upload(user: Uuid, filename: &str, content_type: &str, bytes: &[u8], description: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"cv\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
    if let Some(description) = description {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"descricao\"\r\n\r\n{description}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/cvs/me")
        .header("x-user-id", user.to_string())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn pdf_bytes() -> Vec<u8> {
    b"%PDF-1.4\n1 0 obj<<>>endobj\ntrailer<<>>\n%%EOF".to_vec()
}

/// Sends the request through the router and decodes the JSON body (Null when empty).
pub async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

/// Polls until `count` notifications exist; delivery runs in a spawned task.
pub async fn wait_for_notifications(repo: &InMemoryRepository, count: usize) -> Vec<Notification> {
    for _ in 0..100 {
        let all = repo.all_notifications().await;
        if all.len() >= count {
            return all;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} notification(s) to be recorded");
}
