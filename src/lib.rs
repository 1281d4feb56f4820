use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::HeaderName,
    middleware,
};
use std::time::Duration;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod filters;
pub mod handlers;
pub mod identity;
pub mod mailer;
pub mod models;
pub mod repository;
pub mod services;
pub mod storage;

// Routers grouped by the access layer they sit behind (public, authenticated, reviewer).
pub mod routes;
use handlers::{areas, cvs, jobs, notifications, profiles};
use routes::{authenticated, public, reviewer};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use identity::{IdentityState, MockIdentityService, SupabaseIdentityClient};
pub use mailer::{ConsoleMailer, MailerState, MockMailer, SmtpMailer};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// Room left for the multipart framing and the description field around the PDF.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// ApiDoc
///
/// OpenAPI document for every `#[utoipa::path]` handler and the schemas they exchange.
/// Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        profiles::get_me, profiles::list_students, profiles::get_my_student,
        profiles::update_my_student, profiles::get_student, profiles::list_companies,
        profiles::get_my_company, profiles::update_my_company, profiles::get_company,
        areas::list_areas, areas::get_area, areas::create_area,
        jobs::list_jobs, jobs::get_job, jobs::create_job, jobs::update_job, jobs::delete_job,
        cvs::list_cvs, cvs::my_cvs, cvs::upload_cv, cvs::get_cv, cvs::delete_cv,
        cvs::get_cv_signed_url, cvs::review_cv, cvs::get_cv_access_log,
        notifications::list_notifications, notifications::mark_notification
    ),
    components(
        schemas(
            models::User, models::Area, models::StudentProfile, models::CompanyProfile,
            models::JobPosting, models::Cv, models::CvAccessLog, models::Notification,
            models::Opportunity, models::NotificationType, models::DeliveryStatus,
            models::CreateAreaRequest, models::UpdateStudentRequest,
            models::UpdateCompanyRequest, models::CreateJobPostingRequest,
            models::UpdateJobPostingRequest, models::ReviewCvRequest,
            models::MarkNotificationRequest, models::CvUploadForm, models::MeResponse,
            models::CvSignedUrlResponse, models::ReviewOutcome,
        )
    ),
    tags(
        (name = "career-hub", description = "Career office platform API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Single shared container for the collaborators and the two workflow services built on
/// top of them. Every field is cheap to clone (`Arc`s and small config values).
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    pub identity: IdentityState,
    pub mailer: MailerState,
    pub config: AppConfig,
    pub notifications: services::NotificationService,
    pub cvs: services::CvService,
}

impl AppState {
    /// new
    ///
    /// Wires the services from the collaborators and the loaded configuration.
    pub fn new(
        config: AppConfig,
        repo: RepositoryState,
        storage: StorageState,
        identity: IdentityState,
        mailer: MailerState,
    ) -> Self {
        let notifications = services::NotificationService::new(
            repo.clone(),
            identity.clone(),
            mailer.clone(),
            &config.site_url,
        );
        let cvs = services::CvService::new(
            repo.clone(),
            storage.clone(),
            notifications.clone(),
            config.cv_max_bytes,
            Duration::from_secs(config.signed_url_ttl_secs),
        );

        Self {
            repo,
            storage,
            identity,
            mailer,
            config,
            notifications,
            cvs,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routing tree, applies the scoped access layers and the global
/// observability stack, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");
    let body_limit = state.config.cv_max_bytes + MULTIPART_OVERHEAD_BYTES;

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        // Authenticated Routes: a missing or unknown identity stops here (401/403/503).
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::auth_middleware,
                ))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        // Reviewer Routes: the role gate runs inside the authentication layer.
        .merge(
            reviewer::reviewer_routes()
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::require_reviewer,
                ))
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::auth_middleware,
                )),
        )
        // Production hides internal error details behind a generic message.
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            error::mask_internal_errors,
        ))
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer` carrying the request id next to the method and URI, so every
/// log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    let user_id = request
        .headers()
        .get(auth::USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
        user_id = %user_id,
    )
}
