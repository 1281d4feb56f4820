use career_hub::{
    AppState,
    config::{AppConfig, EmailBackend, Env},
    create_router,
    identity::{EmailFallback, IdentityState, SupabaseIdentityClient},
    mailer::{ConsoleMailer, MailerState, SmtpMailer},
    repository::{PostgresRepository, RepositoryState},
    storage::{S3StorageClient, StorageService, StorageState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads the configuration, initializes logging and every collaborator (Postgres,
/// S3 storage, Supabase identity, mail transport), then serves the HTTP API.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise debug for this crate.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "career_hub=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Email settings are checked before anything is connected.
    if let Err(message) = config.email.validate(&config.env) {
        panic!("FATAL: {message}");
    }

    // 4. Database Initialization (Postgres) and schema migrations.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Database migrations failed.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 5. Storage Initialization (S3/MinIO)
    let s3_client = S3StorageClient::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_key,
        &config.s3_secret,
        &config.cv_bucket,
    )
    .await;

    // LOCAL-ONLY: create the MinIO bucket on first start.
    if config.env == Env::Local {
        s3_client.ensure_bucket_exists().await;
    }
    let storage = Arc::new(s3_client) as StorageState;

    // 6. Identity (Supabase). The generated fallback address only exists locally.
    let fallback = (config.env == Env::Local).then(|| EmailFallback {
        address: config.debug_fallback_email.clone(),
    });
    let identity = Arc::new(SupabaseIdentityClient::new(
        &config.supabase_url,
        &config.supabase_service_key,
        fallback,
    )) as IdentityState;

    // 7. Mail transport
    let mailer = match config.email.backend {
        EmailBackend::Smtp => Arc::new(
            SmtpMailer::from_config(&config.email)
                .expect("FATAL: Could not build the SMTP transport."),
        ) as MailerState,
        EmailBackend::Console => Arc::new(ConsoleMailer) as MailerState,
    };

    // 8. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::new(config, repo, storage, identity, mailer);

    // 9. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Could not bind the HTTP listener.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
