//! Cortexify API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Registration, OTP verification, and login
//! - Chat orchestration (single-shot and streaming)
//! - Session listing, history retrieval, and deletion
//! - Observability (logging, metrics, tracing)

mod handlers;

use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use cortexify_common::{
    auth::JwtManager,
    chat::ChatService,
    config::AppConfig,
    db::{DbPool, Repository},
    email::Mailer,
    llm, metrics,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn, Level};

/// Application state shared across handlers
#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub chat: ChatService,
    pub mailer: Mailer,
    pub jwt: Arc<JwtManager>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting Cortexify API Gateway v{}", cortexify_common::VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;

    let config = Arc::new(config);

    // Initialize metrics
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    // Auth, email, and completion collaborators
    let jwt_secret = config.auth.jwt_secret.clone().unwrap_or_else(|| {
        warn!("No JWT secret configured; using a random one, tokens will not survive restarts");
        uuid::Uuid::new_v4().to_string()
    });
    let jwt = Arc::new(JwtManager::new(&jwt_secret, config.auth.jwt_expiration_secs));
    let mailer = Mailer::new(&config.email)?;
    let provider = llm::create_provider(&config.llm);
    let chat = ChatService::new(Repository::new(db.clone()), provider, &config.llm);

    // Create app state
    let state = AppState {
        config: config.clone(),
        db: db.clone(),
        chat,
        mailer,
        jwt,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await?;
    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration (permissive, as the frontend is served elsewhere)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Service banner and health endpoints (no auth)
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Auth endpoints
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/verify-otp", post(handlers::auth::verify_otp))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/request-otp", post(handlers::auth::request_otp))
        .route("/auth/reset-password", post(handlers::auth::reset_password))
        .route("/auth/me", get(handlers::auth::me))

        // Chat endpoints (anonymous or bearer)
        .route("/chat", post(handlers::chat::send_message))
        .route("/chat/stream", post(handlers::chat::stream_message))
        .route("/chat/sessions", get(handlers::chat::list_sessions))
        .route(
            "/chat/session/{session_id}",
            get(handlers::chat::get_history).delete(handlers::chat::delete_session),
        )

        // Status check endpoints
        .route(
            "/status",
            post(handlers::status::create_status_check).get(handlers::status::list_status_checks),
        );

    // Compose the app
    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
