use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;

use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod templates;
pub mod validation;

// Route tables, split by access level (Public, Member).
pub mod routes;
use auth::{PasswordService, SessionKeys, SignedInUser};
use routes::{member, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use templates::Templates;

/// AppState
///
/// The single, immutable container shared by every request: the data accessor, the view
/// layer, credential services and configuration. Holds no per-user state; the session
/// arrives with each request and is resolved by the `CurrentUser` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: the topic/user accessor.
    pub repo: RepositoryState,
    /// View Layer: compiled page templates.
    pub templates: Templates,
    /// Password hashing (argon2id).
    pub passwords: PasswordService,
    /// Session token signing.
    pub sessions: SessionKeys,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Builds the state around a repository, deriving the remaining services from config.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Result<Self, AppError> {
        Ok(Self {
            repo,
            templates: Templates::new()?,
            passwords: PasswordService::new()?,
            sessions: SessionKeys::from_config(&config),
            config,
        })
    }

    /// State over a fresh in-memory store with default configuration.
    pub fn in_memory() -> Result<Self, AppError> {
        Self::new(Arc::new(InMemoryRepository::new()), AppConfig::default())
    }
}

// --- Axum FromRef Extractor Implementations ---

// These let handlers, extractors and middleware pull single components out of AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for Templates {
    fn from_ref(app_state: &AppState) -> Templates {
        app_state.templates.clone()
    }
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(app_state: &AppState) -> SessionKeys {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// require_session
///
/// Guards the member routes. `SignedInUser` rejects anonymous requests with a redirect to
/// `/signin`, so the wrapped handler only ever runs for a signed-in user. The resolved
/// user is stored in the request extensions, where the handler's own `SignedInUser`
/// picks it up.
async fn require_session(
    SignedInUser(user): SignedInUser,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(user);
    next.run(request).await
}

/// create_router
///
/// Assembles the full route table, the static file service, the process-wide error page
/// handler and the observability layers, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(public::public_routes())
        .merge(
            member::member_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_session,
            )),
        )
        // Static assets (stylesheets) for the rendered pages.
        .nest_service("/public", ServeDir::new("public"))
        // Anything unmatched is a 404 page.
        .fallback(handlers::not_found)
        // Every error page (404, 403, 500) is rendered here, in one place.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            error::render_error_pages,
        ))
        .with_state(state);

    base_router.layer(
        ServiceBuilder::new()
            // Request ID Generation: a UUID for every incoming request.
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            // Request Tracing: wraps the request/response lifecycle in a span.
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace_span_logger)
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .latency_unit(tower_http::LatencyUnit::Millis),
                    ),
            )
            // Request ID Propagation: echoes x-request-id back to the client.
            .layer(PropagateRequestIdLayer::new(x_request_id)),
    )
}

/// trace_span_logger
///
/// Builds the `http_request` span for `TraceLayer`, carrying the request ID so every log
/// line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
