use crate::{AppState, handlers, validation::validate_credentials};
use axum::{
    Router, middleware,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: the index, topic detail pages and the
/// sign-in / sign-up / sign-out flow.
///
/// The credential routes (`POST /signin`, `POST /signup`) are guarded by the
/// `validate_credentials` middleware. It is layered onto the POST method only, so the
/// GET forms stay unaffected and an invalid body never reaches the controller.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers and process supervisors.
        .route("/health", get(|| async { "ok" }))
        // GET /
        // Topic index, in insertion order.
        .route("/", get(handlers::show_index))
        // GET/POST /signin
        .route(
            "/signin",
            get(handlers::show_signin).merge(
                post(handlers::signin).route_layer(middleware::from_fn(validate_credentials)),
            ),
        )
        // GET/POST /signup
        .route(
            "/signup",
            get(handlers::show_signup).merge(
                post(handlers::signup).route_layer(middleware::from_fn(validate_credentials)),
            ),
        )
        // GET /signout
        .route("/signout", get(handlers::signout))
        // GET /topic/{topicId}
        // Detail page. Unknown or non-numeric IDs produce the 404 page.
        .route("/topic/{topicId}", get(handlers::show_topic))
}
