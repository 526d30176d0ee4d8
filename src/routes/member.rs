use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Member Router Module
///
/// Topic authoring. Every handler here takes the `SignedInUser` extractor, which
/// redirects anonymous visitors to `/signin` before the handler body runs. Edit and
/// delete additionally require the signed-in user to be the topic's author.
pub fn member_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /topic/create
        .route(
            "/topic/create",
            get(handlers::show_create_topic).post(handlers::create_topic),
        )
        // GET/POST /topic/{topicId}/edit
        .route(
            "/topic/{topicId}/edit",
            get(handlers::show_edit_topic).post(handlers::edit_topic),
        )
        // GET /topic/{topicId}/delete
        .route("/topic/{topicId}/delete", get(handlers::delete_topic))
}
