use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use minijinja::context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{repository::RepositoryError, templates::Templates};

/// AppError
///
/// Every failure a controller or extractor can produce. Validation failures are answered
/// on the spot; everything else becomes an error page rendered by `render_error_pages`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),
    #[error("sign in required")]
    Unauthenticated,
    #[error("not allowed to modify this resource")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error(transparent)]
    Password(#[from] crate::auth::PasswordError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// ValidationErrorBody
///
/// The structured 400 payload: `{ "code": 400, "message": [<detail>, ...] }`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationErrorBody {
    pub code: u16,
    pub message: Vec<String>,
}

/// ErrorPage
///
/// Marker attached to a response's extensions. `render_error_pages` swaps the
/// plain-text body of any marked response for the rendered `error.html`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPage {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(message) => {
                let body = ValidationErrorBody {
                    code: StatusCode::BAD_REQUEST.as_u16(),
                    message,
                };
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            AppError::Unauthenticated => return Redirect::to("/signin").into_response(),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "You are not allowed to do that.".to_string(),
            ),
            AppError::NotFound(what) => {
                tracing::debug!("not found: {}", what);
                (
                    StatusCode::NOT_FOUND,
                    "The page you asked for does not exist.".to_string(),
                )
            }
            other => {
                // The detail goes to the log, never to the client.
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong. Please try again later.".to_string(),
                )
            }
        };

        let mut response = (status, message.clone()).into_response();
        response
            .extensions_mut()
            .insert(ErrorPage { status, message });
        response
    }
}

/// render_error_pages
///
/// The process-wide error handler. Runs around every route and turns responses marked
/// with `ErrorPage` into the rendered error template. If the template itself fails, the
/// plain-text body produced by `AppError` is kept.
pub async fn render_error_pages(
    State(templates): State<Templates>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    let Some(page) = response.extensions().get::<ErrorPage>().cloned() else {
        return response;
    };

    match templates.render(
        "error.html",
        context! {
            status => page.status.as_u16(),
            reason => page.status.canonical_reason().unwrap_or("Error"),
            message => page.message,
        },
    ) {
        Ok(html) => {
            let (mut parts, _) = response.into_parts();
            parts.headers.remove(header::CONTENT_LENGTH);
            parts.headers.remove(header::CONTENT_TYPE);
            (parts, Html(html)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to render error page");
            response
        }
    }
}
