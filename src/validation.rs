use std::sync::OnceLock;

use axum::{
    Form, Json,
    body::{Body, to_bytes},
    extract::{FromRequest, Request},
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::{
    error::AppError,
    models::{Credentials, TopicForm},
};

/// Largest credentials body the validation layer will buffer.
const MAX_CREDENTIALS_BODY: usize = 16 * 1024;

pub const NICKNAME_MAX: usize = 20;
pub const TITLE_MAX: usize = 100;

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
static PASSWORD_RE: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        // Atom characters and dots before '@', then at least two dot-separated labels.
        let pattern = r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$";
        Regex::new(pattern).unwrap_or_else(|error| panic!("email regex failed to compile: {error}"))
    })
}

fn password_regex() -> &'static Regex {
    PASSWORD_RE.get_or_init(|| {
        Regex::new("^[a-zA-Z0-9]{3,30}$")
            .unwrap_or_else(|error| panic!("password regex failed to compile: {error}"))
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

pub fn is_valid_password(password: &str) -> bool {
    password_regex().is_match(password)
}

/// Every credential rule `(email, password)` breaks, in field order. Empty when valid.
pub fn credential_errors(email: &str, password: &str) -> Vec<String> {
    let mut details = Vec::new();
    if !is_valid_email(email) {
        details.push(r#""email" must be a valid email"#.to_string());
    }
    if !is_valid_password(password) {
        details.push(r#""password" must be 3 to 30 characters, letters and digits only"#.to_string());
    }
    details
}

pub fn nickname_errors(nickname: &str) -> Vec<String> {
    let length = nickname.trim().chars().count();
    if length == 0 {
        vec![r#""nickname" must not be empty"#.to_string()]
    } else if length > NICKNAME_MAX {
        vec![format!(r#""nickname" must be at most {NICKNAME_MAX} characters"#)]
    } else {
        Vec::new()
    }
}

pub fn topic_errors(form: &TopicForm) -> Vec<String> {
    let mut details = Vec::new();
    let title_length = form.title.trim().chars().count();
    if title_length == 0 {
        details.push(r#""title" must not be empty"#.to_string());
    } else if title_length > TITLE_MAX {
        details.push(format!(r#""title" must be at most {TITLE_MAX} characters"#));
    }
    if form.content.trim().is_empty() {
        details.push(r#""content" must not be empty"#.to_string());
    }
    details
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| {
            let mime = mime.trim();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

/// Submitted Extractor
///
/// Decodes a request body from either an HTML form post or a JSON document, chosen by
/// `Content-Type`. A body that cannot be decoded is reported as a validation failure.
#[derive(Debug, Clone)]
pub struct Submitted<T>(pub T);

impl<T, S> FromRequest<S> for Submitted<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_json(request.headers()) {
            let Json(value) = Json::<T>::from_request(request, state)
                .await
                .map_err(|rejection| AppError::Validation(vec![rejection.body_text()]))?;
            Ok(Submitted(value))
        } else {
            let Form(value) = Form::<T>::from_request(request, state)
                .await
                .map_err(|rejection| AppError::Validation(vec![rejection.body_text()]))?;
            Ok(Submitted(value))
        }
    }
}

/// validate_credentials
///
/// Middleware gating the credential routes. Buffers the body, checks the submitted
/// `email` and `password`, and either answers with the 400 validation payload (the
/// controller never runs) or hands the untouched body on to the next handler.
pub async fn validate_credentials(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match to_bytes(body, MAX_CREDENTIALS_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "unreadable credentials body");
            return AppError::Validation(vec!["request body could not be read".to_string()])
                .into_response();
        }
    };

    // Decode a copy so the original parts and bytes reach the controller unchanged.
    let mut probe = Request::new(Body::from(bytes.clone()));
    *probe.method_mut() = Method::POST;
    if let Some(content_type) = parts.headers.get(header::CONTENT_TYPE) {
        probe
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type.clone());
    }

    let credentials = match Submitted::<Credentials>::from_request(probe, &()).await {
        Ok(Submitted(credentials)) => credentials,
        Err(rejection) => return rejection.into_response(),
    };

    let details = credential_errors(&credentials.email, &credentials.password);
    if !details.is_empty() {
        tracing::debug!(uri = %parts.uri, ?details, "credentials rejected");
        return AppError::Validation(details).into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
