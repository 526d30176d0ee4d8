use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use minijinja::context;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{CurrentUser, SignedInUser, end_session},
    error::AppError,
    models::{
        Credentials, NewTopic, NewUser, SessionUser, SignupForm, Topic, TopicChanges, TopicForm,
        TopicPath,
    },
    repository::RepositoryError,
    validation::{Submitted, nickname_errors, topic_errors},
};

/// Renders a template with a 200 status.
fn page<S: Serialize>(state: &AppState, name: &str, ctx: S) -> Result<Html<String>, AppError> {
    Ok(Html(state.templates.render(name, ctx)?))
}

/// Redirects and adds a fresh session cookie for `user_id` to the jar.
fn start_session(
    state: &AppState,
    jar: CookieJar,
    user_id: Uuid,
    to: &str,
) -> Result<Response, AppError> {
    let token = state.sessions.issue(user_id)?;
    let jar = jar.add(state.sessions.session_cookie(token));
    Ok((jar, Redirect::to(to)).into_response())
}

/// Loads a topic the signed-in user is allowed to modify.
async fn load_own_topic(
    state: &AppState,
    user: &SessionUser,
    path: &TopicPath,
) -> Result<Topic, AppError> {
    let id = path.id()?;
    let topic = state
        .repo
        .get_topic(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("topic {id}")))?;
    if topic.author_id != user.id {
        return Err(AppError::Forbidden);
    }
    Ok(topic)
}

// --- Index & Session Handlers ---

/// show_index
///
/// `GET /`. Lists every topic in insertion order. An accessor failure is forwarded;
/// nothing is rendered partially.
pub async fn show_index(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Html<String>, AppError> {
    let topics = state.repo.list_topics().await?;
    page(&state, "index.html", context! { user, topics })
}

/// `GET /signin`. A static form; the session is not resolved here.
pub async fn show_signin(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    page(
        &state,
        "signin.html",
        context! { user => None::<SessionUser>, email => "" },
    )
}

/// signin
///
/// `POST /signin`, behind `validate_credentials`. On a match the session cookie is set
/// and the browser is sent to the index; otherwise the form is shown again with 401.
pub async fn signin(
    State(state): State<AppState>,
    jar: CookieJar,
    Submitted(credentials): Submitted<Credentials>,
) -> Result<Response, AppError> {
    let user = state.repo.find_user_by_email(&credentials.email).await?;

    let authenticated = match user {
        Some(user) => state
            .passwords
            .verify_password(&credentials.password, &user.password_hash)?
            .then_some(user),
        None => {
            state.passwords.verify_unknown_user(&credentials.password);
            None
        }
    };

    match authenticated {
        Some(user) => {
            tracing::info!(user_id = %user.id, "user signed in");
            start_session(&state, jar, user.id, "/")
        }
        None => {
            tracing::warn!(email = %credentials.email, "sign-in rejected");
            let html = page(
                &state,
                "signin.html",
                context! {
                    user => None::<SessionUser>,
                    email => credentials.email,
                    error => "Incorrect email or password.",
                },
            )?;
            Ok((StatusCode::UNAUTHORIZED, html).into_response())
        }
    }
}

/// `GET /signup`. A static form, like the sign-in page.
pub async fn show_signup(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    page(
        &state,
        "signup.html",
        context! {
            user => None::<SessionUser>,
            email => "",
            nickname => "",
            errors => Vec::<String>::new(),
        },
    )
}

/// signup
///
/// `POST /signup`, behind `validate_credentials`. Registers the user and signs them in.
/// Uniqueness is the repository's call; a conflict is shown to the user as a 409 form.
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Submitted(form): Submitted<SignupForm>,
) -> Result<Response, AppError> {
    let rerender = |status: StatusCode, errors: Vec<String>, form: &SignupForm| {
        let html = page(
            &state,
            "signup.html",
            context! {
                user => None::<SessionUser>,
                email => form.email.clone(),
                nickname => form.nickname.clone(),
                errors,
            },
        )?;
        Ok::<Response, AppError>((status, html).into_response())
    };

    let errors = nickname_errors(&form.nickname);
    if !errors.is_empty() {
        return rerender(StatusCode::BAD_REQUEST, errors, &form);
    }

    let new_user = NewUser {
        email: form.email.clone(),
        nickname: form.nickname.trim().to_string(),
        password_hash: state.passwords.hash_password(&form.password)?,
    };

    match state.repo.create_user(new_user).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "user registered");
            start_session(&state, jar, user.id, "/")
        }
        Err(RepositoryError::Conflict(reason)) => {
            tracing::info!(%reason, "registration refused");
            rerender(
                StatusCode::CONFLICT,
                vec!["This email is already registered.".to_string()],
                &form,
            )
        }
        Err(e) => Err(e.into()),
    }
}

/// `GET /signout`. Expires the session cookie and returns to the index.
pub async fn signout(jar: CookieJar) -> (CookieJar, Redirect) {
    (end_session(jar), Redirect::to("/"))
}

// --- Topic Handlers ---

/// `GET /topic/create`.
pub async fn show_create_topic(
    State(state): State<AppState>,
    SignedInUser(user): SignedInUser,
) -> Result<Html<String>, AppError> {
    page(
        &state,
        "topic/new.html",
        context! { user, form => TopicForm::default(), errors => Vec::<String>::new() },
    )
}

/// create_topic
///
/// `POST /topic/create`. Persists the topic under the signed-in author and redirects
/// to its detail page.
pub async fn create_topic(
    State(state): State<AppState>,
    SignedInUser(user): SignedInUser,
    Submitted(form): Submitted<TopicForm>,
) -> Result<Response, AppError> {
    let errors = topic_errors(&form);
    if !errors.is_empty() {
        let html = page(&state, "topic/new.html", context! { user, form, errors })?;
        return Ok((StatusCode::BAD_REQUEST, html).into_response());
    }

    let topic = state
        .repo
        .create_topic(NewTopic {
            author_id: user.id,
            author_name: user.nickname.clone(),
            title: form.title.trim().to_string(),
            content: form.content.trim().to_string(),
        })
        .await?;

    tracing::info!(topic_id = topic.id, user_id = %user.id, "topic created");
    Ok(Redirect::to(&format!("/topic/{}", topic.id)).into_response())
}

/// show_topic
///
/// `GET /topic/{topicId}`. A missing (or non-numeric) ID is a 404, not a failure.
pub async fn show_topic(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(path): Path<TopicPath>,
) -> Result<Html<String>, AppError> {
    let id = path.id()?;
    let topic = state
        .repo
        .get_topic(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("topic {id}")))?;
    page(&state, "topic/show.html", context! { user, topic })
}

/// `GET /topic/{topicId}/edit`. Author only.
pub async fn show_edit_topic(
    State(state): State<AppState>,
    SignedInUser(user): SignedInUser,
    Path(path): Path<TopicPath>,
) -> Result<Html<String>, AppError> {
    let topic = load_own_topic(&state, &user, &path).await?;
    let form = TopicForm {
        title: topic.title.clone(),
        content: topic.content.clone(),
    };
    page(
        &state,
        "topic/edit.html",
        context! { user, topic, form, errors => Vec::<String>::new() },
    )
}

/// edit_topic
///
/// `POST /topic/{topicId}/edit`. Author only. Replaces title and content, then
/// redirects to the detail page.
pub async fn edit_topic(
    State(state): State<AppState>,
    SignedInUser(user): SignedInUser,
    Path(path): Path<TopicPath>,
    Submitted(form): Submitted<TopicForm>,
) -> Result<Response, AppError> {
    let topic = load_own_topic(&state, &user, &path).await?;

    let errors = topic_errors(&form);
    if !errors.is_empty() {
        let html = page(
            &state,
            "topic/edit.html",
            context! { user, topic, form, errors },
        )?;
        return Ok((StatusCode::BAD_REQUEST, html).into_response());
    }

    let changes = TopicChanges {
        title: form.title.trim().to_string(),
        content: form.content.trim().to_string(),
    };
    // The topic may have been deleted between the ownership check and the update.
    let updated = state
        .repo
        .update_topic(topic.id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("topic {}", topic.id)))?;

    tracing::info!(topic_id = updated.id, user_id = %user.id, "topic edited");
    Ok(Redirect::to(&format!("/topic/{}", updated.id)).into_response())
}

/// `GET /topic/{topicId}/delete`. Author only. Redirects to the index.
pub async fn delete_topic(
    State(state): State<AppState>,
    SignedInUser(user): SignedInUser,
    Path(path): Path<TopicPath>,
) -> Result<Response, AppError> {
    let topic = load_own_topic(&state, &user, &path).await?;
    if !state.repo.delete_topic(topic.id).await? {
        return Err(AppError::NotFound(format!("topic {}", topic.id)));
    }
    tracing::info!(topic_id = topic.id, user_id = %user.id, "topic deleted");
    Ok(Redirect::to("/").into_response())
}

/// Fallback for every request no route matched.
pub async fn not_found() -> AppError {
    AppError::NotFound("page".to_string())
}
