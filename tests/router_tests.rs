use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use chrono::Utc;
use forum_portal::{
    AppConfig, AppState,
    auth::SessionKeys,
    create_router,
    error::ValidationErrorBody,
    models::{NewTopic, NewUser, Topic, TopicChanges, User},
    repository::{InMemoryRepository, Repository, RepositoryError, RepositoryResult},
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tower::util::ServiceExt;
use uuid::Uuid;

// --- Test Doubles ---

/// Delegates to an in-memory store and counts credential lookups, which is how the
/// sign-in controller announces that it ran, and session user reads.
#[derive(Default)]
struct SpyRepository {
    inner: InMemoryRepository,
    email_lookups: AtomicUsize,
    user_reads: AtomicUsize,
}

#[async_trait]
impl Repository for SpyRepository {
    async fn list_topics(&self) -> RepositoryResult<Vec<Topic>> {
        self.inner.list_topics().await
    }
    async fn get_topic(&self, id: i64) -> RepositoryResult<Option<Topic>> {
        self.inner.get_topic(id).await
    }
    async fn create_topic(&self, topic: NewTopic) -> RepositoryResult<Topic> {
        self.inner.create_topic(topic).await
    }
    async fn update_topic(
        &self,
        id: i64,
        changes: TopicChanges,
    ) -> RepositoryResult<Option<Topic>> {
        self.inner.update_topic(id, changes).await
    }
    async fn delete_topic(&self, id: i64) -> RepositoryResult<bool> {
        self.inner.delete_topic(id).await
    }
    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        self.user_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_user(id).await
    }
    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        self.email_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_user_by_email(email).await
    }
    async fn create_user(&self, user: NewUser) -> RepositoryResult<User> {
        self.inner.create_user(user).await
    }
}

/// Every call fails, simulating an unreachable database.
struct FailingRepository;

fn unavailable<T>() -> RepositoryResult<T> {
    Err(RepositoryError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl Repository for FailingRepository {
    async fn list_topics(&self) -> RepositoryResult<Vec<Topic>> {
        unavailable()
    }
    async fn get_topic(&self, _id: i64) -> RepositoryResult<Option<Topic>> {
        unavailable()
    }
    async fn create_topic(&self, _topic: NewTopic) -> RepositoryResult<Topic> {
        unavailable()
    }
    async fn update_topic(
        &self,
        _id: i64,
        _changes: TopicChanges,
    ) -> RepositoryResult<Option<Topic>> {
        unavailable()
    }
    async fn delete_topic(&self, _id: i64) -> RepositoryResult<bool> {
        unavailable()
    }
    async fn get_user(&self, _id: Uuid) -> RepositoryResult<Option<User>> {
        unavailable()
    }
    async fn find_user_by_email(&self, _email: &str) -> RepositoryResult<Option<User>> {
        unavailable()
    }
    async fn create_user(&self, _user: NewUser) -> RepositoryResult<User> {
        unavailable()
    }
}

// --- Test Utilities ---

fn router_over(repo: Arc<dyn Repository>) -> Router {
    create_router(AppState::new(repo, AppConfig::default()).unwrap())
}

fn topic(id: i64, title: &str) -> Topic {
    Topic {
        id,
        author_id: Uuid::from_u128(1),
        author_name: "seed".to_string(),
        title: title.to_string(),
        content: format!("content of {title}"),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

/// The `name=value` part of the response's session cookie.
fn session_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

/// Registers a user through the router and returns their session cookie.
async fn sign_up(app: &Router, email: &str, nickname: &str) -> String {
    let body = format!("email={email}&nickname={nickname}&password=abc123");
    let response = app
        .clone()
        .oneshot(post_form("/signup", &body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    session_cookie(&response)
}

// --- Index ---

#[tokio::test]
async fn test_index_lists_topics_in_insertion_order_on_every_request() {
    let repo = Arc::new(InMemoryRepository::new());
    repo.seed_topic(topic(1, "First")).await;
    repo.seed_topic(topic(2, "Second")).await;
    repo.seed_topic(topic(3, "Third")).await;
    let app = router_over(repo);

    let first = body_text(app.clone().oneshot(get("/", None)).await.unwrap()).await;
    let second = body_text(app.clone().oneshot(get("/", None)).await.unwrap()).await;

    let order = |html: &str| {
        ["First", "Second", "Third"]
            .iter()
            .map(|title| html.find(title).unwrap())
            .collect::<Vec<_>>()
    };
    let positions = order(&first);
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_index_accessor_failure_renders_generic_error() {
    let app = router_over(Arc::new(FailingRepository));

    let response = app.oneshot(get("/", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let html = body_text(response).await;
    assert!(html.contains("500"));
    assert!(!html.contains("connection refused"), "details stay in the log");
}

// --- Topic Detail ---

#[tokio::test]
async fn test_existing_topic_renders_detail() {
    let repo = Arc::new(InMemoryRepository::new());
    repo.seed_topic(topic(42, "Answer")).await;
    let app = router_over(repo);

    let response = app.oneshot(get("/topic/42", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Answer"));
    assert!(html.contains("content of Answer"));
}

#[tokio::test]
async fn test_missing_topic_is_not_found() {
    let repo = Arc::new(InMemoryRepository::new());
    repo.seed_topic(topic(42, "Answer")).await;
    let app = router_over(repo);

    for uri in ["/topic/999", "/topic/not-a-number", "/no/such/page"] {
        let response = app.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        let html = body_text(response).await;
        assert!(html.contains("404"), "{uri} should render the error page");
    }
}

// --- Sign In ---

#[tokio::test]
async fn test_signin_and_signup_forms_render_without_the_store() {
    let app = router_over(Arc::new(FailingRepository));
    let token = SessionKeys::from_config(&AppConfig::default())
        .issue(Uuid::new_v4())
        .unwrap();
    let cookie = format!("forum_session={token}");

    for uri in ["/signin", "/signup"] {
        let response = app.clone().oneshot(get(uri, Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert!(body_text(response).await.contains("<form"), "{uri}");
    }
}

#[tokio::test]
async fn test_signin_invalid_body_never_reaches_controller() {
    let spy = Arc::new(SpyRepository::default());
    let app = router_over(spy.clone());

    let response = app
        .oneshot(post_form("/signin", "email=not-an-email&password=ab", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload: ValidationErrorBody = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(payload.code, 400);
    assert!(!payload.message.is_empty());
    assert_eq!(spy.email_lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_signin_valid_body_attempts_authentication() {
    let spy = Arc::new(SpyRepository::default());
    let app = router_over(spy.clone());

    let response = app
        .oneshot(post_form("/signin", "email=a@b.com&password=abc123", None))
        .await
        .unwrap();

    // Nobody is registered, so authentication is attempted and fails.
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(spy.email_lookups.load(Ordering::SeqCst), 1);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_signin_with_registered_user_sets_session() {
    let app = router_over(Arc::new(InMemoryRepository::new()));
    sign_up(&app, "ada@example.com", "Ada").await;

    let wrong = app
        .clone()
        .oneshot(post_form(
            "/signin",
            "email=ada@example.com&password=wrong1",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let right = app
        .clone()
        .oneshot(post_form(
            "/signin",
            "email=ada@example.com&password=abc123",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(right.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&right), "/");
    let cookie = session_cookie(&right);

    let index = body_text(app.oneshot(get("/", Some(&cookie))).await.unwrap()).await;
    assert!(index.contains("Ada"));
    assert!(index.contains("Sign out"));
}

// --- Sign Up / Sign Out ---

#[tokio::test]
async fn test_signup_duplicate_email_is_reported_to_user() {
    let app = router_over(Arc::new(InMemoryRepository::new()));
    sign_up(&app, "ada@example.com", "Ada").await;

    let response = app
        .oneshot(post_form(
            "/signup",
            "email=ada@example.com&nickname=Other&password=abc123",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(body_text(response).await.contains("already registered"));
}

#[tokio::test]
async fn test_signup_requires_nickname() {
    let app = router_over(Arc::new(InMemoryRepository::new()));

    let response = app
        .oneshot(post_form(
            "/signup",
            "email=ada@example.com&nickname=&password=abc123",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("nickname"));
}

#[tokio::test]
async fn test_signout_clears_session() {
    let app = router_over(Arc::new(InMemoryRepository::new()));
    let cookie = sign_up(&app, "ada@example.com", "Ada").await;

    let response = app
        .oneshot(get("/signout", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("forum_session=;"));
    assert!(set_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_signout_without_session_sets_no_cookie() {
    let app = router_over(Arc::new(InMemoryRepository::new()));

    let response = app.oneshot(get("/signout", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

// --- Topic Lifecycle ---

#[tokio::test]
async fn test_member_route_resolves_session_user_once() {
    let spy = Arc::new(SpyRepository::default());
    let app = router_over(spy.clone());
    let cookie = sign_up(&app, "ada@example.com", "Ada").await;
    spy.user_reads.store(0, Ordering::SeqCst);

    let response = app
        .oneshot(get("/topic/create", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Ada"));
    assert_eq!(spy.user_reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_anonymous_authoring_redirects_to_signin() {
    let repo = Arc::new(InMemoryRepository::new());
    repo.seed_topic(topic(1, "Seeded")).await;
    let app = router_over(repo);

    for request in [
        get("/topic/create", None),
        post_form("/topic/create", "title=x&content=y", None),
        get("/topic/1/edit", None),
        get("/topic/1/delete", None),
    ] {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/signin");
    }
}

#[tokio::test]
async fn test_create_edit_delete_topic() {
    let app = router_over(Arc::new(InMemoryRepository::new()));
    let cookie = sign_up(&app, "ada@example.com", "Ada").await;

    // Create
    let created = app
        .clone()
        .oneshot(post_form(
            "/topic/create",
            "title=Hello+forum&content=First+post",
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&created), "/topic/1");

    // Show (the author sees the edit link)
    let shown = body_text(
        app.clone()
            .oneshot(get("/topic/1", Some(&cookie)))
            .await
            .unwrap(),
    )
    .await;
    assert!(shown.contains("Hello forum"));
    assert!(shown.contains("/topic/1/edit"));

    // Edit form is prefilled
    let edit_form = body_text(
        app.clone()
            .oneshot(get("/topic/1/edit", Some(&cookie)))
            .await
            .unwrap(),
    )
    .await;
    assert!(edit_form.contains("First post"));

    // Edit
    let edited = app
        .clone()
        .oneshot(post_form(
            "/topic/1/edit",
            "title=Hello+again&content=Edited",
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(edited.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&edited), "/topic/1");
    let shown = body_text(app.clone().oneshot(get("/topic/1", None)).await.unwrap()).await;
    assert!(shown.contains("Hello again"));
    assert!(!shown.contains("/topic/1/edit"), "anonymous visitors get no edit link");

    // Delete
    let deleted = app
        .clone()
        .oneshot(get("/topic/1/delete", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&deleted), "/");

    let gone = app.oneshot(get("/topic/1", None)).await.unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_topic_form_is_rerendered() {
    let app = router_over(Arc::new(InMemoryRepository::new()));
    let cookie = sign_up(&app, "ada@example.com", "Ada").await;

    let response = app
        .oneshot(post_form(
            "/topic/create",
            "title=&content=",
            Some(&cookie),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_text(response).await;
    assert!(html.contains("title"));
    assert!(html.contains("content"));
}

#[tokio::test]
async fn test_only_author_may_modify_topic() {
    let app = router_over(Arc::new(InMemoryRepository::new()));
    let author = sign_up(&app, "ada@example.com", "Ada").await;
    let other = sign_up(&app, "bob@example.com", "Bob").await;

    app.clone()
        .oneshot(post_form(
            "/topic/create",
            "title=Mine&content=Hands+off",
            Some(&author),
        ))
        .await
        .unwrap();

    for request in [
        get("/topic/1/edit", Some(&other)),
        post_form("/topic/1/edit", "title=Yours&content=Now", Some(&other)),
        get("/topic/1/delete", Some(&other)),
    ] {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    let shown = body_text(app.oneshot(get("/topic/1", None)).await.unwrap()).await;
    assert!(shown.contains("Mine"));
}

#[tokio::test]
async fn test_editing_missing_topic_is_not_found() {
    let app = router_over(Arc::new(InMemoryRepository::new()));
    let cookie = sign_up(&app, "ada@example.com", "Ada").await;

    for request in [
        get("/topic/999/edit", Some(&cookie)),
        get("/topic/999/delete", Some(&cookie)),
        post_form("/topic/999/edit", "title=a&content=b", Some(&cookie)),
    ] {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

// --- Ambient ---

#[tokio::test]
async fn test_health_and_request_id() {
    let app = router_over(Arc::new(InMemoryRepository::new()));

    let response = app.oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_text(response).await, "ok");
}
