use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

use crate::{config::AppConfig, error::AppError, models::SessionUser, repository::RepositoryState};

/// Name of the cookie carrying the signed session token.
pub const SESSION_COOKIE: &str = "forum_session";

const SALT_LEN: usize = 16;

// Hash checked when the email is unknown, so both sign-in failures cost one verification.
static UNKNOWN_USER_HASH: OnceLock<Option<String>> = OnceLock::new();

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("stored password hash is malformed: {0}")]
    Malformed(String),
}

/// PasswordService
///
/// Hashes and verifies passwords with argon2id. Stored hashes are PHC strings, so the
/// parameters travel with each hash.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new() -> Result<Self, PasswordError> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(19 * 1024); // 19 MiB
        builder.t_cost(2);
        builder.p_cost(1);
        let params = builder
            .build()
            .map_err(|e| PasswordError::Hash(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        Ok(Self { argon2 })
    }

    pub fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt =
            SaltString::encode_b64(&salt_bytes).map_err(|e| PasswordError::Hash(e.to_string()))?;
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    pub fn verify_password(&self, password: &str, encoded: &str) -> Result<bool, PasswordError> {
        let parsed =
            PasswordHash::new(encoded).map_err(|e| PasswordError::Malformed(e.to_string()))?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::Hash(e.to_string())),
        }
    }

    /// A valid argon2id hash that no submitted password is expected to match.
    pub fn unknown_user_hash(&self) -> Option<&'static str> {
        UNKNOWN_USER_HASH
            .get_or_init(|| self.hash_password("no-such-user-placeholder").ok())
            .as_deref()
    }

    /// Runs a full verification for a sign-in whose email matched no user. The outcome
    /// is discarded; the caller rejects the attempt either way.
    pub fn verify_unknown_user(&self, password: &str) {
        if let Some(hash) = self.unknown_user_hash() {
            let _ = self.verify_password(password, hash);
        }
    }
}

/// Claims
///
/// Payload of the session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the signed-in user's ID.
    pub sub: Uuid,
    /// Expiration Time (exp): the token is rejected after this instant.
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

/// SessionKeys
///
/// Signs and verifies session tokens (HS256) with the configured secret.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.session_secret, config.session_ttl_secs)
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Issues a token naming `user_id` as the session subject.
    pub fn issue(&self, user_id: Uuid) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let exp = now
            .checked_add(self.ttl_secs)
            .ok_or_else(|| AppError::Internal("session lifetime overflows the clock".into()))?;
        let claims = Claims {
            sub: user_id,
            iat: now as usize,
            exp: exp as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("failed to sign session token: {e}")))
    }

    /// Returns the subject of a valid, unexpired token. Any defect yields `None`.
    pub fn verify(&self, token: &str) -> Option<Uuid> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims.sub)
            .ok()
    }

    /// The cookie establishing a session for `token`.
    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(self.ttl_secs))
            .build()
    }
}

/// Drops the session cookie from `jar`; the response then expires it in the browser.
pub fn end_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// CurrentUser Extractor
///
/// The signed-in user, or `None` for anonymous visitors. Resolution steps:
/// 1. Read the `forum_session` cookie from the request's cookie jar.
/// 2. Verify the token signature and expiry.
/// 3. Look the subject up in the repository, so deleted users lose their session.
///
/// Invalid or stale cookies simply resolve to `None`. Only a repository failure
/// rejects the request, and it is forwarded like any other accessor error.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<SessionUser>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    SessionKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);

        let Some(user_id) = jar
            .get(SESSION_COOKIE)
            .map(Cookie::value)
            .filter(|token| !token.is_empty())
            .and_then(|token| keys.verify(token))
        else {
            return Ok(CurrentUser(None));
        };

        let repo = RepositoryState::from_ref(state);
        let user = repo.get_user(user_id).await?;
        Ok(CurrentUser(user.map(SessionUser::from)))
    }
}

/// SignedInUser Extractor
///
/// Like `CurrentUser`, but rejects anonymous requests with a redirect to `/signin`.
/// A user already resolved by the `require_session` route layer is taken from the
/// request extensions instead of being looked up again.
#[derive(Debug, Clone)]
pub struct SignedInUser(pub SessionUser);

impl<S> FromRequestParts<S> for SignedInUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    SessionKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<SessionUser>() {
            return Ok(SignedInUser(user.clone()));
        }
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        user.map(SignedInUser).ok_or(AppError::Unauthenticated)
    }
}
