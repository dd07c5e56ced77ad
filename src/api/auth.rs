//! Accounts and cookie sessions.
//!
//! The session cookie carries `<session id>.<secret>`. Only a SHA-256 of the
//! secret is stored, and every request re-resolves the cookie against the
//! `sessions` and `users` tables, so a logout or a deleted account takes
//! effect on the very next request.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, TimeDelta, Utc};
use lazy_static::lazy_static;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;

use super::error::ApiError;
use super::validation::{validate_email, validate_password, validate_username};
use crate::config::MAX_SESSION_TTL_HOURS;
use crate::db::{is_unique_violation, DbPool, Session, User};
use crate::AppState;

/// Session token cookie name
pub const SESSION_COOKIE: &str = "todolist_session";

lazy_static! {
    /// Verified against when an email is unknown, so a miss costs the same
    /// as a wrong password.
    static ref DUMMY_HASH: String = hash_password("todolist-dummy-password").unwrap_or_default();
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username or email is already registered")]
    DuplicateIdentity,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Validation(String),

    #[error("Failed to hash password: {0}")]
    Hash(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::DuplicateIdentity => ApiError::conflict(err.to_string()),
            AuthError::InvalidCredentials => ApiError::unauthorized(err.to_string()),
            AuthError::Validation(msg) => ApiError::bad_request(msg),
            AuthError::Hash(msg) => {
                tracing::error!("Password hashing failed: {}", msg);
                ApiError::internal("Failed to process password")
            }
            AuthError::Database(e) => ApiError::from(e),
        }
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt_bytes: [u8; 16] = rand::rng().random();
    let salt = SaltString::encode_b64(&salt_bytes)?;
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// The secret handed to the client after a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub session_id: String,
    secret: String,
}

impl SessionToken {
    pub fn cookie_value(&self) -> String {
        format!("{}.{}", self.session_id, self.secret)
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (session_id, secret) = value.split_once('.')?;
        if session_id.is_empty() || secret.is_empty() {
            return None;
        }
        Some(Self {
            session_id: session_id.to_string(),
            secret: secret.to_string(),
        })
    }
}

/// Create an account. Fails with `DuplicateIdentity` when the username or the
/// email is already taken.
pub async fn register(
    db: &DbPool,
    username: &str,
    email: &str,
    password: &str,
) -> Result<User, AuthError> {
    validate_username(username).map_err(AuthError::Validation)?;
    validate_email(email).map_err(AuthError::Validation)?;
    validate_password(password).map_err(AuthError::Validation)?;

    let password_hash = hash_password(password).map_err(|e| AuthError::Hash(e.to_string()))?;

    match User::create(db, username, email, &password_hash).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, username = %user.username, "Registered new user");
            Ok(user)
        }
        Err(e) if is_unique_violation(&e) => {
            tracing::info!(username = %username.trim(), "Registration rejected: identity taken");
            Err(AuthError::DuplicateIdentity)
        }
        Err(e) => Err(AuthError::Database(e)),
    }
}

/// Check credentials and open a session. Never reveals which field was wrong.
pub async fn login(
    db: &DbPool,
    email: &str,
    password: &str,
    session_ttl_hours: i64,
) -> Result<(User, SessionToken), AuthError> {
    let user = match User::get_by_email(db, email).await? {
        Some(user) => user,
        None => {
            let _ = verify_password(password, &DUMMY_HASH);
            tracing::warn!("Login failed: invalid credentials");
            return Err(AuthError::InvalidCredentials);
        }
    };

    if !verify_password(password, &user.password_hash) {
        tracing::warn!(user_id = %user.id, "Login failed: invalid credentials");
        return Err(AuthError::InvalidCredentials);
    }

    let token = issue_session(db, &user.id, session_ttl_hours).await?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok((user, token))
}

/// When a session opened at `now` lapses. Out-of-range lifetimes are
/// clamped instead of overflowing.
fn session_expiry(now: DateTime<Utc>, ttl_hours: i64) -> DateTime<Utc> {
    let ttl_hours = ttl_hours.clamp(-MAX_SESSION_TTL_HOURS, MAX_SESSION_TTL_HOURS);
    TimeDelta::try_hours(ttl_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(now)
}

/// Store a new session for `user_id` and return its client token
pub async fn issue_session(
    db: &DbPool,
    user_id: &str,
    ttl_hours: i64,
) -> Result<SessionToken, sqlx::Error> {
    let secret = generate_token();
    let expires_at = session_expiry(Utc::now(), ttl_hours);

    let session = Session::create(
        db,
        user_id,
        &hash_token(&secret),
        &crate::db::timestamp(expires_at),
    )
    .await?;

    Ok(SessionToken {
        session_id: session.id,
        secret,
    })
}

/// Resolve a cookie value to a live user.
///
/// Unknown, expired, or forged sessions and sessions whose user no longer
/// exists all resolve to `None`.
pub async fn resolve_session(db: &DbPool, cookie_value: &str) -> Result<Option<User>, sqlx::Error> {
    let token = match SessionToken::parse(cookie_value) {
        Some(t) => t,
        None => return Ok(None),
    };

    let session = match Session::get_by_id(db, &token.session_id).await? {
        Some(s) => s,
        None => return Ok(None),
    };

    let presented = hash_token(&token.secret);
    let matches: bool = presented
        .as_bytes()
        .ct_eq(session.token_hash.as_bytes())
        .into();
    if !matches || session.is_expired(Utc::now()) {
        return Ok(None);
    }

    User::get_by_id(db, &session.user_id).await
}

/// Invalidate the session behind a cookie value, if any
pub async fn revoke_session(db: &DbPool, cookie_value: &str) -> Result<(), sqlx::Error> {
    if let Some(token) = SessionToken::parse(cookie_value) {
        if Session::delete(db, &token.session_id).await? {
            tracing::debug!(session_id = %token.session_id, "Session revoked");
        }
    }
    Ok(())
}

/// The session cookie, kept by the browser for as long as the session lives
pub fn session_cookie(token: &SessionToken, secure: bool, ttl_hours: i64) -> Cookie<'static> {
    let ttl_hours = ttl_hours.clamp(0, MAX_SESSION_TTL_HOURS);
    Cookie::build((SESSION_COOKIE, token.cookie_value()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .max_age(time::Duration::hours(ttl_hours))
        .same_site(SameSite::Lax)
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

/// The single session predicate both guards are built on
pub async fn current_user(db: &DbPool, jar: &CookieJar) -> Result<Option<User>, sqlx::Error> {
    match jar.get(SESSION_COOKIE) {
        Some(cookie) => resolve_session(db, cookie.value()).await,
        None => Ok(None),
    }
}

/// Where a guard sends a client that fails it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRedirect {
    ToLogin,
    ToDashboard(String),
}

impl AuthRedirect {
    pub fn location(&self) -> String {
        match self {
            AuthRedirect::ToLogin => "/login".to_string(),
            AuthRedirect::ToDashboard(username) => format!("/{}", username),
        }
    }
}

impl IntoResponse for AuthRedirect {
    fn into_response(self) -> Response {
        Redirect::to(&self.location()).into_response()
    }
}

/// Which way a route is gated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Owner-scoped routes: no valid session, go to login
    RequireAuth,
    /// Login/register pages: already signed in, go to the dashboard
    RedirectIfAuthenticated,
}

impl Guard {
    /// Decide whether a request with this resolved user may proceed
    pub fn check(self, user: Option<&User>) -> Result<(), AuthRedirect> {
        match (self, user) {
            (Guard::RequireAuth, None) => Err(AuthRedirect::ToLogin),
            (Guard::RedirectIfAuthenticated, Some(user)) => {
                Err(AuthRedirect::ToDashboard(user.username.clone()))
            }
            _ => Ok(()),
        }
    }
}

async fn guarded_user(
    parts: &Parts,
    state: &Arc<AppState>,
    guard: Guard,
) -> Result<Option<User>, Response> {
    let jar = CookieJar::from_headers(&parts.headers);
    let user = current_user(&state.db, &jar)
        .await
        .map_err(|e| ApiError::from(e).into_response())?;

    guard
        .check(user.as_ref())
        .map_err(IntoResponse::into_response)?;
    Ok(user)
}

/// Extractor for owner-scoped handlers: the authenticated user, or a
/// redirect to the login page before the handler runs.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match guarded_user(parts, state, Guard::RequireAuth).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => Err(AuthRedirect::ToLogin.into_response()),
        }
    }
}

/// Extractor for pages only anonymous clients should see
#[derive(Debug, Clone, Copy)]
pub struct Guest;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Guest {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        guarded_user(parts, state, Guard::RedirectIfAuthenticated).await?;
        Ok(Guest)
    }
}

/// Spawn a background task that periodically purges expired sessions
pub fn spawn_session_cleanup(db: DbPool, interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            match Session::delete_expired(&db).await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {} expired sessions", n),
                Err(e) => tracing::warn!(error = %e, "Failed to purge expired sessions"),
            }
        }
    });
}
