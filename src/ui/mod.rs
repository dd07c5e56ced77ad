// Server-rendered pages: Askama templates behind cookie sessions

pub mod flash;
mod tasks;
mod templates;

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::{self, CurrentUser, Guest, SESSION_COOKIE};
use crate::api::error::{ApiError, ErrorCode};
use crate::db::User;
use crate::AppState;
use flash::Flash;

pub use tasks::redirect_after_mutation;
pub use templates::*;

// Helper to render templates and handle errors
fn render_page<T: Template>(jar: CookieJar, status: StatusCode, template: T) -> Response {
    match template.render() {
        Ok(html) => (status, jar, Html(html)).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Login and registration, split out so the router can rate limit them
pub fn credential_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", get(register_page).post(register_submit))
        .route("/login", get(login_page).post(login_submit))
}

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/", get(landing))
        .route("/logout", get(logout))
        // Protected routes
        .route("/account/delete", post(delete_account))
        .route("/add-task", get(tasks::add_task_page).post(tasks::add_task_submit))
        .route("/view", get(tasks::view_dates).post(tasks::view_range))
        .route("/view/:date", get(tasks::view_date))
        .route("/upcoming", get(tasks::upcoming))
        .route("/done/:date/:task_id", get(tasks::mark_done))
        .route("/undone/:date/:task_id", get(tasks::mark_undone))
        .route("/destroy/:date/:task_id", get(tasks::destroy))
        .route("/edit/:date/:task_id", get(tasks::edit_page).post(tasks::edit_submit))
        .route("/:username", get(tasks::dashboard))
}

// Landing page
async fn landing(_guest: Guest, jar: CookieJar) -> Response {
    let (jar, flash) = flash::take(jar);
    render_page(jar, StatusCode::OK, IndexTemplate { flash, username: None })
}

async fn register_page(_guest: Guest, jar: CookieJar) -> Response {
    let (jar, flash) = flash::take(jar);
    let template = RegisterTemplate {
        flash,
        username: None,
        form_username: String::new(),
        form_email: String::new(),
    };
    render_page(jar, StatusCode::OK, template)
}

#[derive(Deserialize)]
struct RegisterForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn register_submit(
    _guest: Guest,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Response {
    match auth::register(&state.db, &form.username, &form.email, &form.password).await {
        Ok(_) => {
            let jar = flash::push(
                jar,
                Flash::success("Account created! Log in to get started."),
                state.config.auth.secure_cookies,
            );
            (jar, Redirect::to("/login")).into_response()
        }
        Err(e) => {
            let err = ApiError::from(e);
            match err.code() {
                ErrorCode::Conflict | ErrorCode::BadRequest => {
                    let template = RegisterTemplate {
                        flash: Some(Flash::error(err.message())),
                        username: None,
                        form_username: form.username,
                        form_email: form.email,
                    };
                    render_page(jar, err.status(), template)
                }
                _ => err.into_response(),
            }
        }
    }
}

async fn login_page(_guest: Guest, jar: CookieJar) -> Response {
    let (jar, flash) = flash::take(jar);
    let template = LoginTemplate {
        flash,
        username: None,
        form_email: String::new(),
    };
    render_page(jar, StatusCode::OK, template)
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn login_submit(
    _guest: Guest,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let ttl = state.config.auth.session_ttl_hours;
    match auth::login(&state.db, &form.email, &form.password, ttl).await {
        Ok((user, token)) => {
            let secure = state.config.auth.secure_cookies;
            let jar = jar.add(auth::session_cookie(&token, secure, ttl));
            (jar, Redirect::to(&format!("/{}", user.username))).into_response()
        }
        Err(e) => {
            let err = ApiError::from(e);
            if err.code() != ErrorCode::Unauthorized {
                return err.into_response();
            }
            let template = LoginTemplate {
                flash: Some(Flash::error(err.message())),
                username: None,
                form_email: form.email,
            };
            render_page(jar, err.status(), template)
        }
    }
}

// Logout
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        auth::revoke_session(&state.db, cookie.value()).await?;
    }
    let jar = jar.remove(auth::removal_cookie());
    let jar = flash::push(
        jar,
        Flash::success("You have been logged out."),
        state.config.auth.secure_cookies,
    );
    Ok((jar, Redirect::to("/")).into_response())
}

async fn delete_account(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    if !User::delete_with_tasks(&state.db, &user.id).await? {
        return Err(ApiError::not_found("Account not found"));
    }

    let jar = jar.remove(auth::removal_cookie());
    let jar = flash::push(
        jar,
        Flash::success("Your account and all its tasks were deleted."),
        state.config.auth.secure_cookies,
    );
    Ok((jar, Redirect::to("/")).into_response())
}

#[cfg(test)]
mod tests;
