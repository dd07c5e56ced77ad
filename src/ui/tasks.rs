// Task pages. Every handler takes `CurrentUser` first, so an anonymous
// request is redirected before any path, form, or database work happens.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::CookieJar;
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use super::flash::{self, Flash};
use super::render_page;
use super::templates::*;
use crate::api::auth::{AuthRedirect, CurrentUser};
use crate::api::error::ApiError;
use crate::api::validation::{parse_iso_date, validate_event, validate_uuid};
use crate::db::{Task, User};
use crate::AppState;

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Where to land after changing a task: the dashboard when the task is due
/// today, otherwise that day's view.
pub fn redirect_after_mutation(username: &str, date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        format!("/{}", username)
    } else {
        format!("/view/{}", date.format("%Y-%m-%d"))
    }
}

fn parse_path_date(raw: &str) -> Result<NaiveDate, ApiError> {
    parse_iso_date(raw).map_err(ApiError::bad_request)
}

fn task_not_found(user: &User, task_id: &str) -> ApiError {
    tracing::warn!(user_id = %user.id, task_id = %task_id, "Task not found for user");
    ApiError::not_found("Task not found")
}

/// Task ids are uuids; anything else cannot name a task
fn check_task_id(user: &User, task_id: &str) -> Result<(), ApiError> {
    validate_uuid(task_id, "task id").map_err(|_| task_not_found(user, task_id))
}

#[derive(Deserialize)]
pub struct TaskForm {
    #[serde(default)]
    event: String,
    #[serde(default)]
    event_date: String,
}

impl TaskForm {
    fn validate(&self) -> Result<(String, NaiveDate), String> {
        let event = validate_event(&self.event)?;
        let date = parse_iso_date(&self.event_date)?;
        Ok((event, date))
    }
}

#[derive(Deserialize)]
pub struct RangeForm {
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
}

// Today's tasks for the signed-in owner
pub async fn dashboard(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    if owner != user.username {
        return Ok(AuthRedirect::ToDashboard(user.username).into_response());
    }

    let today = today();
    let tasks = Task::list_for_date(&state.db, &user.id, today).await?;

    let (jar, flash) = flash::take(jar);
    let template = DashboardTemplate {
        flash,
        username: Some(user.username),
        today,
        tasks,
    };
    Ok(render_page(jar, StatusCode::OK, template))
}

pub async fn add_task_page(CurrentUser(user): CurrentUser, jar: CookieJar) -> Response {
    let (jar, flash) = flash::take(jar);
    let template = AddTaskTemplate {
        flash,
        username: Some(user.username),
        event: String::new(),
        event_date: today().format("%Y-%m-%d").to_string(),
    };
    render_page(jar, StatusCode::OK, template)
}

pub async fn add_task_submit(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<TaskForm>,
) -> Result<Response, ApiError> {
    let (event, date) = match form.validate() {
        Ok(valid) => valid,
        Err(message) => {
            let template = AddTaskTemplate {
                flash: Some(Flash::error(message)),
                username: Some(user.username),
                event: form.event,
                event_date: form.event_date,
            };
            return Ok(render_page(jar, StatusCode::BAD_REQUEST, template));
        }
    };

    let task = Task::create(&state.db, &user.id, &event, date).await?;
    tracing::debug!(user_id = %user.id, task_id = %task.id, "Task created");

    let jar = flash::push(
        jar,
        Flash::success("Task added."),
        state.config.auth.secure_cookies,
    );
    let target = redirect_after_mutation(&user.username, task.event_date, today());
    Ok((jar, Redirect::to(&target)).into_response())
}

// Index of every date that has tasks
pub async fn view_dates(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let dates = Task::list_distinct_dates(&state.db, &user.id).await?;

    let (jar, flash) = flash::take(jar);
    let template = ViewTemplate {
        flash,
        username: Some(user.username),
        dates,
        range: None,
        tasks: Vec::new(),
        from: String::new(),
        to: String::new(),
    };
    Ok(render_page(jar, StatusCode::OK, template))
}

// Range filter over the same index
pub async fn view_range(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<RangeForm>,
) -> Result<Response, ApiError> {
    let dates = Task::list_distinct_dates(&state.db, &user.id).await?;

    let bounds = parse_iso_date(&form.from).and_then(|from| {
        parse_iso_date(&form.to).map(|to| if from <= to { (from, to) } else { (to, from) })
    });

    let (status, flash, range, tasks) = match bounds {
        Ok((from, to)) => {
            let tasks = Task::list_in_range(&state.db, &user.id, from, to).await?;
            (StatusCode::OK, None, Some(DateRange { from, to }), tasks)
        }
        Err(message) => (
            StatusCode::BAD_REQUEST,
            Some(Flash::error(message)),
            None,
            Vec::new(),
        ),
    };

    let template = ViewTemplate {
        flash,
        username: Some(user.username),
        dates,
        range,
        tasks,
        from: form.from,
        to: form.to,
    };
    Ok(render_page(jar, status, template))
}

pub async fn view_date(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let date = parse_path_date(&date)?;
    let tasks = Task::list_for_date(&state.db, &user.id, date).await?;

    let (jar, flash) = flash::take(jar);
    let template = ViewDateTemplate {
        flash,
        username: Some(user.username),
        date,
        tasks,
    };
    Ok(render_page(jar, StatusCode::OK, template))
}

pub async fn upcoming(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let today = today();
    let tasks = Task::list_upcoming(&state.db, &user.id, today).await?;

    let (jar, flash) = flash::take(jar);
    let template = UpcomingTemplate {
        flash,
        username: Some(user.username),
        today,
        tasks,
    };
    Ok(render_page(jar, StatusCode::OK, template))
}

async fn set_done(
    state: &AppState,
    user: &User,
    date: &str,
    task_id: &str,
    done: bool,
) -> Result<Response, ApiError> {
    parse_path_date(date)?;
    check_task_id(user, task_id)?;

    let task = Task::set_done(&state.db, &user.id, task_id, done)
        .await?
        .ok_or_else(|| task_not_found(user, task_id))?;

    let target = redirect_after_mutation(&user.username, task.event_date, today());
    Ok(Redirect::to(&target).into_response())
}

pub async fn mark_done(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Path((date, task_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    set_done(&state, &user, &date, &task_id, true).await
}

pub async fn mark_undone(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Path((date, task_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    set_done(&state, &user, &date, &task_id, false).await
}

pub async fn destroy(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Path((date, task_id)): Path<(String, String)>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    parse_path_date(&date)?;
    check_task_id(&user, &task_id)?;

    let task = Task::delete(&state.db, &user.id, &task_id)
        .await?
        .ok_or_else(|| task_not_found(&user, &task_id))?;

    let jar = flash::push(
        jar,
        Flash::success("Task deleted."),
        state.config.auth.secure_cookies,
    );
    let target = redirect_after_mutation(&user.username, task.event_date, today());
    Ok((jar, Redirect::to(&target)).into_response())
}

pub async fn edit_page(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Path((date, task_id)): Path<(String, String)>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    parse_path_date(&date)?;
    check_task_id(&user, &task_id)?;

    let task = Task::get_for_user(&state.db, &user.id, &task_id)
        .await?
        .ok_or_else(|| task_not_found(&user, &task_id))?;

    let (jar, flash) = flash::take(jar);
    let template = EditTemplate {
        flash,
        username: Some(user.username),
        original_date: task.date_slug(),
        event_date: task.date_slug(),
        task_id: task.id,
        event: task.event,
    };
    Ok(render_page(jar, StatusCode::OK, template))
}

pub async fn edit_submit(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Path((date, task_id)): Path<(String, String)>,
    jar: CookieJar,
    Form(form): Form<TaskForm>,
) -> Result<Response, ApiError> {
    parse_path_date(&date)?;
    check_task_id(&user, &task_id)?;

    let (event, new_date) = match form.validate() {
        Ok(valid) => valid,
        Err(message) => {
            let template = EditTemplate {
                flash: Some(Flash::error(message)),
                username: Some(user.username),
                task_id,
                original_date: date,
                event: form.event,
                event_date: form.event_date,
            };
            return Ok(render_page(jar, StatusCode::BAD_REQUEST, template));
        }
    };

    let task = Task::edit(&state.db, &user.id, &task_id, &event, new_date)
        .await?
        .ok_or_else(|| task_not_found(&user, &task_id))?;

    let jar = flash::push(
        jar,
        Flash::success("Task updated."),
        state.config.auth.secure_cookies,
    );
    let target = redirect_after_mutation(&user.username, task.event_date, today());
    Ok((jar, Redirect::to(&target)).into_response())
}
