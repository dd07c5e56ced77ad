// Askama template definitions

use askama::Template;
use chrono::NaiveDate;

use super::flash::Flash;
use crate::db::Task;

// Every page struct carries `flash` and `username` because base.html reads both.

// Landing page
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub flash: Option<Flash>,
    pub username: Option<String>,
}

// Registration form, refilled after a failed attempt
#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub flash: Option<Flash>,
    pub username: Option<String>,
    pub form_username: String,
    pub form_email: String,
}

// Login form
#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub flash: Option<Flash>,
    pub username: Option<String>,
    pub form_email: String,
}

// Today's tasks
#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub flash: Option<Flash>,
    pub username: Option<String>,
    pub today: NaiveDate,
    pub tasks: Vec<Task>,
}

#[derive(Template)]
#[template(path = "add_task.html")]
pub struct AddTaskTemplate {
    pub flash: Option<Flash>,
    pub username: Option<String>,
    pub event: String,
    pub event_date: String,
}

pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

// Date index plus the optional range filter result
#[derive(Template)]
#[template(path = "view.html")]
pub struct ViewTemplate {
    pub flash: Option<Flash>,
    pub username: Option<String>,
    pub dates: Vec<NaiveDate>,
    pub range: Option<DateRange>,
    pub tasks: Vec<Task>,
    pub from: String,
    pub to: String,
}

#[derive(Template)]
#[template(path = "view_date.html")]
pub struct ViewDateTemplate {
    pub flash: Option<Flash>,
    pub username: Option<String>,
    pub date: NaiveDate,
    pub tasks: Vec<Task>,
}

#[derive(Template)]
#[template(path = "upcoming.html")]
pub struct UpcomingTemplate {
    pub flash: Option<Flash>,
    pub username: Option<String>,
    pub today: NaiveDate,
    pub tasks: Vec<Task>,
}

#[derive(Template)]
#[template(path = "edit.html")]
pub struct EditTemplate {
    pub flash: Option<Flash>,
    pub username: Option<String>,
    pub task_id: String,
    pub original_date: String,
    pub event: String,
    pub event_date: String,
}

// Shared error page
#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub flash: Option<Flash>,
    pub username: Option<String>,
    pub status: u16,
    pub title: String,
    pub message: String,
}
