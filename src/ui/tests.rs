use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::NaiveDate;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use crate::api::auth;
use crate::config::Config;
use crate::db::{init_memory, DbPool, Task, User};
use crate::AppState;

const PASSWORD: &str = "correct horse battery";
const FORM_PASSWORD: &str = "correct+horse+battery";

async fn test_app_with(config: Config) -> (Router, DbPool) {
    let db = init_memory().await.unwrap();
    let state = Arc::new(AppState::new(config, db.clone()));
    (crate::api::create_router(state), db)
}

async fn test_app() -> (Router, DbPool) {
    test_app_with(Config::default()).await
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
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

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// The `name=value` pair of the session cookie a response sets
fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| {
            pair.starts_with(&format!("{}=", auth::SESSION_COOKIE))
                && pair.len() > auth::SESSION_COOKIE.len() + 1
        })
        .map(str::to_string)
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn task_count(db: &DbPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
        .fetch_one(db)
        .await
        .unwrap()
}

/// Register through the form, log in, and return the session cookie
async fn sign_up(app: &Router, username: &str) -> String {
    let body = format!(
        "username={}&email={}%40example.com&password={}",
        username, username, FORM_PASSWORD
    );
    let response = app
        .clone()
        .oneshot(post_form("/register", &body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let body = format!("email={}%40example.com&password={}", username, FORM_PASSWORD);
    let response = app
        .clone()
        .oneshot(post_form("/login", &body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/{}", username));

    session_cookie(&response).expect("login should set a session cookie")
}

#[tokio::test]
async fn test_health_check() {
    let (app, _db) = test_app().await;
    let response = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
}

#[tokio::test]
async fn test_logged_out_client_is_sent_to_login() {
    let (app, db) = test_app().await;

    for uri in ["/alice", "/add-task", "/view", "/view/2024-01-05", "/upcoming"] {
        let response = app.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(location(&response), "/login", "{}", uri);
    }

    // Even a malformed date redirects rather than erroring
    let response = app
        .clone()
        .oneshot(get("/done/not-a-date/whatever", None))
        .await
        .unwrap();
    assert_eq!(location(&response), "/login");

    let response = app
        .clone()
        .oneshot(post_form("/add-task", "event=sneaky&event_date=2024-01-05", None))
        .await
        .unwrap();
    assert_eq!(location(&response), "/login");
    assert_eq!(task_count(&db).await, 0);
}

#[tokio::test]
async fn test_signed_in_client_skips_login_pages() {
    let (app, _db) = test_app().await;
    let cookie = sign_up(&app, "alice").await;

    for uri in ["/", "/login", "/register"] {
        let response = app.clone().oneshot(get(uri, Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(location(&response), "/alice", "{}", uri);
    }
}

#[tokio::test]
async fn test_other_users_dashboard_redirects_to_own() {
    let (app, _db) = test_app().await;
    let cookie = sign_up(&app, "alice").await;

    let response = app.clone().oneshot(get("/bob", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/alice");

    let response = app.oneshot(get("/alice", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("alice"));
}

#[tokio::test]
async fn test_duplicate_registration_is_conflict() {
    let (app, _db) = test_app().await;
    sign_up(&app, "alice").await;

    let body = format!("username=alice2&email=alice%40example.com&password={}", FORM_PASSWORD);
    let response = app
        .oneshot(post_form("/register", &body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(body_text(response).await.contains("already registered"));
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let (app, _db) = test_app().await;
    sign_up(&app, "alice").await;

    let response = app
        .oneshot(post_form(
            "/login",
            "email=alice%40example.com&password=nope-nope-nope",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(session_cookie(&response).is_none());
    assert!(body_text(response).await.contains("Invalid email or password"));
}

#[tokio::test]
async fn test_add_task_and_view_day() {
    let (app, _db) = test_app().await;
    let cookie = sign_up(&app, "alice").await;

    let response = app
        .clone()
        .oneshot(post_form(
            "/add-task",
            "event=buy+milk&event_date=2031-03-04",
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/view/2031-03-04");

    let response = app
        .clone()
        .oneshot(get("/view/2031-03-04", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("buy milk"));

    let response = app
        .clone()
        .oneshot(get("/view", Some(&cookie)))
        .await
        .unwrap();
    assert!(body_text(response).await.contains("2031-03-04"));

    let response = app.oneshot(get("/upcoming", Some(&cookie))).await.unwrap();
    assert!(body_text(response).await.contains("buy milk"));
}

#[tokio::test]
async fn test_task_due_today_returns_to_dashboard() {
    let (app, _db) = test_app().await;
    let cookie = sign_up(&app, "alice").await;
    let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();

    let body = format!("event=water+plants&event_date={}", today);
    let response = app
        .clone()
        .oneshot(post_form("/add-task", &body, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(location(&response), "/alice");

    let response = app.oneshot(get("/alice", Some(&cookie))).await.unwrap();
    assert!(body_text(response).await.contains("water plants"));
}

#[tokio::test]
async fn test_invalid_task_form_is_bad_request() {
    let (app, db) = test_app().await;
    let cookie = sign_up(&app, "alice").await;

    let response = app
        .clone()
        .oneshot(post_form(
            "/add-task",
            "event=buy+milk&event_date=2024-02-30",
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_form("/add-task", "event=&event_date=2024-02-03", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(task_count(&db).await, 0);
}

#[tokio::test]
async fn test_malformed_path_date_is_bad_request() {
    let (app, _db) = test_app().await;
    let cookie = sign_up(&app, "alice").await;

    for uri in ["/view/2024-13-45", "/view/yesterday", "/done/2024-1-5/abc"] {
        let response = app.clone().oneshot(get(uri, Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[tokio::test]
async fn test_range_view() {
    let (app, db) = test_app().await;
    let cookie = sign_up(&app, "alice").await;
    let alice = User::get_by_email(&db, "alice@example.com").await.unwrap().unwrap();

    for (event, day) in [("alpha-errand", 1), ("beta-errand", 10), ("gamma-errand", 20)] {
        let date = NaiveDate::from_ymd_opt(2030, 5, day).unwrap();
        Task::create(&db, &alice.id, event, date).await.unwrap();
    }

    // Reversed bounds are accepted
    let response = app
        .clone()
        .oneshot(post_form(
            "/view",
            "from=2030-05-15&to=2030-05-05",
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("beta-errand"));
    assert!(!html.contains("alpha-errand"));
    assert!(!html.contains("gamma-errand"));

    let response = app
        .oneshot(post_form("/view", "from=soon&to=2030-05-05", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_done_undone_and_edit() {
    let (app, db) = test_app().await;
    let cookie = sign_up(&app, "alice").await;
    let alice = User::get_by_email(&db, "alice@example.com").await.unwrap().unwrap();
    let date = NaiveDate::from_ymd_opt(2031, 3, 4).unwrap();
    let task = Task::create(&db, &alice.id, "buy milk", date).await.unwrap();

    let uri = format!("/done/2031-03-04/{}", task.id);
    let response = app.clone().oneshot(get(&uri, Some(&cookie))).await.unwrap();
    assert_eq!(location(&response), "/view/2031-03-04");
    let stored = Task::get_for_user(&db, &alice.id, &task.id).await.unwrap().unwrap();
    assert!(stored.done);

    let uri = format!("/undone/2031-03-04/{}", task.id);
    app.clone().oneshot(get(&uri, Some(&cookie))).await.unwrap();
    let stored = Task::get_for_user(&db, &alice.id, &task.id).await.unwrap().unwrap();
    assert!(!stored.done);

    let uri = format!("/edit/2031-03-04/{}", task.id);
    let response = app.clone().oneshot(get(&uri, Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("buy milk"));

    let response = app
        .clone()
        .oneshot(post_form(
            &uri,
            "event=buy+oat+milk&event_date=2031-03-05",
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(location(&response), "/view/2031-03-05");
    let stored = Task::get_for_user(&db, &alice.id, &task.id).await.unwrap().unwrap();
    assert_eq!(stored.event, "buy oat milk");
    assert_eq!(stored.event_date, NaiveDate::from_ymd_opt(2031, 3, 5).unwrap());

    let uri = format!("/destroy/2031-03-05/{}", task.id);
    let response = app.oneshot(get(&uri, Some(&cookie))).await.unwrap();
    assert_eq!(location(&response), "/view/2031-03-05");
    assert_eq!(task_count(&db).await, 0);
}

#[tokio::test]
async fn test_foreign_task_is_not_found() {
    let (app, db) = test_app().await;
    let cookie = sign_up(&app, "alice").await;
    let bob = auth::register(&db, "bob", "bob@example.com", PASSWORD).await.unwrap();
    let date = NaiveDate::from_ymd_opt(2031, 3, 4).unwrap();
    let task = Task::create(&db, &bob.id, "bob's secret", date).await.unwrap();

    for action in ["done", "undone", "edit", "destroy"] {
        let uri = format!("/{}/2031-03-04/{}", action, task.id);
        let response = app.clone().oneshot(get(&uri, Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", action);
    }

    let uri = format!("/edit/2031-03-04/{}", task.id);
    let response = app
        .clone()
        .oneshot(post_form(&uri, "event=mine+now&event_date=2031-03-04", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Unknown ids look the same as foreign ones
    let response = app
        .clone()
        .oneshot(get("/done/2031-03-04/not-a-task", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let stored = Task::get_for_user(&db, &bob.id, &task.id).await.unwrap().unwrap();
    assert_eq!(stored, task);

    let response = app
        .oneshot(get("/view/2031-03-04", Some(&cookie)))
        .await
        .unwrap();
    assert!(!body_text(response).await.contains("secret"));
}

#[tokio::test]
async fn test_logout_ends_session() {
    let (app, _db) = test_app().await;
    let cookie = sign_up(&app, "alice").await;

    let response = app.clone().oneshot(get("/logout", Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    // The old cookie no longer authenticates
    let response = app.oneshot(get("/upcoming", Some(&cookie))).await.unwrap();
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_delete_account_removes_user_and_tasks() {
    let (app, db) = test_app().await;
    let cookie = sign_up(&app, "alice").await;
    let alice = User::get_by_email(&db, "alice@example.com").await.unwrap().unwrap();
    let bob = auth::register(&db, "bob", "bob@example.com", PASSWORD).await.unwrap();
    let date = NaiveDate::from_ymd_opt(2031, 3, 4).unwrap();
    Task::create(&db, &alice.id, "alice task", date).await.unwrap();
    Task::create(&db, &bob.id, "bob task", date).await.unwrap();

    let response = app
        .clone()
        .oneshot(post_form("/account/delete", "", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    assert!(User::get_by_id(&db, &alice.id).await.unwrap().is_none());
    assert_eq!(task_count(&db).await, 1);

    let response = app.oneshot(get("/alice", Some(&cookie))).await.unwrap();
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_login_attempts_are_rate_limited() {
    let mut config = Config::default();
    config.rate_limit.auth_requests_per_window = 2;
    let (app, _db) = test_app_with(config).await;

    let body = "email=nobody%40example.com&password=whatever-at-all";
    for _ in 0..2 {
        let response = app.clone().oneshot(post_form("/login", body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app.clone().oneshot(post_form("/login", body, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    // Viewing the form is never limited
    let response = app.oneshot(get("/login", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Every `Set-Cookie` header value for the named cookie
fn set_cookie_headers(response: &Response, name: &str) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| v.starts_with(&format!("{}=", name)))
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_session_cookie_lives_as_long_as_the_session() {
    let (app, _db) = test_app().await;
    sign_up(&app, "alice").await;

    let body = format!("email=alice%40example.com&password={}", FORM_PASSWORD);
    let response = app
        .oneshot(post_form("/login", &body, None))
        .await
        .unwrap();

    let headers = set_cookie_headers(&response, auth::SESSION_COOKIE);
    assert_eq!(headers.len(), 1);
    let header = &headers[0];
    assert!(header.contains("Max-Age=604800"), "{}", header);
    assert!(header.contains("HttpOnly"), "{}", header);
    assert!(header.contains("SameSite=Lax"), "{}", header);
    assert!(header.contains("Path=/"), "{}", header);
    assert!(!header.contains("Secure"), "{}", header);
}

#[tokio::test]
async fn test_secure_setting_applies_to_every_cookie() {
    let mut config = Config::default();
    config.auth.secure_cookies = true;
    let (app, _db) = test_app_with(config).await;

    let body = format!(
        "username=alice&email=alice%40example.com&password={}",
        FORM_PASSWORD
    );
    let response = app
        .clone()
        .oneshot(post_form("/register", &body, None))
        .await
        .unwrap();
    let flash = set_cookie_headers(&response, crate::ui::flash::FLASH_COOKIE);
    assert_eq!(flash.len(), 1);
    assert!(flash[0].contains("Secure"), "{}", flash[0]);

    let body = format!("email=alice%40example.com&password={}", FORM_PASSWORD);
    let response = app
        .oneshot(post_form("/login", &body, None))
        .await
        .unwrap();
    let session = set_cookie_headers(&response, auth::SESSION_COOKIE);
    assert_eq!(session.len(), 1);
    assert!(session[0].contains("Secure"), "{}", session[0]);
}

#[tokio::test]
async fn test_spoofed_forwarding_headers_share_one_limit() {
    let mut config = Config::default();
    config.rate_limit.auth_requests_per_window = 2;
    let (app, _db) = test_app_with(config).await;

    let login = |n: u8| {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-forwarded-for", format!("203.0.113.{}", n))
            .header("x-real-ip", format!("198.51.100.{}", n))
            .body(Body::from("email=nobody%40example.com&password=whatever-at-all"))
            .unwrap()
    };

    for n in 1..=2 {
        let response = app.clone().oneshot(login(n)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app.oneshot(login(3)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_trusted_forwarding_headers_split_limits() {
    let mut config = Config::default();
    config.rate_limit.auth_requests_per_window = 1;
    config.rate_limit.trust_proxy_headers = true;
    let (app, _db) = test_app_with(config).await;

    let login = |client: &str| {
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-forwarded-for", client)
            .body(Body::from("email=nobody%40example.com&password=whatever-at-all"))
            .unwrap()
    };

    let response = app.clone().oneshot(login("203.0.113.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.clone().oneshot(login("203.0.113.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let response = app.oneshot(login("203.0.113.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_static_assets_are_served() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("style.css"), "body {}").unwrap();

    let mut config = Config::default();
    config.server.static_dir = dir.path().to_path_buf();
    let (app, _db) = test_app_with(config).await;

    let response = app.oneshot(get("/static/style.css", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "body {}");
}
