pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod validation;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::ui;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Credential forms are rate limited per client IP
    let credential_routes = ui::credential_routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit::rate_limit_auth,
    ));

    Router::new()
        .route("/health", get(health_check))
        .nest_service("/static", ServeDir::new(&state.config.server.static_dir))
        .merge(credential_routes)
        .merge(ui::create_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
