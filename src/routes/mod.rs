mod attempts;
mod health;
mod learners;
mod scores;
mod tools;

use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::response::AppError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/api/attempts", attempts::router())
        .nest("/api/learners", learners::router())
        .nest("/api/sessions", scores::session_router())
        .nest("/api/scores", scores::composite_router())
        .merge(tools::router())
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    AppError::not_found("no such endpoint").into_response()
}
