use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::response::{ok, AppError};
use crate::services::engine::SubmitAttempt;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(submit_attempt))
}

async fn submit_attempt(
    State(state): State<AppState>,
    payload: Result<Json<SubmitAttempt>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(input) = payload?;
    let outcome = state.engine().submit_attempt(input).await?;
    Ok(ok(outcome))
}
