use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:learner/mastery", get(mastery))
        .route("/:learner/weak-areas", get(weak_areas))
        .route("/:learner/weak-areas/stats", get(weak_area_stats))
        .route("/:learner/reviews/due", get(due_reviews))
        .route("/:learner/reviews/:question", post(review))
}

#[derive(Debug, Default, Deserialize)]
struct LimitQuery {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    got_it: bool,
}

async fn mastery(
    State(state): State<AppState>,
    Path(learner): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.engine().mastery(&learner).await?))
}

async fn weak_areas(
    State(state): State<AppState>,
    Path(learner): Path<String>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query?;
    Ok(ok(state.engine().weak_areas(&learner, query.limit).await?))
}

async fn weak_area_stats(
    State(state): State<AppState>,
    Path(learner): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.engine().weak_area_stats(&learner).await?))
}

async fn due_reviews(
    State(state): State<AppState>,
    Path(learner): Path<String>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query?;
    let due = state
        .engine()
        .due_items(&learner, query.limit, Utc::now())
        .await?;
    Ok(ok(due))
}

async fn review(
    State(state): State<AppState>,
    Path((learner, question)): Path<(String, String)>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(body) = payload?;
    let item = state.engine().review(&learner, &question, body.got_it).await?;
    Ok(ok(item))
}
