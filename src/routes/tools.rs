use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::response::{ok, AppError};
use crate::services::shuffle::{shuffle, shuffle_seed, ChoicePermutation};
use crate::services::weak_areas::{recommended_minutes, Priority};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/shuffle", get(preview_shuffle))
        .route("/api/study-time", get(study_time))
}

fn default_choice_count() -> usize {
    4
}

#[derive(Debug, Deserialize)]
struct ShuffleQuery {
    learner: String,
    question: String,
    #[serde(default)]
    counter: u32,
    #[serde(default = "default_choice_count")]
    n: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShuffleResponse {
    learner: String,
    question: String,
    counter: u32,
    order: ChoicePermutation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudyTimeQuery {
    priority: String,
    total_minutes: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StudyTimeResponse {
    priority: Priority,
    total_minutes: u32,
    minutes: u32,
}

async fn preview_shuffle(query: Result<Query<ShuffleQuery>, QueryRejection>) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query?;
    let seed = shuffle_seed(&query.learner, &query.question, query.counter);
    let order = shuffle(&seed, query.n)?;
    Ok(ok(ShuffleResponse {
        learner: query.learner,
        question: query.question,
        counter: query.counter,
        order,
    }))
}

async fn study_time(query: Result<Query<StudyTimeQuery>, QueryRejection>) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query?;
    let priority = Priority::parse(&query.priority)
        .ok_or_else(|| AppError::bad_request(format!("unknown priority {}", query.priority)))?;
    Ok(ok(StudyTimeResponse {
        priority,
        total_minutes: query.total_minutes,
        minutes: recommended_minutes(priority, query.total_minutes),
    }))
}
