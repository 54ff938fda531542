use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::Attempt;
use crate::response::{ok, AppError};
use crate::services::scoring::{composite_score, Section, STANDARD_TIME_MULTIPLIER};
use crate::state::AppState;

pub fn session_router() -> Router<AppState> {
    Router::new().route("/score", post(score_session))
}

pub fn composite_router() -> Router<AppState> {
    Router::new().route("/composite", post(composite))
}

fn standard_multiplier() -> u32 {
    STANDARD_TIME_MULTIPLIER
}

/// Either a batch of attempts or a stored session to load them from.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreSessionRequest {
    section: Section,
    #[serde(default = "standard_multiplier")]
    multiplier: u32,
    #[serde(default)]
    attempts: Option<Vec<Attempt>>,
    #[serde(default)]
    learner_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompositeRequest {
    section_scores: Vec<u8>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompositeResponse {
    composite: u8,
    sections: usize,
}

async fn score_session(
    State(state): State<AppState>,
    payload: Result<Json<ScoreSessionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let engine = state.engine();

    let score = match (request.attempts, request.learner_id, request.session_id) {
        (Some(attempts), _, _) => {
            engine
                .score_attempts(&attempts, request.multiplier, request.section)
                .await?
        }
        (None, Some(learner), Some(session)) => {
            engine
                .score_session(&learner, &session, request.multiplier, request.section)
                .await?
        }
        _ => {
            return Err(AppError::bad_request(
                "provide attempts, or learnerId and sessionId",
            ))
        }
    };
    Ok(ok(score))
}

async fn composite(payload: Result<Json<CompositeRequest>, JsonRejection>) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let composite = composite_score(&request.section_scores)?;
    Ok(ok(CompositeResponse {
        composite,
        sections: request.section_scores.len(),
    }))
}
