use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Longest time a single answer may report. Anything above is a client bug.
pub const MAX_TIME_SPENT_MS: u64 = 24 * 60 * 60 * 1000;

fn bounded_time_ms<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = u64::deserialize(deserializer)?;
    if value > MAX_TIME_SPENT_MS {
        return Err(serde::de::Error::custom(format!(
            "timeSpentMs {value} exceeds {MAX_TIME_SPENT_MS}"
        )));
    }
    Ok(value)
}

/// One graded response. Append-only; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: Uuid,
    pub learner_id: String,
    pub question_id: String,
    pub skill_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// `choice_order[display_idx] == canonical_idx`
    pub choice_order: Vec<usize>,
    pub correct_idx: usize,
    /// Display position the learner picked; `None` when unanswered or timed out.
    pub selected_idx: Option<usize>,
    #[serde(deserialize_with = "bounded_time_ms")]
    pub time_spent_ms: u64,
    pub answered_at: DateTime<Utc>,
}

impl Attempt {
    pub fn is_correct(&self) -> bool {
        self.selected_idx
            .and_then(|display| self.choice_order.get(display))
            .is_some_and(|canonical| *canonical == self.correct_idx)
    }

    pub fn is_answered(&self) -> bool {
        self.selected_idx.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryRecord {
    pub learner_id: String,
    pub skill_id: String,
    pub correct: u32,
    pub total: u32,
    pub avg_time_ms: u64,
    pub last_updated: DateTime<Utc>,
}

impl MasteryRecord {
    pub fn empty(learner_id: &str, skill_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            skill_id: skill_id.to_string(),
            correct: 0,
            total: 0,
            avg_time_ms: 0,
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub learner_id: String,
    pub question_id: String,
    pub due_at: DateTime<Utc>,
    pub interval_days: u32,
    pub ease: f64,
    pub lapses: u32,
}

/// A stored value together with the version the store assigned on its last write.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: u64) -> Self {
        Self { value, version }
    }
}

pub(crate) fn mastery_key(learner_id: &str, skill_id: &str) -> String {
    format!("mastery:{learner_id}:{skill_id}")
}

pub(crate) fn review_key(learner_id: &str, question_id: &str) -> String {
    format!("review:{learner_id}:{question_id}")
}
