//! Spaced-repetition review queue.
//!
//! An item is created the first time a learner misses a question in practice
//! and is then rescheduled by every review response. Each transition is a
//! pure function from the current item to the next one; the scheduler writes
//! the result back with a versioned compare-and-put so all fields land together.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::{EngineConfig, RetryPolicy};
use crate::content::{ContentProvider, Question};
use crate::db::models::review_key;
use crate::db::{PracticeStore, ReviewItem};
use crate::error::{EngineError, EngineResult};
use crate::services::mastery::require_id;
use crate::services::shuffle::{shuffle, shuffle_seed, ChoicePermutation};
use crate::services::with_retries;

pub const MIN_EASE: f64 = 1.3;
pub const MAX_EASE: f64 = 2.5;
pub const INITIAL_EASE: f64 = MAX_EASE;
pub const EASE_STEP_UP: f64 = 0.1;
pub const EASE_STEP_DOWN: f64 = 0.2;
pub const MIN_INTERVAL_DAYS: u32 = 1;
pub const MAX_INTERVAL_DAYS: u32 = 365;
/// Interval after a missed review.
pub const LAPSE_INTERVAL_DAYS: u32 = 2;

/// Ease is kept at two decimals so repeated steps do not drift.
fn round_ease(ease: f64) -> f64 {
    (ease * 100.0).round() / 100.0
}

fn due_after(now: DateTime<Utc>, interval_days: u32) -> DateTime<Utc> {
    now + Duration::days(i64::from(interval_days))
}

fn check_bounds(item: &ReviewItem) -> EngineResult<()> {
    if !(MIN_EASE..=MAX_EASE).contains(&item.ease) {
        return Err(EngineError::invariant(format!(
            "ease {} out of range for {}",
            item.ease,
            review_key(&item.learner_id, &item.question_id)
        )));
    }
    if !(MIN_INTERVAL_DAYS..=MAX_INTERVAL_DAYS).contains(&item.interval_days) {
        return Err(EngineError::invariant(format!(
            "interval {} out of range for {}",
            item.interval_days,
            review_key(&item.learner_id, &item.question_id)
        )));
    }
    Ok(())
}

pub fn new_item(
    learner_id: &str,
    question_id: &str,
    initial_interval_days: u32,
    now: DateTime<Utc>,
) -> ReviewItem {
    let interval_days = initial_interval_days.clamp(MIN_INTERVAL_DAYS, MAX_INTERVAL_DAYS);
    ReviewItem {
        learner_id: learner_id.to_string(),
        question_id: question_id.to_string(),
        due_at: due_after(now, interval_days),
        interval_days,
        ease: INITIAL_EASE,
        lapses: 0,
    }
}

/// A fresh miss pulls an existing item back to the initial interval. Ease
/// and lapses are review history and carry over.
pub fn reset_item(item: &ReviewItem, initial_interval_days: u32, now: DateTime<Utc>) -> ReviewItem {
    let interval_days = initial_interval_days.clamp(MIN_INTERVAL_DAYS, MAX_INTERVAL_DAYS);
    ReviewItem {
        interval_days,
        due_at: due_after(now, interval_days),
        ..item.clone()
    }
}

/// Next state after a review response.
pub fn apply_review(item: &ReviewItem, got_it: bool, now: DateTime<Utc>) -> EngineResult<ReviewItem> {
    check_bounds(item)?;

    let (interval_days, ease, lapses) = if got_it {
        let grown = (f64::from(item.interval_days) * item.ease).round();
        let interval = (grown as u32).clamp(MIN_INTERVAL_DAYS, MAX_INTERVAL_DAYS);
        (
            interval,
            round_ease(item.ease + EASE_STEP_UP).min(MAX_EASE),
            item.lapses,
        )
    } else {
        (
            LAPSE_INTERVAL_DAYS,
            round_ease(item.ease - EASE_STEP_DOWN).max(MIN_EASE),
            item.lapses.saturating_add(1),
        )
    };

    Ok(ReviewItem {
        learner_id: item.learner_id.clone(),
        question_id: item.question_id.clone(),
        due_at: due_after(now, interval_days),
        interval_days,
        ease,
        lapses,
    })
}

/// A due item joined with its question, choices already in display order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueItem {
    #[serde(flatten)]
    pub item: ReviewItem,
    pub stem: String,
    pub skill_id: String,
    pub choices: Vec<String>,
    pub choice_order: ChoicePermutation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl DueItem {
    fn build(item: ReviewItem, question: Question) -> EngineResult<Self> {
        // lapses changes between redisplays, so a relapsed item is reshuffled
        let seed = shuffle_seed(&item.learner_id, &item.question_id, item.lapses);
        let choice_order = shuffle(&seed, question.choices.len())?;
        let choices = choice_order.apply(&question.choices)?;
        Ok(Self {
            item,
            stem: question.stem,
            skill_id: question.skill_id,
            choices,
            choice_order,
            explanation: question.explanation,
        })
    }
}

pub struct ReviewScheduler {
    store: Arc<dyn PracticeStore>,
    content: Arc<dyn ContentProvider>,
    initial_interval_days: u32,
    retry: RetryPolicy,
    due_default_limit: usize,
    due_max_limit: usize,
}

impl ReviewScheduler {
    pub fn new(
        store: Arc<dyn PracticeStore>,
        content: Arc<dyn ContentProvider>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            content,
            initial_interval_days: config.initial_review_interval_days,
            retry: config.retry.clone(),
            due_default_limit: config.due_items_default_limit,
            due_max_limit: config.due_items_max_limit,
        }
    }

    pub async fn enqueue_or_reset(&self, learner_id: &str, question_id: &str) -> EngineResult<ReviewItem> {
        self.enqueue_or_reset_at(learner_id, question_id, Utc::now()).await
    }

    pub async fn enqueue_or_reset_at(
        &self,
        learner_id: &str,
        question_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<ReviewItem> {
        require_id("learner", learner_id)?;
        require_id("question", question_id)?;

        let key = review_key(learner_id, question_id);
        with_retries(&self.retry, &key, move || self.try_enqueue(learner_id, question_id, now)).await
    }

    async fn try_enqueue(
        &self,
        learner_id: &str,
        question_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<ReviewItem> {
        let current = self.store.get_review_item(learner_id, question_id).await?;
        let (next, expected_version) = match current {
            Some(row) => (
                reset_item(&row.value, self.initial_interval_days, now),
                Some(row.version),
            ),
            None => (new_item(learner_id, question_id, self.initial_interval_days, now), None),
        };
        let version = self.store.put_review_item(&next, expected_version).await?;
        tracing::debug!(
            learner = learner_id,
            question = question_id,
            version,
            due_at = %next.due_at,
            "review item enqueued"
        );
        Ok(next)
    }

    pub async fn review(&self, learner_id: &str, question_id: &str, got_it: bool) -> EngineResult<ReviewItem> {
        self.review_at(learner_id, question_id, got_it, Utc::now()).await
    }

    pub async fn review_at(
        &self,
        learner_id: &str,
        question_id: &str,
        got_it: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<ReviewItem> {
        require_id("learner", learner_id)?;
        require_id("question", question_id)?;

        let key = review_key(learner_id, question_id);
        with_retries(&self.retry, &key, move || {
            self.try_review(learner_id, question_id, got_it, now)
        })
        .await
    }

    async fn try_review(
        &self,
        learner_id: &str,
        question_id: &str,
        got_it: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<ReviewItem> {
        let row = self
            .store
            .get_review_item(learner_id, question_id)
            .await?
            .ok_or_else(|| EngineError::UnknownReviewItem {
                learner: learner_id.to_string(),
                question: question_id.to_string(),
            })?;
        let next = apply_review(&row.value, got_it, now)?;
        let version = self.store.put_review_item(&next, Some(row.version)).await?;
        tracing::debug!(
            learner = learner_id,
            question = question_id,
            version,
            got_it,
            interval_days = next.interval_days,
            ease = next.ease,
            "review recorded"
        );
        Ok(next)
    }

    pub fn resolve_limit(&self, limit: Option<usize>) -> EngineResult<usize> {
        match limit {
            None => Ok(self.due_default_limit),
            Some(0) => Err(EngineError::invalid("limit must be at least 1")),
            Some(n) => Ok(n.min(self.due_max_limit)),
        }
    }

    pub async fn due_items(
        &self,
        learner_id: &str,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<DueItem>> {
        require_id("learner", learner_id)?;
        let limit = self.resolve_limit(limit)?;

        // rows without content don't count toward the limit, so widen the
        // window by the number skipped until it fills or the due set runs out
        let mut window = limit;
        loop {
            let items = self.store.due_review_items(learner_id, now, window).await?;
            let exhausted = items.len() < window;

            let mut due = Vec::with_capacity(limit);
            let mut skipped = Vec::new();
            for item in items {
                if due.len() == limit {
                    break;
                }
                match self.content.question(&item.question_id).await {
                    Some(question) => due.push(DueItem::build(item, question)?),
                    None => skipped.push(item.question_id),
                }
            }

            if due.len() == limit || exhausted || skipped.is_empty() {
                if !skipped.is_empty() {
                    tracing::warn!(
                        learner = learner_id,
                        questions = ?skipped,
                        "due review items have no content, skipping"
                    );
                }
                return Ok(due);
            }
            window = window.saturating_add(skipped.len());
        }
    }
}
