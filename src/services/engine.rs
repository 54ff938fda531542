use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::content::{ContentProvider, Question, Skill};
use crate::db::{Attempt, PracticeStore, ReviewItem, MAX_TIME_SPENT_MS};
use crate::error::{EngineError, EngineResult};
use crate::services::mastery::{require_id, MasteryLedger, MasteryView};
use crate::services::review::{DueItem, ReviewScheduler};
use crate::services::scoring::{session_score, Section, SessionScore};
use crate::services::shuffle::{grade, shuffle, shuffle_seed, verify_permutation, ChoicePermutation};
use crate::services::weak_areas::{prioritize, weak_area_stats, WeakArea, WeakAreaStats, DEFAULT_WEAK_AREA_LIMIT};
use crate::services::with_retries;

/// Where an answer was given. Misses in practice enqueue a review; misses
/// inside a review session are reported through [`PracticeEngine::review`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptContext {
    #[default]
    Practice,
    Review,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttempt {
    pub learner_id: String,
    pub question_id: String,
    /// Checked against the question's skill when present.
    #[serde(default)]
    pub skill_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Display position picked; `None` when skipped or timed out.
    #[serde(default)]
    pub selected_idx: Option<usize>,
    /// Order the choices were shown in.
    #[serde(default)]
    pub choice_order: Option<ChoicePermutation>,
    /// Seed counter the order was generated from. With `choice_order` the two
    /// must agree; alone it regenerates the order.
    #[serde(default)]
    pub display_counter: Option<u32>,
    pub time_ms: u64,
    #[serde(default)]
    pub context: AttemptContext,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub attempt_id: Uuid,
    pub correct: bool,
    /// Where the right answer was shown.
    pub correct_display_idx: usize,
    pub mastery: MasteryView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewItem>,
}

pub struct PracticeEngine {
    store: Arc<dyn PracticeStore>,
    content: Arc<dyn ContentProvider>,
    ledger: MasteryLedger,
    scheduler: ReviewScheduler,
    config: EngineConfig,
}

impl PracticeEngine {
    pub fn new(
        store: Arc<dyn PracticeStore>,
        content: Arc<dyn ContentProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger: MasteryLedger::new(store.clone(), &config),
            scheduler: ReviewScheduler::new(store.clone(), content.clone(), &config),
            store,
            content,
            config,
        }
    }

    pub fn ledger(&self) -> &MasteryLedger {
        &self.ledger
    }

    pub fn scheduler(&self) -> &ReviewScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn submit_attempt(&self, input: SubmitAttempt) -> EngineResult<SubmitOutcome> {
        self.submit_attempt_at(input, Utc::now()).await
    }

    /// Grades an answer, appends the attempt, updates mastery, and for a
    /// practice miss enqueues the question for review.
    pub async fn submit_attempt_at(
        &self,
        input: SubmitAttempt,
        now: DateTime<Utc>,
    ) -> EngineResult<SubmitOutcome> {
        require_id("learner", &input.learner_id)?;
        require_id("question", &input.question_id)?;
        if input.time_ms > MAX_TIME_SPENT_MS {
            return Err(EngineError::invalid(format!(
                "timeMs {} exceeds {MAX_TIME_SPENT_MS}",
                input.time_ms
            )));
        }

        let question = self
            .content
            .question(&input.question_id)
            .await
            .ok_or_else(|| EngineError::UnknownQuestion(input.question_id.clone()))?;
        if let Some(skill_id) = &input.skill_id {
            if skill_id != &question.skill_id {
                return Err(EngineError::invalid(format!(
                    "question {} belongs to skill {}, not {skill_id}",
                    question.id, question.skill_id
                )));
            }
        }

        let permutation = resolve_permutation(&input, &question)?;
        if let Some(selected) = input.selected_idx {
            if selected >= permutation.len() {
                return Err(EngineError::invalid(format!(
                    "selected index {selected} out of range for {} choices",
                    permutation.len()
                )));
            }
        }
        let correct = grade(&permutation, question.answer_idx, input.selected_idx);
        let correct_display_idx = permutation
            .display_of(question.answer_idx)
            .ok_or_else(|| EngineError::invariant(format!("answer missing from order of {}", question.id)))?;

        let attempt = Attempt {
            id: Uuid::new_v4(),
            learner_id: input.learner_id.clone(),
            question_id: question.id.clone(),
            skill_id: question.skill_id.clone(),
            session_id: input.session_id.clone(),
            choice_order: permutation.into(),
            correct_idx: question.answer_idx,
            selected_idx: input.selected_idx,
            time_spent_ms: input.time_ms,
            answered_at: now,
        };
        let key = attempt.id.to_string();
        let pending = &attempt;
        with_retries(&self.config.retry, &key, move || async move {
            self.store.append_attempt(pending).await.map_err(EngineError::from)
        })
        .await?;

        let mastery = self
            .ledger
            .record_attempt_at(&attempt.learner_id, &attempt.skill_id, correct, attempt.time_spent_ms, now)
            .await?;

        let review = if !correct && input.context == AttemptContext::Practice {
            Some(
                self.scheduler
                    .enqueue_or_reset_at(&attempt.learner_id, &attempt.question_id, now)
                    .await?,
            )
        } else {
            None
        };

        tracing::info!(
            learner = %attempt.learner_id,
            question = %attempt.question_id,
            skill = %attempt.skill_id,
            attempt = %attempt.id,
            correct,
            "attempt recorded"
        );

        Ok(SubmitOutcome {
            attempt_id: attempt.id,
            correct,
            correct_display_idx,
            mastery,
            review,
        })
    }

    pub async fn mastery(&self, learner_id: &str) -> EngineResult<Vec<MasteryView>> {
        require_id("learner", learner_id)?;
        self.ledger.get_all(learner_id).await
    }

    pub async fn weak_areas(&self, learner_id: &str, limit: Option<usize>) -> EngineResult<Vec<WeakArea>> {
        require_id("learner", learner_id)?;
        let records = self.ledger.snapshot(learner_id).await?;
        let skill_ids: Vec<String> = records.iter().map(|r| r.skill_id.clone()).collect();
        let skills = self.content.skills(&skill_ids).await;
        prioritize(
            &records,
            &skills,
            self.ledger.min_attempts(),
            limit.unwrap_or(DEFAULT_WEAK_AREA_LIMIT),
        )
    }

    pub async fn weak_area_stats(&self, learner_id: &str) -> EngineResult<WeakAreaStats> {
        require_id("learner", learner_id)?;
        weak_area_stats(&self.ledger.snapshot(learner_id).await?)
    }

    pub async fn due_items(
        &self,
        learner_id: &str,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<DueItem>> {
        self.scheduler.due_items(learner_id, limit, now).await
    }

    pub async fn review(&self, learner_id: &str, question_id: &str, got_it: bool) -> EngineResult<ReviewItem> {
        self.scheduler.review(learner_id, question_id, got_it).await
    }

    /// Scores a batch the caller already holds.
    pub async fn score_attempts(
        &self,
        attempts: &[Attempt],
        multiplier_percent: u32,
        section: Section,
    ) -> EngineResult<SessionScore> {
        let skills = self.skills_for(attempts).await;
        session_score(attempts, &skills, multiplier_percent, section)
    }

    /// Scores every stored attempt of one session.
    pub async fn score_session(
        &self,
        learner_id: &str,
        session_id: &str,
        multiplier_percent: u32,
        section: Section,
    ) -> EngineResult<SessionScore> {
        require_id("learner", learner_id)?;
        require_id("session", session_id)?;
        let attempts = self.store.list_attempts(learner_id, Some(session_id)).await?;
        self.score_attempts(&attempts, multiplier_percent, section).await
    }

    pub async fn ping(&self) -> EngineResult<()> {
        Ok(self.store.ping().await?)
    }

    async fn skills_for(&self, attempts: &[Attempt]) -> Vec<Skill> {
        let ids: BTreeSet<&str> = attempts.iter().map(|a| a.skill_id.as_str()).collect();
        let ids: Vec<String> = ids.into_iter().map(str::to_string).collect();
        self.content.skills(&ids).await
    }
}

fn resolve_permutation(input: &SubmitAttempt, question: &Question) -> EngineResult<ChoicePermutation> {
    let n = question.choices.len();
    let seed = input
        .display_counter
        .map(|counter| shuffle_seed(&input.learner_id, &input.question_id, counter));

    let permutation = match (&input.choice_order, seed) {
        (Some(order), Some(seed)) => {
            verify_permutation(order, &seed)?;
            order.clone()
        }
        (Some(order), None) => order.clone(),
        (None, Some(seed)) => shuffle(&seed, n)?,
        (None, None) => {
            return Err(EngineError::invalid(
                "either choiceOrder or displayCounter is required",
            ))
        }
    };

    if permutation.len() != n {
        return Err(EngineError::invalid(format!(
            "choice order covers {} choices, question {} has {n}",
            permutation.len(),
            question.id
        )));
    }
    Ok(permutation)
}
