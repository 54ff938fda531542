//! Per (learner, skill) running statistics and level classification.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, RetryPolicy};
use crate::db::models::mastery_key;
use crate::db::{MasteryRecord, PracticeStore};
use crate::error::{EngineError, EngineResult};
use crate::services::with_retries;

pub const MASTERED_ACCURACY: f64 = 90.0;
pub const PROFICIENT_ACCURACY: f64 = 75.0;
pub const LEARNING_ACCURACY: f64 = 60.0;

/// Ordered from least to most mastered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MasteryLevel {
    NotStarted,
    Beginner,
    Learning,
    Proficient,
    Mastered,
}

impl MasteryLevel {
    /// Classifies a skill from its counters alone.
    ///
    /// Below `min_attempts` answered questions a started skill is reported as
    /// `Learning` regardless of accuracy.
    pub fn classify(correct: u32, total: u32, min_attempts: u32) -> EngineResult<Self> {
        let accuracy = accuracy(correct, total)?;
        if total == 0 {
            return Ok(Self::NotStarted);
        }
        if total < min_attempts {
            return Ok(Self::Learning);
        }
        Ok(if accuracy >= MASTERED_ACCURACY {
            Self::Mastered
        } else if accuracy >= PROFICIENT_ACCURACY {
            Self::Proficient
        } else if accuracy >= LEARNING_ACCURACY {
            Self::Learning
        } else {
            Self::Beginner
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::Beginner => "Beginner",
            Self::Learning => "Learning",
            Self::Proficient => "Proficient",
            Self::Mastered => "Mastered",
        }
    }
}

/// Percentage correct in [0, 100]; 0 when nothing has been answered.
pub fn accuracy(correct: u32, total: u32) -> EngineResult<f64> {
    if correct > total {
        return Err(EngineError::invariant(format!(
            "correct count {correct} exceeds total {total}"
        )));
    }
    if total == 0 {
        return Ok(0.0);
    }
    Ok(f64::from(correct) * 100.0 / f64::from(total))
}

/// Folds one graded answer into a record.
pub fn apply_attempt(
    record: &MasteryRecord,
    correct: bool,
    time_ms: u64,
    now: DateTime<Utc>,
) -> EngineResult<MasteryRecord> {
    let total = record
        .total
        .checked_add(1)
        .ok_or_else(|| EngineError::invariant("mastery total overflow"))?;
    let correct_count = record.correct + u32::from(correct);
    if correct_count > total {
        return Err(EngineError::invariant(format!(
            "correct count {correct_count} exceeds total {total}"
        )));
    }

    // round((oldAvg * oldTotal + t) / newTotal), half up
    let weighted = u128::from(record.avg_time_ms) * u128::from(record.total) + u128::from(time_ms);
    let n = u128::from(total);
    let avg = (2 * weighted + n) / (2 * n);

    Ok(MasteryRecord {
        learner_id: record.learner_id.clone(),
        skill_id: record.skill_id.clone(),
        correct: correct_count,
        total,
        avg_time_ms: u64::try_from(avg).unwrap_or(u64::MAX),
        last_updated: now,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryView {
    pub skill_id: String,
    pub correct: u32,
    pub total: u32,
    pub accuracy: f64,
    pub level: MasteryLevel,
    pub label: &'static str,
    pub avg_time_ms: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl MasteryView {
    pub fn from_record(record: &MasteryRecord, min_attempts: u32) -> EngineResult<Self> {
        let level = MasteryLevel::classify(record.correct, record.total, min_attempts)?;
        Ok(Self {
            skill_id: record.skill_id.clone(),
            correct: record.correct,
            total: record.total,
            accuracy: accuracy(record.correct, record.total)?,
            level,
            label: level.label(),
            avg_time_ms: record.avg_time_ms,
            last_updated: Some(record.last_updated),
        })
    }

    pub fn not_started(skill_id: &str) -> Self {
        Self {
            skill_id: skill_id.to_string(),
            correct: 0,
            total: 0,
            accuracy: 0.0,
            level: MasteryLevel::NotStarted,
            label: MasteryLevel::NotStarted.label(),
            avg_time_ms: 0,
            last_updated: None,
        }
    }
}

pub struct MasteryLedger {
    store: Arc<dyn PracticeStore>,
    min_attempts: u32,
    retry: RetryPolicy,
}

impl MasteryLedger {
    pub fn new(store: Arc<dyn PracticeStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            min_attempts: config.mastery_min_attempts,
            retry: config.retry.clone(),
        }
    }

    pub fn min_attempts(&self) -> u32 {
        self.min_attempts
    }

    pub async fn record_attempt(
        &self,
        learner_id: &str,
        skill_id: &str,
        correct: bool,
        time_ms: u64,
    ) -> EngineResult<MasteryView> {
        self.record_attempt_at(learner_id, skill_id, correct, time_ms, Utc::now())
            .await
    }

    /// Counts one attempt. Every call is counted, including replays of an
    /// attempt already recorded.
    pub async fn record_attempt_at(
        &self,
        learner_id: &str,
        skill_id: &str,
        correct: bool,
        time_ms: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<MasteryView> {
        require_id("learner", learner_id)?;
        require_id("skill", skill_id)?;

        let key = mastery_key(learner_id, skill_id);
        let record = with_retries(&self.retry, &key, move || {
            self.try_record(learner_id, skill_id, correct, time_ms, now)
        })
        .await?;

        MasteryView::from_record(&record, self.min_attempts)
    }

    async fn try_record(
        &self,
        learner_id: &str,
        skill_id: &str,
        correct: bool,
        time_ms: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<MasteryRecord> {
        let current = self.store.get_mastery(learner_id, skill_id).await?;
        let (base, expected_version) = match current {
            Some(row) => (row.value, Some(row.version)),
            None => (MasteryRecord::empty(learner_id, skill_id, now), None),
        };

        let next = apply_attempt(&base, correct, time_ms, now)?;
        let version = self.store.put_mastery(&next, expected_version).await?;
        tracing::debug!(
            learner = learner_id,
            skill = skill_id,
            version,
            correct = next.correct,
            total = next.total,
            "mastery updated"
        );
        Ok(next)
    }

    /// Missing records read as not started.
    pub async fn get(&self, learner_id: &str, skill_id: &str) -> EngineResult<MasteryView> {
        match self.store.get_mastery(learner_id, skill_id).await? {
            Some(row) => MasteryView::from_record(&row.value, self.min_attempts),
            None => Ok(MasteryView::not_started(skill_id)),
        }
    }

    pub async fn get_all(&self, learner_id: &str) -> EngineResult<Vec<MasteryView>> {
        let mut records = self.store.list_mastery(learner_id).await?;
        records.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
        records
            .iter()
            .map(|record| MasteryView::from_record(record, self.min_attempts))
            .collect()
    }

    /// Raw records for read-side views.
    pub async fn snapshot(&self, learner_id: &str) -> EngineResult<Vec<MasteryRecord>> {
        Ok(self.store.list_mastery(learner_id).await?)
    }
}

pub(crate) fn require_id(kind: &str, id: &str) -> EngineResult<()> {
    if id.trim().is_empty() {
        return Err(EngineError::invalid(format!("{kind} id must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn ledger(store: Arc<MemoryStore>) -> MasteryLedger {
        MasteryLedger::new(store, &EngineConfig::default())
    }

    #[test]
    fn classification_thresholds() {
        let level = |c, t| MasteryLevel::classify(c, t, 1).unwrap();
        assert_eq!(level(0, 0), MasteryLevel::NotStarted);
        assert_eq!(level(9, 10), MasteryLevel::Mastered);
        assert_eq!(level(8, 10), MasteryLevel::Proficient);
        assert_eq!(level(3, 4), MasteryLevel::Proficient);
        assert_eq!(level(6, 10), MasteryLevel::Learning);
        assert_eq!(level(5, 10), MasteryLevel::Beginner);
        assert_eq!(level(0, 10), MasteryLevel::Beginner);
    }

    #[test]
    fn minimum_attempts_gate() {
        assert_eq!(MasteryLevel::classify(2, 2, 3).unwrap(), MasteryLevel::Learning);
        assert_eq!(MasteryLevel::classify(0, 2, 3).unwrap(), MasteryLevel::Learning);
        assert_eq!(MasteryLevel::classify(3, 3, 3).unwrap(), MasteryLevel::Mastered);
        assert_eq!(MasteryLevel::classify(0, 0, 3).unwrap(), MasteryLevel::NotStarted);
    }

    #[test]
    fn level_never_drops_as_correct_grows() {
        for min_attempts in [1, 3, 5] {
            for total in 0..=40u32 {
                let mut previous = MasteryLevel::NotStarted;
                for correct in 0..=total {
                    let level = MasteryLevel::classify(correct, total, min_attempts).unwrap();
                    assert!(level >= previous, "{correct}/{total} min {min_attempts}");
                    previous = level;
                }
            }
        }
    }

    #[test]
    fn malformed_counts_are_rejected() {
        assert!(matches!(
            MasteryLevel::classify(5, 4, 1),
            Err(EngineError::InvariantViolation(_))
        ));
        assert!(accuracy(5, 4).is_err());
    }

    #[test]
    fn running_average_rounds() {
        let now = Utc::now();
        let first = apply_attempt(&MasteryRecord::empty("u", "s", now), true, 1000, now).unwrap();
        assert_eq!(first.avg_time_ms, 1000);
        assert_eq!((first.correct, first.total), (1, 1));

        let second = apply_attempt(&first, false, 2001, now).unwrap();
        // (1000 + 2001) / 2 = 1500.5
        assert_eq!(second.avg_time_ms, 1501);
        assert_eq!((second.correct, second.total), (1, 2));

        let third = apply_attempt(&second, true, 0, now).unwrap();
        // (1501 * 2 + 0) / 3 = 1000.67
        assert_eq!(third.avg_time_ms, 1001);
    }

    #[test]
    fn labels() {
        assert_eq!(MasteryLevel::NotStarted.label(), "Not Started");
        assert_eq!(
            serde_json::to_string(&MasteryLevel::NotStarted).unwrap(),
            "\"not-started\""
        );
    }

    #[tokio::test]
    async fn missing_record_reads_as_not_started() {
        let ledger = ledger(Arc::new(MemoryStore::new()));
        let view = ledger.get("u1", "alg").await.unwrap();
        assert_eq!(view.level, MasteryLevel::NotStarted);
        assert_eq!(view.total, 0);
        assert_eq!(view.accuracy, 0.0);
        assert!(ledger.get_all("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replays_are_counted_twice() {
        let ledger = ledger(Arc::new(MemoryStore::new()));
        ledger.record_attempt("u1", "alg", true, 1200).await.unwrap();
        let view = ledger.record_attempt("u1", "alg", true, 1200).await.unwrap();
        assert_eq!((view.correct, view.total), (2, 2));
        assert_eq!(view.avg_time_ms, 1200);
    }

    #[tokio::test]
    async fn conflicts_are_retried() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(store.clone());
        store.conflict_next_writes(2);
        let view = ledger.record_attempt("u1", "alg", false, 500).await.unwrap();
        assert_eq!((view.correct, view.total), (0, 1));
    }

    #[tokio::test]
    async fn exhausted_retries_surface_and_leave_record_untouched() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(store.clone());
        ledger.record_attempt("u1", "alg", true, 500).await.unwrap();

        store.fail_next_writes(10);
        let err = ledger.record_attempt("u1", "alg", true, 500).await.unwrap_err();
        assert!(matches!(err, EngineError::RecordingFailed { attempts: 5, .. }));

        store.fail_next_writes(0);
        let view = ledger.get("u1", "alg").await.unwrap();
        assert_eq!(view.total, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attempts_are_all_counted() {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig {
            retry: RetryPolicy {
                max_attempts: 200,
                backoff: std::time::Duration::from_millis(1),
            },
            ..EngineConfig::default()
        };
        let ledger = Arc::new(MasteryLedger::new(store, &config));

        let mut handles = Vec::new();
        for i in 0..50u64 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .record_attempt("u1", "alg", i % 2 == 0, 1000 + i)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let view = ledger.get("u1", "alg").await.unwrap();
        assert_eq!(view.total, 50);
        assert_eq!(view.correct, 25);
    }

    #[tokio::test]
    async fn empty_ids_are_invalid() {
        let ledger = ledger(Arc::new(MemoryStore::new()));
        assert!(matches!(
            ledger.record_attempt("", "alg", true, 1).await,
            Err(EngineError::InvalidInput(_))
        ));
    }
}
