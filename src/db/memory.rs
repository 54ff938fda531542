use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::db::models::{mastery_key, review_key};
use crate::db::{Attempt, MasteryRecord, PracticeStore, ReviewItem, StoreError, Versioned};

type Key = (String, String);

#[derive(Default)]
struct Tables {
    mastery: HashMap<Key, Versioned<MasteryRecord>>,
    reviews: HashMap<Key, Versioned<ReviewItem>>,
    attempts: Vec<Attempt>,
}

/// Process-local store. Each write holds the table lock for the whole
/// compare-and-put, so a write either lands completely or not at all.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicU32,
    conflict_writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` writes fail with [`StoreError::Unavailable`] before touching any table.
    pub fn fail_next_writes(&self, count: u32) {
        self.fail_writes.store(count, Ordering::SeqCst);
    }

    /// The next `count` versioned writes fail with [`StoreError::Conflict`].
    pub fn conflict_next_writes(&self, count: u32) {
        self.conflict_writes.store(count, Ordering::SeqCst);
    }

    pub fn attempt_count(&self) -> usize {
        self.tables.lock().attempts.len()
    }

    fn take_injected_failure(&self) -> Result<(), StoreError> {
        if consume(&self.fail_writes) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }

    fn take_injected_conflict(&self, key: String) -> Result<(), StoreError> {
        if consume(&self.conflict_writes) {
            return Err(StoreError::Conflict { key });
        }
        Ok(())
    }
}

fn consume(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn compare_and_put<T: Clone>(
    table: &mut HashMap<Key, Versioned<T>>,
    key: Key,
    value: &T,
    expected_version: Option<u64>,
    label: String,
) -> Result<u64, StoreError> {
    let current = table.get(&key).map(|row| row.version);
    if current != expected_version {
        return Err(StoreError::Conflict { key: label });
    }
    let next = current.unwrap_or(0) + 1;
    table.insert(key, Versioned::new(value.clone(), next));
    Ok(next)
}

#[async_trait]
impl PracticeStore for MemoryStore {
    async fn get_mastery(
        &self,
        learner_id: &str,
        skill_id: &str,
    ) -> Result<Option<Versioned<MasteryRecord>>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .mastery
            .get(&(learner_id.to_string(), skill_id.to_string()))
            .cloned())
    }

    async fn put_mastery(
        &self,
        record: &MasteryRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        self.take_injected_failure()?;
        let label = mastery_key(&record.learner_id, &record.skill_id);
        self.take_injected_conflict(label.clone())?;

        let mut tables = self.tables.lock();
        let key = (record.learner_id.clone(), record.skill_id.clone());
        compare_and_put(&mut tables.mastery, key, record, expected_version, label)
    }

    async fn list_mastery(&self, learner_id: &str) -> Result<Vec<MasteryRecord>, StoreError> {
        let tables = self.tables.lock();
        let mut records: Vec<MasteryRecord> = tables
            .mastery
            .values()
            .filter(|row| row.value.learner_id == learner_id)
            .map(|row| row.value.clone())
            .collect();
        records.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
        Ok(records)
    }

    async fn get_review_item(
        &self,
        learner_id: &str,
        question_id: &str,
    ) -> Result<Option<Versioned<ReviewItem>>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .reviews
            .get(&(learner_id.to_string(), question_id.to_string()))
            .cloned())
    }

    async fn put_review_item(
        &self,
        item: &ReviewItem,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        self.take_injected_failure()?;
        let label = review_key(&item.learner_id, &item.question_id);
        self.take_injected_conflict(label.clone())?;

        let mut tables = self.tables.lock();
        let key = (item.learner_id.clone(), item.question_id.clone());
        compare_and_put(&mut tables.reviews, key, item, expected_version, label)
    }

    async fn due_review_items(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReviewItem>, StoreError> {
        let tables = self.tables.lock();
        let mut due: Vec<ReviewItem> = tables
            .reviews
            .values()
            .filter(|row| row.value.learner_id == learner_id && row.value.due_at <= now)
            .map(|row| row.value.clone())
            .collect();
        due.sort_by(|a, b| {
            a.due_at
                .cmp(&b.due_at)
                .then_with(|| a.question_id.cmp(&b.question_id))
        });
        due.truncate(limit);
        Ok(due)
    }

    async fn append_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        self.take_injected_failure()?;
        self.tables.lock().attempts.push(attempt.clone());
        Ok(())
    }

    async fn list_attempts(
        &self,
        learner_id: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<Attempt>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .attempts
            .iter()
            .filter(|a| a.learner_id == learner_id)
            .filter(|a| session_id.is_none() || a.session_id.as_deref() == session_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(correct: u32, total: u32) -> MasteryRecord {
        MasteryRecord {
            learner_id: "u1".to_string(),
            skill_id: "s1".to_string(),
            correct,
            total,
            avg_time_ms: 1000,
            last_updated: Utc::now(),
        }
    }

    fn item(question: &str, due_at: DateTime<Utc>) -> ReviewItem {
        ReviewItem {
            learner_id: "u1".to_string(),
            question_id: question.to_string(),
            due_at,
            interval_days: 2,
            ease: 2.5,
            lapses: 0,
        }
    }

    #[tokio::test]
    async fn create_only_when_absent() {
        let store = MemoryStore::new();
        assert_eq!(store.put_mastery(&record(1, 1), None).await.unwrap(), 1);
        let err = store.put_mastery(&record(2, 2), None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn stale_version_is_rejected_and_row_kept() {
        let store = MemoryStore::new();
        store.put_mastery(&record(1, 1), None).await.unwrap();
        store.put_mastery(&record(2, 2), Some(1)).await.unwrap();

        let err = store.put_mastery(&record(9, 9), Some(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let stored = store.get_mastery("u1", "s1").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.value.total, 2);
    }

    #[tokio::test]
    async fn due_items_are_ordered_and_capped() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.put_review_item(&item("q3", now - Duration::days(1)), None).await.unwrap();
        store.put_review_item(&item("q1", now - Duration::days(3)), None).await.unwrap();
        store.put_review_item(&item("q2", now + Duration::days(1)), None).await.unwrap();
        store.put_review_item(&item("q4", now), None).await.unwrap();

        let due = store.due_review_items("u1", now, 10).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|i| i.question_id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q3", "q4"]);

        let capped = store.due_review_items("u1", now, 1).await.unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_writes(1);
        assert!(matches!(
            store.put_mastery(&record(1, 1), None).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.get_mastery("u1", "s1").await.unwrap().is_none());
        assert!(store.put_mastery(&record(1, 1), None).await.is_ok());
    }
}
