use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use act_practice_engine::db::config::SqliteConfig;
use act_practice_engine::db::{MemoryStore, PracticeStore, SqliteStore};
use act_practice_engine::content::Subject;
use act_practice_engine::services::engine::{AttemptContext, PracticeEngine, SubmitAttempt};
use act_practice_engine::services::mastery::MasteryLevel;
use act_practice_engine::services::scoring::apply_time_accommodation;
use act_practice_engine::services::shuffle::{shuffle, shuffle_seed};
use act_practice_engine::services::weak_areas::Priority;

mod common;

fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 8, 30, 0).unwrap()
}

fn answer(learner: &str, question: &str, counter: u32, right: bool) -> SubmitAttempt {
    let order = shuffle(&shuffle_seed(learner, question, counter), 4).unwrap();
    let correct_display = order.display_of(2).unwrap();
    SubmitAttempt {
        learner_id: learner.to_string(),
        question_id: question.to_string(),
        skill_id: None,
        session_id: Some("mock-1".to_string()),
        selected_idx: Some(if right { correct_display } else { (correct_display + 3) % 4 }),
        choice_order: Some(order),
        display_counter: Some(counter),
        time_ms: 40_000,
        context: AttemptContext::Practice,
    }
}

fn memory_engine() -> Arc<PracticeEngine> {
    common::engine_with_store(Arc::new(MemoryStore::new()))
}

#[tokio::test]
async fn eight_of_ten_is_proficient_and_a_medium_weak_area() {
    let engine = memory_engine();
    for n in 0..10u32 {
        let question = if n % 2 == 0 { "q-alg-1" } else { "q-alg-2" };
        engine
            .submit_attempt_at(answer("ana", question, n, n < 8), monday_morning())
            .await
            .unwrap();
    }

    let mastery = engine.ledger().get("ana", "alg.linear").await.unwrap();
    assert_eq!((mastery.correct, mastery.total), (8, 10));
    assert_eq!(mastery.accuracy, 80.0);
    assert_eq!(mastery.level, MasteryLevel::Proficient);

    let weak = engine.weak_areas("ana", None).await.unwrap();
    assert_eq!(weak.len(), 1);
    assert_eq!(weak[0].skill_id, "alg.linear");
    assert_eq!(weak[0].priority, Priority::Medium);
}

#[tokio::test]
async fn miss_then_recover_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("scenario.db").display());
    let store: Arc<dyn PracticeStore> = Arc::new(SqliteStore::connect(&url, &SqliteConfig::default()).await.unwrap());
    let engine = common::engine_with_store(store);
    let now = monday_morning();

    let outcome = engine
        .submit_attempt_at(answer("ben", "q-geo-1", 0, false), now)
        .await
        .unwrap();
    let queued = outcome.review.unwrap();
    assert_eq!((queued.interval_days, queued.ease, queued.lapses), (2, 2.5, 0));

    // the item comes due two days later and is answered wrong again
    let first_review = now + Duration::days(2);
    let due = engine.due_items("ben", None, first_review).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].item.question_id, "q-geo-1");

    let missed = engine
        .scheduler()
        .review_at("ben", "q-geo-1", false, first_review)
        .await
        .unwrap();
    assert_eq!((missed.interval_days, missed.ease, missed.lapses), (2, 2.3, 1));
    assert_eq!(missed.due_at, first_review + Duration::days(2));

    let second_review = missed.due_at;
    let recovered = engine
        .scheduler()
        .review_at("ben", "q-geo-1", true, second_review)
        .await
        .unwrap();
    assert_eq!((recovered.interval_days, recovered.ease, recovered.lapses), (5, 2.4, 1));
    assert_eq!(recovered.due_at, second_review + Duration::days(5));

    assert!(engine.due_items("ben", None, second_review).await.unwrap().is_empty());
}

#[tokio::test]
async fn accommodated_english_section() {
    let engine = memory_engine();
    // three of four right
    for (n, right) in [true, true, false, true].into_iter().enumerate() {
        engine
            .submit_attempt_at(answer("cy", "q-en-1", n as u32, right), monday_morning())
            .await
            .unwrap();
    }

    assert_eq!(apply_time_accommodation(2700, 150).unwrap(), 4050);

    let score = engine
        .score_session("cy", "mock-1", 150, Subject::English)
        .await
        .unwrap();
    assert_eq!(score.total_questions, 4);
    assert_eq!(score.accuracy, 75.0);
    assert_eq!(score.scaled_score, 27);
    assert_eq!(score.time_limit_seconds, 4050);
    assert_eq!(score.clusters.clusters[0].cluster, "Punctuation");
    assert!(score.careless_rate == 0.0);
}
