use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::config::{SqliteConfig, SqliteJournalMode};
use crate::db::models::{mastery_key, review_key};
use crate::db::schema::{split_sql_statements, SCHEMA_VERSION, SQLITE_SCHEMA_SQL};
use crate::db::{Attempt, MasteryRecord, PracticeStore, ReviewItem, StoreError, Versioned};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str, config: &SqliteConfig) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let journal_mode = if in_memory {
            SqliteJournalMode::Memory
        } else {
            config.journal_mode
        };

        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(journal_mode.to_sqlx())
            .busy_timeout(config.busy_timeout);

        // every connection to :memory: opens its own database, so keep exactly one alive
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    let has_metadata: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_db_metadata'",
    )
    .fetch_one(pool)
    .await?;

    let installed: Option<String> = if has_metadata > 0 {
        sqlx::query_scalar(r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#)
            .fetch_optional(pool)
            .await?
    } else {
        None
    };

    if installed.as_deref() == Some(SCHEMA_VERSION) {
        return Ok(());
    }

    for stmt in split_sql_statements(SQLITE_SCHEMA_SQL) {
        sqlx::query(&stmt).execute(pool).await?;
    }

    sqlx::query(r#"INSERT OR REPLACE INTO "_db_metadata" ("key", "value") VALUES ('schema_version', ?)"#)
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    tracing::info!(version = SCHEMA_VERSION, "sqlite schema applied");
    Ok(())
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StoreError::Corrupt(format!("bad timestamp {raw}: {err}")))
}

fn to_u32(value: i64, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn to_u64(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn to_i64<T>(value: T, column: &str) -> Result<i64, StoreError>
where
    T: TryInto<i64> + Copy + std::fmt::Display,
{
    value
        .try_into()
        .map_err(|_| StoreError::OutOfRange(format!("{column} {value} does not fit")))
}

fn write_error(err: sqlx::Error) -> StoreError {
    if let Some(db) = err.as_database_error() {
        if matches!(db.kind(), sqlx::error::ErrorKind::CheckViolation) {
            return StoreError::Corrupt(db.message().to_string());
        }
    }
    StoreError::Sqlx(err)
}

fn map_mastery(row: &SqliteRow) -> Result<Versioned<MasteryRecord>, StoreError> {
    let record = MasteryRecord {
        learner_id: row.try_get("learnerId")?,
        skill_id: row.try_get("skillId")?,
        correct: to_u32(row.try_get("correct")?, "correct")?,
        total: to_u32(row.try_get("total")?, "total")?,
        avg_time_ms: to_u64(row.try_get("avgTimeMs")?, "avgTimeMs")?,
        last_updated: parse_ts(&row.try_get::<String, _>("lastUpdated")?)?,
    };
    let version = to_u64(row.try_get("version")?, "version")?;
    Ok(Versioned::new(record, version))
}

fn map_review(row: &SqliteRow) -> Result<Versioned<ReviewItem>, StoreError> {
    let item = ReviewItem {
        learner_id: row.try_get("learnerId")?,
        question_id: row.try_get("questionId")?,
        due_at: parse_ts(&row.try_get::<String, _>("dueAt")?)?,
        interval_days: to_u32(row.try_get("intervalDays")?, "intervalDays")?,
        ease: row.try_get("ease")?,
        lapses: to_u32(row.try_get("lapses")?, "lapses")?,
    };
    let version = to_u64(row.try_get("version")?, "version")?;
    Ok(Versioned::new(item, version))
}

fn map_attempt(row: &SqliteRow) -> Result<Attempt, StoreError> {
    let id: String = row.try_get("id")?;
    let choice_order: String = row.try_get("choiceOrder")?;
    let selected: Option<i64> = row.try_get("selectedIdx")?;

    Ok(Attempt {
        id: Uuid::parse_str(&id).map_err(|err| StoreError::Corrupt(format!("bad attempt id {id}: {err}")))?,
        learner_id: row.try_get("learnerId")?,
        question_id: row.try_get("questionId")?,
        skill_id: row.try_get("skillId")?,
        session_id: row.try_get("sessionId")?,
        choice_order: serde_json::from_str(&choice_order)
            .map_err(|err| StoreError::Corrupt(format!("bad choiceOrder {choice_order}: {err}")))?,
        correct_idx: to_u32(row.try_get("correctIdx")?, "correctIdx")? as usize,
        selected_idx: selected
            .map(|v| to_u32(v, "selectedIdx").map(|v| v as usize))
            .transpose()?,
        time_spent_ms: to_u64(row.try_get("timeSpentMs")?, "timeSpentMs")?,
        answered_at: parse_ts(&row.try_get::<String, _>("answeredAt")?)?,
    })
}

#[async_trait]
impl PracticeStore for SqliteStore {
    async fn get_mastery(
        &self,
        learner_id: &str,
        skill_id: &str,
    ) -> Result<Option<Versioned<MasteryRecord>>, StoreError> {
        let row = sqlx::query(
            r#"SELECT * FROM "mastery" WHERE "learnerId" = ? AND "skillId" = ? LIMIT 1"#,
        )
        .bind(learner_id)
        .bind(skill_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_mastery).transpose()
    }

    async fn put_mastery(
        &self,
        record: &MasteryRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let result = match expected_version {
            None => sqlx::query(
                r#"
                INSERT INTO "mastery" ("learnerId", "skillId", "correct", "total", "avgTimeMs", "lastUpdated", "version")
                VALUES (?, ?, ?, ?, ?, ?, 1)
                ON CONFLICT ("learnerId", "skillId") DO NOTHING
                "#,
            )
            .bind(&record.learner_id)
            .bind(&record.skill_id)
            .bind(i64::from(record.correct))
            .bind(i64::from(record.total))
            .bind(to_i64(record.avg_time_ms, "avgTimeMs")?)
            .bind(format_ts(record.last_updated))
            .execute(&self.pool)
            .await
            .map_err(write_error)?,
            Some(version) => sqlx::query(
                r#"
                UPDATE "mastery"
                SET "correct" = ?, "total" = ?, "avgTimeMs" = ?, "lastUpdated" = ?, "version" = "version" + 1
                WHERE "learnerId" = ? AND "skillId" = ? AND "version" = ?
                "#,
            )
            .bind(i64::from(record.correct))
            .bind(i64::from(record.total))
            .bind(to_i64(record.avg_time_ms, "avgTimeMs")?)
            .bind(format_ts(record.last_updated))
            .bind(&record.learner_id)
            .bind(&record.skill_id)
            .bind(to_i64(version, "version")?)
            .execute(&self.pool)
            .await
            .map_err(write_error)?,
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                key: mastery_key(&record.learner_id, &record.skill_id),
            });
        }
        Ok(expected_version.map_or(1, |v| v + 1))
    }

    async fn list_mastery(&self, learner_id: &str) -> Result<Vec<MasteryRecord>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT * FROM "mastery" WHERE "learnerId" = ? ORDER BY "skillId" ASC"#,
        )
        .bind(learner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| map_mastery(row).map(|v| v.value))
            .collect()
    }

    async fn get_review_item(
        &self,
        learner_id: &str,
        question_id: &str,
    ) -> Result<Option<Versioned<ReviewItem>>, StoreError> {
        let row = sqlx::query(
            r#"SELECT * FROM "review_queue" WHERE "learnerId" = ? AND "questionId" = ? LIMIT 1"#,
        )
        .bind(learner_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_review).transpose()
    }

    async fn put_review_item(
        &self,
        item: &ReviewItem,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let result = match expected_version {
            None => sqlx::query(
                r#"
                INSERT INTO "review_queue" ("learnerId", "questionId", "dueAt", "intervalDays", "ease", "lapses", "version")
                VALUES (?, ?, ?, ?, ?, ?, 1)
                ON CONFLICT ("learnerId", "questionId") DO NOTHING
                "#,
            )
            .bind(&item.learner_id)
            .bind(&item.question_id)
            .bind(format_ts(item.due_at))
            .bind(i64::from(item.interval_days))
            .bind(item.ease)
            .bind(i64::from(item.lapses))
            .execute(&self.pool)
            .await
            .map_err(write_error)?,
            Some(version) => sqlx::query(
                r#"
                UPDATE "review_queue"
                SET "dueAt" = ?, "intervalDays" = ?, "ease" = ?, "lapses" = ?, "version" = "version" + 1
                WHERE "learnerId" = ? AND "questionId" = ? AND "version" = ?
                "#,
            )
            .bind(format_ts(item.due_at))
            .bind(i64::from(item.interval_days))
            .bind(item.ease)
            .bind(i64::from(item.lapses))
            .bind(&item.learner_id)
            .bind(&item.question_id)
            .bind(to_i64(version, "version")?)
            .execute(&self.pool)
            .await
            .map_err(write_error)?,
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                key: review_key(&item.learner_id, &item.question_id),
            });
        }
        Ok(expected_version.map_or(1, |v| v + 1))
    }

    async fn due_review_items(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReviewItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM "review_queue"
            WHERE "learnerId" = ? AND "dueAt" <= ?
            ORDER BY "dueAt" ASC, "questionId" ASC
            LIMIT ?
            "#,
        )
        .bind(learner_id)
        .bind(format_ts(now))
        .bind(to_i64(limit, "limit")?)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| map_review(row).map(|v| v.value))
            .collect()
    }

    async fn append_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        let choice_order = serde_json::to_string(&attempt.choice_order)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO "attempts" (
                "id", "learnerId", "questionId", "skillId", "sessionId",
                "choiceOrder", "correctIdx", "selectedIdx", "timeSpentMs", "answeredAt"
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.id.to_string())
        .bind(&attempt.learner_id)
        .bind(&attempt.question_id)
        .bind(&attempt.skill_id)
        .bind(attempt.session_id.as_deref())
        .bind(choice_order)
        .bind(to_i64(attempt.correct_idx, "correctIdx")?)
        .bind(attempt.selected_idx.map(|v| to_i64(v, "selectedIdx")).transpose()?)
        .bind(to_i64(attempt.time_spent_ms, "timeSpentMs")?)
        .bind(format_ts(attempt.answered_at))
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn list_attempts(
        &self,
        learner_id: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<Attempt>, StoreError> {
        let rows = match session_id {
            Some(session_id) => {
                sqlx::query(
                    r#"SELECT * FROM "attempts" WHERE "learnerId" = ? AND "sessionId" = ? ORDER BY rowid ASC"#,
                )
                .bind(learner_id)
                .bind(session_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(r#"SELECT * FROM "attempts" WHERE "learnerId" = ? ORDER BY rowid ASC"#)
                    .bind(learner_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(map_attempt).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
