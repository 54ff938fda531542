pub const SCHEMA_VERSION: &str = "1.0.0";

pub const SQLITE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS "_db_metadata" (
    "key" TEXT PRIMARY KEY,
    "value" TEXT NOT NULL
);

-- one row per (learner, skill); version drives compare-and-swap
CREATE TABLE IF NOT EXISTS "mastery" (
    "learnerId" TEXT NOT NULL,
    "skillId" TEXT NOT NULL,
    "correct" INTEGER NOT NULL DEFAULT 0 CHECK ("correct" >= 0),
    "total" INTEGER NOT NULL DEFAULT 0 CHECK ("total" >= "correct"),
    "avgTimeMs" INTEGER NOT NULL DEFAULT 0 CHECK ("avgTimeMs" >= 0),
    "lastUpdated" TEXT NOT NULL,
    "version" INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY ("learnerId", "skillId")
);

CREATE TABLE IF NOT EXISTS "review_queue" (
    "learnerId" TEXT NOT NULL,
    "questionId" TEXT NOT NULL,
    "dueAt" TEXT NOT NULL,
    "intervalDays" INTEGER NOT NULL CHECK ("intervalDays" BETWEEN 1 AND 365),
    "ease" REAL NOT NULL CHECK ("ease" >= 1.3 AND "ease" <= 2.5),
    "lapses" INTEGER NOT NULL DEFAULT 0 CHECK ("lapses" >= 0),
    "version" INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY ("learnerId", "questionId")
);

CREATE INDEX IF NOT EXISTS "idx_review_queue_due" ON "review_queue" ("learnerId", "dueAt");

CREATE TABLE IF NOT EXISTS "attempts" (
    "id" TEXT PRIMARY KEY,
    "learnerId" TEXT NOT NULL,
    "questionId" TEXT NOT NULL,
    "skillId" TEXT NOT NULL,
    "sessionId" TEXT,
    "choiceOrder" TEXT NOT NULL,
    "correctIdx" INTEGER NOT NULL,
    "selectedIdx" INTEGER,
    "timeSpentMs" INTEGER NOT NULL,
    "answeredAt" TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS "idx_attempts_learner_session" ON "attempts" ("learnerId", "sessionId");
"#;

pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    for line in sql.lines() {
        if line.trim_start().starts_with("--") {
            continue;
        }
        for ch in line.chars() {
            match ch {
                '\'' if !in_double_quote => in_single_quote = !in_single_quote,
                '"' if !in_single_quote => in_double_quote = !in_double_quote,
                ';' if !in_single_quote && !in_double_quote => {
                    let stmt = current.trim();
                    if !stmt.is_empty() {
                        statements.push(stmt.to_string());
                    }
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }
        current.push('\n');
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_splits_into_statements() {
        let statements = split_sql_statements(SQLITE_SCHEMA_SQL);
        assert_eq!(statements.len(), 6);
        assert!(statements.iter().all(|s| !s.contains("--")));
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS \"mastery\""));
    }

    #[test]
    fn semicolons_inside_quotes_do_not_split() {
        let statements = split_sql_statements("INSERT INTO t VALUES ('a;b'); SELECT 1");
        assert_eq!(statements, vec!["INSERT INTO t VALUES ('a;b')", "SELECT 1"]);
    }
}
