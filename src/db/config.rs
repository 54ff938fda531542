use std::time::Duration;

use thiserror::Error;

use crate::config::{env_u32, env_u64};

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: Option<String>,
    pub sqlite: SqliteConfig,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, DbConfigError> {
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(normalize_sqlite_url(value.trim())?),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            sqlite: SqliteConfig::from_env(),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            database_url: None,
            sqlite: SqliteConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub max_connections: u32,
    pub busy_timeout: Duration,
    pub journal_mode: SqliteJournalMode,
}

impl SqliteConfig {
    fn from_env() -> Self {
        let journal_mode = std::env::var("SQLITE_JOURNAL_MODE")
            .ok()
            .as_deref()
            .and_then(SqliteJournalMode::parse)
            .unwrap_or(SqliteJournalMode::Wal);

        Self {
            max_connections: env_u32("DB_MAX_CONNECTIONS", 5).max(1),
            busy_timeout: Duration::from_millis(env_u64("SQLITE_BUSY_TIMEOUT_MS", 5000)),
            journal_mode,
        }
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_millis(5000),
            journal_mode: SqliteJournalMode::Wal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqliteJournalMode {
    Delete,
    Wal,
    Memory,
}

impl SqliteJournalMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "DELETE" => Some(Self::Delete),
            "WAL" => Some(Self::Wal),
            "MEMORY" => Some(Self::Memory),
            _ => None,
        }
    }

    pub(crate) fn to_sqlx(self) -> sqlx::sqlite::SqliteJournalMode {
        match self {
            Self::Delete => sqlx::sqlite::SqliteJournalMode::Delete,
            Self::Wal => sqlx::sqlite::SqliteJournalMode::Wal,
            Self::Memory => sqlx::sqlite::SqliteJournalMode::Memory,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbConfigError {
    #[error("unsupported database url {url}: only sqlite is supported")]
    UnsupportedScheme { url: String },
}

/// Accepts `sqlite:` URLs as-is and treats anything without a scheme as a file path.
fn normalize_sqlite_url(value: &str) -> Result<String, DbConfigError> {
    if value.starts_with("sqlite:") {
        return Ok(value.to_string());
    }
    if value.contains("://") {
        return Err(DbConfigError::UnsupportedScheme {
            url: value.to_string(),
        });
    }
    Ok(format!("sqlite:{value}?mode=rwc"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_paths_become_sqlite_urls() {
        assert_eq!(
            normalize_sqlite_url("./data/engine.db").unwrap(),
            "sqlite:./data/engine.db?mode=rwc"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:").unwrap(),
            "sqlite::memory:"
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(matches!(
            normalize_sqlite_url("postgres://localhost/act"),
            Err(DbConfigError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn journal_mode_parse_is_case_insensitive() {
        assert_eq!(SqliteJournalMode::parse("wal"), Some(SqliteJournalMode::Wal));
        assert_eq!(SqliteJournalMode::parse("DELETE"), Some(SqliteJournalMode::Delete));
        assert_eq!(SqliteJournalMode::parse("bogus"), None);
    }
}
