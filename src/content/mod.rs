pub mod catalog;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use catalog::Catalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subject {
    #[serde(alias = "EN", alias = "english")]
    English,
    #[serde(alias = "MATH", alias = "math")]
    Math,
    #[serde(alias = "RD", alias = "reading")]
    Reading,
    #[serde(alias = "SCI", alias = "science")]
    Science,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::English => "English",
            Subject::Math => "Math",
            Subject::Reading => "Reading",
            Subject::Science => "Science",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub subject: Subject,
    pub cluster: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub skill_id: String,
    pub stem: String,
    /// Canonical order; display order comes from the seeded permutation.
    pub choices: Vec<String>,
    pub answer_idx: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read content file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse content file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid content: {0}")]
    Invalid(String),
}

/// Read-only question and skill reference data.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn question(&self, question_id: &str) -> Option<Question>;

    async fn skill(&self, skill_id: &str) -> Option<Skill>;

    /// Known skills among `skill_ids`; unknown ids are left out.
    async fn skills(&self, skill_ids: &[String]) -> Vec<Skill> {
        let mut found = Vec::with_capacity(skill_ids.len());
        for id in skill_ids {
            if let Some(skill) = self.skill(id).await {
                found.push(skill);
            }
        }
        found
    }
}
