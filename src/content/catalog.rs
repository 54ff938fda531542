use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::content::{ContentError, ContentProvider, Question, Skill};

const MIN_CHOICES: usize = 4;
const MAX_CHOICES: usize = 5;

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    skills: Vec<Skill>,
    #[serde(default)]
    questions: Vec<Question>,
}

/// In-memory skills and questions, checked for consistency when built.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    skills: HashMap<String, Skill>,
    questions: HashMap<String, Question>,
}

impl Catalog {
    pub fn new(skills: Vec<Skill>, questions: Vec<Question>) -> Result<Self, ContentError> {
        let mut catalog = Self::default();
        for skill in skills {
            if catalog.skills.contains_key(&skill.id) {
                return Err(ContentError::Invalid(format!("duplicate skill {}", skill.id)));
            }
            catalog.skills.insert(skill.id.clone(), skill);
        }
        for question in questions {
            catalog.check_question(&question)?;
            catalog.questions.insert(question.id.clone(), question);
        }
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> Result<Self, ContentError> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        Self::new(file.skills, file.questions)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ContentError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let catalog = Self::from_json(&raw)?;
        tracing::info!(
            path = %path.display(),
            skills = catalog.skills.len(),
            questions = catalog.questions.len(),
            "content catalog loaded"
        );
        Ok(catalog)
    }

    pub fn skill_count(&self) -> usize {
        self.skills.len()
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    fn check_question(&self, question: &Question) -> Result<(), ContentError> {
        if self.questions.contains_key(&question.id) {
            return Err(ContentError::Invalid(format!("duplicate question {}", question.id)));
        }
        if !(MIN_CHOICES..=MAX_CHOICES).contains(&question.choices.len()) {
            return Err(ContentError::Invalid(format!(
                "question {} has {} choices",
                question.id,
                question.choices.len()
            )));
        }
        if question.answer_idx >= question.choices.len() {
            return Err(ContentError::Invalid(format!(
                "question {} answer index {} out of range",
                question.id, question.answer_idx
            )));
        }
        if !self.skills.contains_key(&question.skill_id) {
            return Err(ContentError::Invalid(format!(
                "question {} references unknown skill {}",
                question.id, question.skill_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentProvider for Catalog {
    async fn question(&self, question_id: &str) -> Option<Question> {
        self.questions.get(question_id).cloned()
    }

    async fn skill(&self, skill_id: &str) -> Option<Skill> {
        self.skills.get(skill_id).cloned()
    }
}
