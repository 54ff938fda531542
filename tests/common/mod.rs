#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;

use act_practice_engine::config::EngineConfig;
use act_practice_engine::content::{Catalog, Question, Skill, Subject};
use act_practice_engine::db::{MemoryStore, PracticeStore};
use act_practice_engine::services::engine::PracticeEngine;

/// Two math skills in different clusters and one English skill; every
/// question has four choices with canonical answer 2.
pub fn sample_catalog() -> Arc<Catalog> {
    let skills = vec![
        skill("alg.linear", "Linear equations", Subject::Math, "Algebra"),
        skill("geo.triangles", "Triangles", Subject::Math, "Geometry"),
        skill("en.commas", "Commas", Subject::English, "Punctuation"),
    ];
    let questions = [
        ("q-alg-1", "alg.linear"),
        ("q-alg-2", "alg.linear"),
        ("q-geo-1", "geo.triangles"),
        ("q-en-1", "en.commas"),
    ]
    .iter()
    .map(|(id, skill_id)| Question {
        id: id.to_string(),
        skill_id: skill_id.to_string(),
        stem: format!("stem for {id}"),
        choices: vec!["A".into(), "B".into(), "C".into(), "D".into()],
        answer_idx: 2,
        explanation: Some("because".to_string()),
    })
    .collect();

    Arc::new(Catalog::new(skills, questions).expect("sample catalog is valid"))
}

fn skill(id: &str, name: &str, subject: Subject, cluster: &str) -> Skill {
    Skill {
        id: id.to_string(),
        name: name.to_string(),
        subject,
        cluster: cluster.to_string(),
    }
}

pub fn engine_with_store(store: Arc<dyn PracticeStore>) -> Arc<PracticeEngine> {
    Arc::new(PracticeEngine::new(store, sample_catalog(), EngineConfig::default()))
}

pub fn create_test_app_with_store() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let app = act_practice_engine::app(engine_with_store(store.clone()));
    (app, store)
}

pub async fn create_test_app() -> Router {
    create_test_app_with_store().0
}
