pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod logging;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;

use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::content::{Catalog, ContentError, ContentProvider};
use crate::db::config::DbConfig;
use crate::db::DbInitError;
use crate::services::engine::PracticeEngine;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Db(#[from] DbInitError),
    #[error(transparent)]
    Content(#[from] ContentError),
}

/// Store and content from the environment, wired into an engine.
pub async fn build_engine(config: &Config) -> Result<Arc<PracticeEngine>, InitError> {
    let db_config = DbConfig::from_env().map_err(DbInitError::from)?;
    let store = db::connect_from_config(&db_config).await?;

    let content: Arc<dyn ContentProvider> = match &config.content_path {
        Some(path) => Arc::new(Catalog::load(path).await?),
        None => {
            tracing::warn!("CONTENT_PATH not set, serving an empty catalog");
            Arc::new(Catalog::default())
        }
    };

    Ok(Arc::new(PracticeEngine::new(store, content, config.engine.clone())))
}

pub fn app(engine: Arc<PracticeEngine>) -> axum::Router {
    routes::router(AppState::new(engine))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn create_app() -> Result<axum::Router, InitError> {
    let config = Config::from_env();
    Ok(app(build_engine(&config).await?))
}
