use std::sync::Arc;
use std::time::Instant;

use crate::services::engine::PracticeEngine;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    engine: Arc<PracticeEngine>,
}

impl AppState {
    pub fn new(engine: Arc<PracticeEngine>) -> Self {
        Self {
            started_at: Instant::now(),
            engine,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn engine(&self) -> Arc<PracticeEngine> {
        Arc::clone(&self.engine)
    }
}
