pub mod engine;
pub mod mastery;
pub mod review;
pub mod scoring;
pub mod shuffle;
pub mod weak_areas;

use std::future::Future;

use crate::config::RetryPolicy;
use crate::error::{EngineError, EngineResult};

/// Runs one read-compute-conditional-write round until it lands, retrying
/// conflicts and unavailable-store failures up to `policy.max_attempts` times.
/// Each round must re-read, so a retry never writes a value computed from a
/// stale version.
pub(crate) async fn with_retries<T, F, Fut>(policy: &RetryPolicy, key: &str, mut op: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                tracing::warn!(key, attempt, error = %err, "write failed, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(err) if err.is_retryable() => {
                tracing::error!(key, attempts = attempt, error = %err, "giving up on write");
                return Err(EngineError::RecordingFailed {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            Err(err) => return Err(err),
        }
    }
}
