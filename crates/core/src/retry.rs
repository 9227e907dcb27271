//! Bounded optimistic-concurrency retry.

use std::future::Future;

use tracing::debug;

use crate::{StoreError, StoreResult};

/// Attempts used by status and registry writers when nothing else is configured.
pub const DEFAULT_CONFLICT_RETRIES: usize = 5;

/// Run `op` until it succeeds, fails with a non-conflict error, or `attempts`
/// conflicts have been seen. Each attempt must re-read what it writes.
pub async fn retry_on_conflict<T, F, Fut>(attempts: usize, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let attempts = attempts.max(1);
    let mut last = StoreError::Conflict("no attempt made".into());
    for attempt in 1..=attempts {
        match op().await {
            Err(e) if e.is_conflict() => {
                debug!(attempt, attempts, error = %e, "write conflict");
                last = e;
            }
            other => return other,
        }
    }
    Err(last)
}
