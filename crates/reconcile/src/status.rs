//! Status state machine. REMOVING is terminal: once stored, no later write
//! from here changes phase or message.

use std::sync::Arc;

use cnvrg_core::{retry_on_conflict, StoreResult};
use cnvrg_spec::{CnvrgApp, Phase, Status};
use cnvrg_store::{get_as, to_dynamic, ClusterStore};
use metrics::counter;
use tracing::{debug, warn};

use crate::context::PassContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWrite {
    Written,
    /// Stored status already matched
    Unchanged,
    /// Stored phase is REMOVING
    Terminal,
    /// Resource is gone
    Missing,
    /// Non-conflict failure or retries exhausted; logged and swallowed
    Failed,
}

pub struct StatusWriter {
    store: Arc<dyn ClusterStore>,
    retries: usize,
}

impl StatusWriter {
    pub fn new(store: Arc<dyn ClusterStore>, retries: usize) -> Self { Self { store, retries } }

    /// Read-modify-write `phase`/`message`; progress is left as stored.
    pub async fn set(&self, ctx: &PassContext, phase: Phase, message: &str) -> StatusWrite {
        let res = retry_on_conflict(self.retries, || self.attempt(ctx, phase, message)).await;
        match res {
            Ok(outcome) => {
                if outcome != StatusWrite::Written {
                    counter!("status_write_skipped_total", 1u64);
                }
                debug!(phase = phase.as_str(), ?outcome, "status");
                outcome
            }
            Err(e) => {
                warn!(phase = phase.as_str(), error = %e, "status write failed");
                StatusWrite::Failed
            }
        }
    }

    async fn attempt(&self, ctx: &PassContext, phase: Phase, message: &str) -> StoreResult<StatusWrite> {
        let Some(mut app) = get_as::<CnvrgApp>(self.store.as_ref(), &ctx.key).await? else {
            return Ok(StatusWrite::Missing);
        };
        let current = app.status.clone().unwrap_or_default();
        if current.status == Some(phase) && current.message == message {
            return Ok(StatusWrite::Unchanged);
        }
        if current.is_removing() {
            return Ok(StatusWrite::Terminal);
        }
        app.status = Some(Status { status: Some(phase), message: message.to_string(), progress: current.progress });
        self.store.update_status(&to_dynamic(&app)?).await?;
        Ok(StatusWrite::Written)
    }
}
