//! Finalizer lifecycle over ACTIVE → DELETING → GONE. Only our token is ever
//! added or removed; foreign tokens pass through untouched.

use std::sync::Arc;

use cnvrg_core::{retry_on_conflict, StoreResult, APP_FINALIZER};
use cnvrg_spec::CnvrgApp;
use cnvrg_store::{get_as, to_dynamic, ClusterStore};
use kube::ResourceExt;
use tracing::{debug, info};

use crate::context::PassContext;
use crate::error::ReconcileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    Active,
    Deleting,
    Gone,
}

pub fn has_token(app: &CnvrgApp) -> bool { app.finalizers().iter().any(|f| f == APP_FINALIZER) }

pub fn state_of(app: &CnvrgApp) -> FinalizerState {
    if app.metadata.deletion_timestamp.is_some() { FinalizerState::Deleting } else { FinalizerState::Active }
}

pub struct FinalizerLifecycle {
    store: Arc<dyn ClusterStore>,
    retries: usize,
}

impl FinalizerLifecycle {
    pub fn new(store: Arc<dyn ClusterStore>, retries: usize) -> Self { Self { store, retries } }

    /// Add our token to an active resource. Returns whether a write happened.
    pub async fn ensure(&self, ctx: &PassContext) -> Result<bool, ReconcileError> {
        let added = retry_on_conflict(self.retries, || async {
            let Some(mut app) = get_as::<CnvrgApp>(self.store.as_ref(), &ctx.key).await? else { return Ok(false) };
            if has_token(&app) || app.metadata.deletion_timestamp.is_some() {
                return Ok(false);
            }
            app.finalizers_mut().push(APP_FINALIZER.to_string());
            self.store.update(&to_dynamic(&app)?).await?;
            Ok(true)
        })
        .await?;
        if added {
            debug!("finalizer added");
        }
        Ok(added)
    }

    /// Remove our token after cleanup. The final write may race the store
    /// deleting the resource; a failed write followed by absence is success.
    pub async fn release(&self, ctx: &PassContext) -> Result<FinalizerState, ReconcileError> {
        let res: StoreResult<FinalizerState> = retry_on_conflict(self.retries, || async {
            let Some(mut app) = get_as::<CnvrgApp>(self.store.as_ref(), &ctx.key).await? else {
                return Ok(FinalizerState::Gone);
            };
            if !has_token(&app) {
                return Ok(FinalizerState::Deleting);
            }
            app.finalizers_mut().retain(|f| f != APP_FINALIZER);
            let last = app.finalizers().is_empty();
            self.store.update(&to_dynamic(&app)?).await?;
            if last && self.store.get(&ctx.key).await?.is_none() {
                return Ok(FinalizerState::Gone);
            }
            Ok(FinalizerState::Deleting)
        })
        .await;
        match res {
            Ok(state) => {
                info!(?state, "finalizer released");
                Ok(state)
            }
            Err(e) => match self.store.get(&ctx.key).await {
                Ok(None) => {
                    info!(error = %e, "finalizer write failed but resource is gone");
                    Ok(FinalizerState::Gone)
                }
                _ => Err(e.into()),
            },
        }
    }
}
