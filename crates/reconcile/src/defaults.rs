//! Desired-spec computation against the live cluster and the sync step that
//! writes corrections back onto the stored resource.

use std::sync::Arc;

use cnvrg_core::kinds::{INFRA, NODE};
use cnvrg_core::{StoreError, StoreResult};
use cnvrg_spec::{desired_spec, CnvrgApp, CnvrgAppSpec, CnvrgInfra, CnvrgInfraSpec, CriType, DefaultsError, Facts};
use cnvrg_store::{get_as, list_as, to_dynamic, ClusterStore};
use tracing::{debug, info};

use crate::context::PassContext;
use crate::error::ReconcileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Stored spec already equals the desired spec
    Aligned,
    /// A correction was written, or the write lost a version race
    Requeue,
    /// Resource no longer exists
    Gone,
}

pub struct DefaultsMerger {
    store: Arc<dyn ClusterStore>,
}

/// Runtime reported by one sampled node.
async fn detect_runtime(store: &dyn ClusterStore) -> Result<CriType, DefaultsError> {
    let nodes = store.list(&NODE, None, Some(1)).await.map_err(|e| DefaultsError::UnknownRuntime(format!("listing nodes: {e}")))?;
    let node = nodes.into_iter().next().ok_or_else(|| DefaultsError::UnknownRuntime("no nodes found".into()))?;
    let version = node
        .data
        .pointer("/status/nodeInfo/containerRuntimeVersion")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    CriType::from_runtime_version(&version).ok_or(DefaultsError::UnknownRuntime(version))
}

/// First `CnvrgInfra` in listing order. An unserved kind means no infra.
pub(crate) async fn first_infra(store: &dyn ClusterStore) -> StoreResult<Option<CnvrgInfraSpec>> {
    match list_as::<CnvrgInfra>(store, &INFRA, None, Some(1)).await {
        Ok(list) => Ok(list.into_iter().next().map(|i| i.spec)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

impl DefaultsMerger {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self { Self { store } }

    pub async fn compute_desired(&self, app: &CnvrgApp) -> Result<CnvrgAppSpec, ReconcileError> {
        let infra = first_infra(self.store.as_ref()).await?;
        let known = app.spec.cri.or_else(|| infra.as_ref().and_then(|i| i.cri));
        let cri = match known {
            Some(_) => None,
            None => Some(detect_runtime(self.store.as_ref()).await?),
        };
        let ns = app.metadata.namespace.as_deref().unwrap_or_default();
        let facts = Facts { namespace: ns, cri, infra: infra.as_ref() };
        Ok(desired_spec(&app.spec, &facts)?)
    }

    pub async fn sync(&self, ctx: &PassContext) -> Result<SyncOutcome, ReconcileError> {
        let Some(app) = get_as::<CnvrgApp>(self.store.as_ref(), &ctx.key).await? else {
            return Ok(SyncOutcome::Gone);
        };
        // spec is frozen once deletion has been requested
        if app.metadata.deletion_timestamp.is_some() {
            return Ok(SyncOutcome::Aligned);
        }
        let desired = self.compute_desired(&app).await?;
        if desired == app.spec {
            return Ok(SyncOutcome::Aligned);
        }
        let mut corrected = app;
        corrected.spec = desired;
        let obj = to_dynamic(&corrected)?;
        match self.store.update(&obj).await {
            Ok(stored) => {
                info!(rv = ?stored.metadata.resource_version, "desired spec written");
                Ok(SyncOutcome::Requeue)
            }
            Err(e) if e.is_conflict() => {
                debug!(error = %e, "spec write conflict");
                Ok(SyncOutcome::Requeue)
            }
            Err(e) if e.is_not_found() => Ok(SyncOutcome::Gone),
            Err(e) => Err(e.into()),
        }
    }
}
