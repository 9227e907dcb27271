//! Ordered, fail-fast, create-if-absent application of generator output.

use std::sync::Arc;

use cnvrg_core::StoreError;
use cnvrg_generate::{Deployable, Generator};
use cnvrg_spec::CnvrgApp;
use cnvrg_store::ClusterStore;
use kube::Resource;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::error::ReconcileError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub created: usize,
    pub present: usize,
}

pub struct ApplyPipeline {
    store: Arc<dyn ClusterStore>,
    generators: Vec<Box<dyn Generator>>,
}

fn create_err(generator: &str, d: &Deployable, source: StoreError) -> ReconcileError {
    let kind = d.object.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
    let name = d.object.metadata.name.clone().unwrap_or_default();
    ReconcileError::Create { generator: generator.to_string(), kind, name, source }
}

impl ApplyPipeline {
    pub fn new(store: Arc<dyn ClusterStore>, generators: Vec<Box<dyn Generator>>) -> Self { Self { store, generators } }

    pub fn generator_names(&self) -> Vec<&'static str> { self.generators.iter().map(|g| g.name()).collect() }

    /// Run every generator in order against `app` (already holding the
    /// desired spec) and create whatever is absent.
    pub async fn apply(&self, app: &CnvrgApp) -> Result<ApplyReport, ReconcileError> {
        let owner = app
            .controller_owner_ref(&())
            .ok_or_else(|| ReconcileError::Encode("CnvrgApp is missing name or uid".into()))?;
        let mut report = ApplyReport::default();
        for g in &self.generators {
            let deployables = g
                .generate(app)
                .map_err(|e| ReconcileError::Generator { generator: g.name().to_string(), message: format!("{e:#}") })?;
            for mut d in deployables {
                if d.owned {
                    d.object.metadata.owner_references.get_or_insert_with(Vec::new).push(owner.clone());
                }
                let key = d.key().map_err(|e| create_err(g.name(), &d, e))?;
                if self.store.get(&key).await.map_err(|e| create_err(g.name(), &d, e))?.is_some() {
                    report.present += 1;
                    continue;
                }
                match self.store.create(&d.object).await {
                    Ok(_) => {
                        counter!("apply_created_total", 1u64, "generator" => g.name());
                        debug!(generator = g.name(), key = %key, "created");
                        report.created += 1;
                    }
                    // lost a race with another writer; present is what we wanted
                    Err(StoreError::AlreadyExists(_)) => report.present += 1,
                    Err(e) => return Err(create_err(g.name(), &d, e)),
                }
            }
        }
        info!(created = report.created, present = report.present, "apply done");
        Ok(report)
    }

    /// Delete generated objects that owner references will not collect.
    pub async fn cleanup(&self, app: &CnvrgApp) -> Result<usize, ReconcileError> {
        let mut deleted = 0;
        for g in &self.generators {
            let deployables = match g.generate(app) {
                Ok(d) => d,
                Err(e) => {
                    warn!(generator = g.name(), error = %format!("{e:#}"), "generator failed during cleanup, skipped");
                    continue;
                }
            };
            for d in deployables.iter().filter(|d| !d.owned) {
                let key = d.key()?;
                match self.store.delete(&key).await {
                    Ok(()) => {
                        info!(key = %key, "deleted");
                        deleted += 1;
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(ReconcileError::Cleanup(format!("{key}: {e}"))),
                }
            }
        }
        Ok(deleted)
    }
}
