use std::sync::Arc;
use std::time::Duration;

use cnvrg_core::ObjectKey;
use cnvrg_generate::{default_generators, Generator};
use cnvrg_spec::{CnvrgApp, Phase};
use cnvrg_store::{get_as, ClusterStore};
use metrics::{counter, histogram};
use tracing::{info, warn, Instrument};

use crate::config::ReconcileConfig;
use crate::context::PassContext;
use crate::defaults::{DefaultsMerger, SyncOutcome};
use crate::error::ReconcileError;
use crate::finalizer::{has_token, state_of, FinalizerLifecycle, FinalizerState};
use crate::pipeline::ApplyPipeline;
use crate::registry::Registry;
use crate::status::StatusWriter;

pub const MSG_RECONCILING: &str = "reconciling";
pub const MSG_HEALTHY: &str = "successfully reconciled";
pub const MSG_REMOVING: &str = "removing cnvrg app";

/// What the scheduler should do with the key after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Requeue,
    RequeueAfter(Duration),
}

pub struct Reconciler {
    store: Arc<dyn ClusterStore>,
    cfg: ReconcileConfig,
    merger: DefaultsMerger,
    finalizer: FinalizerLifecycle,
    status: StatusWriter,
    pipeline: ApplyPipeline,
    registry: Registry,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ClusterStore>, cfg: ReconcileConfig) -> Self {
        Self::with_generators(store, cfg, default_generators())
    }

    pub fn with_generators(store: Arc<dyn ClusterStore>, cfg: ReconcileConfig, generators: Vec<Box<dyn Generator>>) -> Self {
        let retries = cfg.conflict_retries;
        Self {
            merger: DefaultsMerger::new(store.clone()),
            finalizer: FinalizerLifecycle::new(store.clone(), retries),
            status: StatusWriter::new(store.clone(), retries),
            pipeline: ApplyPipeline::new(store.clone(), generators),
            registry: Registry::new(store.clone(), retries),
            store,
            cfg,
        }
    }

    pub fn config(&self) -> &ReconcileConfig { &self.cfg }

    pub fn merger(&self) -> &DefaultsMerger { &self.merger }

    pub fn pipeline(&self) -> &ApplyPipeline { &self.pipeline }

    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome, ReconcileError> {
        let ctx = PassContext::new(key);
        let span = ctx.span.clone();
        let res = self.pass(&ctx).instrument(span.clone()).await;
        histogram!("reconcile_latency_ms", ctx.elapsed_ms());
        counter!("reconcile_total", 1u64);
        span.in_scope(|| match &res {
            Ok(outcome) => info!(?outcome, ms = ctx.elapsed_ms() as u64, "pass done"),
            Err(e) => {
                counter!("reconcile_errors_total", 1u64);
                warn!(error = %e, "pass failed");
            }
        });
        res
    }

    async fn pass(&self, ctx: &PassContext) -> Result<Outcome, ReconcileError> {
        match self.merger.sync(ctx).await {
            Ok(SyncOutcome::Aligned) => {}
            Ok(SyncOutcome::Requeue) => return Ok(Outcome::Requeue),
            Ok(SyncOutcome::Gone) => return Ok(Outcome::Done),
            Err(e) => return Err(self.fail(ctx, e).await),
        }

        let app = match get_as::<CnvrgApp>(self.store.as_ref(), &ctx.key).await {
            Ok(Some(app)) => app,
            Ok(None) => {
                info!("resource gone after sync");
                return Ok(Outcome::Done);
            }
            Err(e) => return Err(self.fail(ctx, e.into()).await),
        };

        if state_of(&app) == FinalizerState::Deleting {
            return self.teardown(ctx, &app).await;
        }
        if let Err(e) = self.finalizer.ensure(ctx).await {
            return Err(self.fail(ctx, e).await);
        }

        self.status.set(ctx, Phase::Reconciling, MSG_RECONCILING).await;
        if let Err(e) = self.pipeline.apply(&app).await {
            return Err(self.fail(ctx, e).await);
        }

        let outcome = match self.registry.register(ctx.namespace(), &ctx.key.name).await {
            Ok(_) => Outcome::Done,
            Err(e) => {
                warn!(error = %e, "registry add failed, will retry");
                Outcome::RequeueAfter(self.cfg.registry_retry)
            }
        };
        self.status.set(ctx, Phase::Healthy, MSG_HEALTHY).await;
        Ok(outcome)
    }

    /// Surface `err` on the status before handing it back.
    async fn fail(&self, ctx: &PassContext, err: ReconcileError) -> ReconcileError {
        self.status.set(ctx, Phase::Error, &err.to_string()).await;
        err
    }

    /// Deletion requested: REMOVING, cleanup, unregister, release our token.
    async fn teardown(&self, ctx: &PassContext, app: &CnvrgApp) -> Result<Outcome, ReconcileError> {
        if !has_token(app) {
            return Ok(Outcome::Done);
        }
        self.status.set(ctx, Phase::Removing, MSG_REMOVING).await;
        let deleted = self.pipeline.cleanup(app).await?;
        self.registry.unregister(ctx.namespace()).await?;
        let state = self.finalizer.release(ctx).await?;
        info!(deleted, ?state, "teardown complete");
        Ok(Outcome::Done)
    }
}
