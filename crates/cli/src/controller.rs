use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cnvrg_core::kinds::APP;
use cnvrg_core::ObjectKey;
use cnvrg_reconcile::{Outcome, ReconcileConfig, ReconcileError, Reconciler};
use cnvrg_spec::CnvrgApp;
use cnvrg_store::{ClusterStore, KubeStore};
use futures::StreamExt;
use kube::{
    api::Api,
    core::{DynamicObject, GroupVersionKind},
    runtime::{
        controller::{Action, Controller},
        predicates, reflector, watcher, WatchStreamExt,
    },
    Client, ResourceExt,
};
use tracing::{debug, info, warn};

use crate::leader::{LeaderElector, LeaseConfig};

struct Ctx {
    reconciler: Reconciler,
    error_requeue: Duration,
}

fn action_for(outcome: Outcome) -> Action {
    match outcome {
        Outcome::Done => Action::await_change(),
        Outcome::Requeue => Action::requeue(Duration::ZERO),
        Outcome::RequeueAfter(d) => Action::requeue(d),
    }
}

async fn reconcile(app: Arc<CnvrgApp>, ctx: Arc<Ctx>) -> Result<Action, ReconcileError> {
    let key = ObjectKey::new(&APP, app.namespace().as_deref(), &app.name_any());
    ctx.reconciler.reconcile(&key).await.map(action_for)
}

fn error_policy(app: Arc<CnvrgApp>, err: &ReconcileError, ctx: Arc<Ctx>) -> Action {
    warn!(name = %app.name_any(), ns = ?app.namespace(), error = %err, "reconcile failed; requeueing");
    Action::requeue(ctx.error_requeue)
}

pub async fn run(cfg: ReconcileConfig, lease: Option<LeaseConfig>) -> Result<()> {
    let client = Client::try_default().await?;
    let elector = lease.map(|l| LeaderElector::new(client.clone(), l));
    if let Some(elector) = &elector {
        elector.acquire().await;
    }
    let store: Arc<dyn ClusterStore> = Arc::new(KubeStore::new(client.clone()));
    let ownership = cfg.ownership;
    let ctx = Arc::new(Ctx { error_requeue: cfg.error_requeue, reconciler: Reconciler::new(store, cfg) });

    // status-only writes do not bump generation, so they never retrigger a pass
    let apps: Api<CnvrgApp> = Api::all(client.clone());
    let (reader, writer) = reflector::store();
    let trigger = reflector(writer, watcher(apps, watcher::Config::default()))
        .applied_objects()
        .predicate_filter(predicates::generation);
    let mut controller = Controller::for_stream(trigger, reader);

    for kind in ownership.owned_kinds() {
        let gvk = GroupVersionKind::gvk(kind.group, kind.version, kind.kind);
        match kube::discovery::pinned_kind(&client, &gvk).await {
            Ok((ar, _caps)) => {
                let api = Api::<DynamicObject>::all_with(client.clone(), &ar);
                controller = controller.owns_with(api, ar, watcher::Config::default());
                debug!(kind = kind.kind, "watching owned kind");
            }
            Err(e) => warn!(group = kind.group, kind = kind.kind, error = %e, "owned kind not served; not watching"),
        }
    }

    info!(?ownership, "controller started");
    let running = controller.shutdown_on_signal().run(reconcile, error_policy, ctx).for_each(|res| async move {
        match res {
            Ok((obj, _)) => debug!(name = %obj.name, ns = ?obj.namespace, "reconciled"),
            Err(e) => debug!(error = %e, "controller event"),
        }
    });
    match &elector {
        Some(elector) => tokio::select! {
            _ = running => {}
            lost = elector.hold() => lost?,
        },
        None => running.await,
    }
    info!("controller stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_actions() {
        assert_eq!(action_for(Outcome::Done), Action::await_change());
        assert_eq!(action_for(Outcome::Requeue), Action::requeue(Duration::ZERO));
        assert_eq!(action_for(Outcome::RequeueAfter(Duration::from_secs(30))), Action::requeue(Duration::from_secs(30)));
    }
}
