#![allow(dead_code)]

use std::sync::Arc;

use cnvrg_core::kinds::{APP, CONFIG_MAP};
use cnvrg_core::ObjectKey;
use cnvrg_reconcile::{Outcome, ReconcileConfig, ReconcileError, Reconciler};
use cnvrg_spec::{CnvrgApp, CnvrgAppSpec, CnvrgInfra, CnvrgInfraSpec, Phase, Status};
use cnvrg_store::{get_as, to_dynamic, ClusterStore, MemStore, Verb};
use kube::core::DynamicObject;
use serde_json::json;

pub const APP_NAME: &str = "cnvrg-app";
pub const INFRA_NS: &str = "cnvrg-infra";
pub const REGISTRY_DOC: &str = "infra-reconciler-cm";

pub fn dynamic(v: serde_json::Value) -> DynamicObject { serde_json::from_value(v).unwrap() }

/// Store with one containerd node.
pub fn store() -> Arc<MemStore> {
    let s = Arc::new(MemStore::new());
    s.insert(dynamic(json!({
        "apiVersion": "v1",
        "kind": "Node",
        "metadata": { "name": "node-1" },
        "status": { "nodeInfo": { "containerRuntimeVersion": "containerd://1.6.8" } },
    })))
    .unwrap();
    s
}

pub fn seed_infra(s: &MemStore, with_document: bool) {
    let infra = CnvrgInfra::new("cnvrg-infra", CnvrgInfraSpec {
        infra_namespace: INFRA_NS.into(),
        infra_reconciler_cm: REGISTRY_DOC.into(),
        ..Default::default()
    });
    s.insert(to_dynamic(&infra).unwrap()).unwrap();
    if with_document {
        s.insert(dynamic(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": REGISTRY_DOC, "namespace": INFRA_NS },
            "data": { "other-ns": "other-app" },
        })))
        .unwrap();
    }
}

pub fn registry_key() -> ObjectKey { ObjectKey::new(&CONFIG_MAP, Some(INFRA_NS), REGISTRY_DOC) }

pub fn registry_data(s: &MemStore) -> serde_json::Value { s.peek(&registry_key()).unwrap().data["data"].clone() }

pub fn app_key(ns: &str) -> ObjectKey { ObjectKey::new(&APP, Some(ns), APP_NAME) }

pub async fn create_app(s: &MemStore, ns: &str, spec: CnvrgAppSpec, finalizers: &[&str]) -> ObjectKey {
    let mut app = CnvrgApp::new(APP_NAME, spec);
    app.metadata.namespace = Some(ns.to_string());
    if !finalizers.is_empty() {
        app.metadata.finalizers = Some(finalizers.iter().map(|f| f.to_string()).collect());
    }
    s.create(&to_dynamic(&app).unwrap()).await.unwrap();
    app_key(ns)
}

pub fn reconciler(s: &Arc<MemStore>) -> Reconciler {
    let store: Arc<dyn ClusterStore> = s.clone();
    Reconciler::new(store, ReconcileConfig::default())
}

/// Reconcile until the pass stops asking for an immediate requeue.
pub async fn drive(r: &Reconciler, key: &ObjectKey) -> Result<Outcome, ReconcileError> {
    for _ in 0..5 {
        match r.reconcile(key).await? {
            Outcome::Requeue => continue,
            other => return Ok(other),
        }
    }
    panic!("pass kept requeueing");
}

pub async fn load(s: &MemStore, key: &ObjectKey) -> Option<CnvrgApp> { get_as::<CnvrgApp>(s, key).await.unwrap() }

pub async fn status(s: &MemStore, key: &ObjectKey) -> Status {
    load(s, key).await.and_then(|a| a.status).unwrap_or_default()
}

/// Phases written to `key`'s status, in order.
pub fn phase_history(s: &MemStore, key: &ObjectKey) -> Vec<Phase> {
    s.writes()
        .into_iter()
        .filter(|w| w.verb == Verb::UpdateStatus && &w.key == key)
        .filter_map(|w| w.object)
        .filter_map(|o| serde_json::from_value::<Status>(o.data["status"].clone()).ok())
        .filter_map(|st| st.status)
        .collect()
}
