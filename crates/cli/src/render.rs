//! Offline rendering: run the reconciler against an in-memory store and
//! print what it created.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use cnvrg_core::kinds::APP;
use cnvrg_core::ObjectKey;
use cnvrg_reconcile::{Outcome, ReconcileConfig, Reconciler};
use cnvrg_spec::{CnvrgApp, CnvrgInfra, CriType};
use cnvrg_store::{to_dynamic, ClusterStore, MemStore, Verb};
use kube::CustomResourceExt;
use serde_json::Value as Json;

const DEFAULT_NAMESPACE: &str = "cnvrg";
const MAX_PASSES: usize = 5;

pub fn crds() -> Result<String> {
    let mut out = String::new();
    for crd in [CnvrgApp::crd(), CnvrgInfra::crd()] {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&crd)?);
    }
    Ok(out)
}

/// Drop fields only a store would populate.
fn strip_noisy(mut v: Json) -> Json {
    if let Some(meta) = v.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        for f in ["uid", "resourceVersion", "generation", "creationTimestamp", "ownerReferences", "managedFields"] {
            meta.remove(f);
        }
    }
    v
}

pub async fn render(yaml: &str, namespace: Option<&str>, cri: &str) -> Result<String> {
    let mut app: CnvrgApp = serde_yaml::from_str(yaml).context("parsing CnvrgApp YAML")?;
    if let Some(ns) = namespace {
        app.metadata.namespace = Some(ns.to_string());
    }
    let ns = app.metadata.namespace.get_or_insert_with(|| DEFAULT_NAMESPACE.to_string()).clone();
    if app.spec.cri.is_none() {
        app.spec.cri = Some(CriType::from_runtime_version(cri).ok_or_else(|| anyhow!("unknown runtime {cri}"))?);
    }
    app.status = None;
    let name = app.metadata.name.clone().ok_or_else(|| anyhow!("CnvrgApp is missing metadata.name"))?;

    let mem = Arc::new(MemStore::new());
    mem.create(&to_dynamic(&app)?).await?;
    let store: Arc<dyn ClusterStore> = mem.clone();
    let reconciler = Reconciler::new(store, ReconcileConfig::default());
    let key = ObjectKey::new(&APP, Some(&ns), &name);

    let mut settled = false;
    for _ in 0..MAX_PASSES {
        if reconciler.reconcile(&key).await? != Outcome::Requeue {
            settled = true;
            break;
        }
    }
    if !settled {
        return Err(anyhow!("spec did not settle after {MAX_PASSES} passes"));
    }

    let mut out = String::new();
    for w in mem.writes() {
        if w.verb != Verb::Create || w.key.same_kind(&APP) {
            continue;
        }
        if let Some(obj) = w.object {
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(&strip_noisy(serde_json::to_value(obj)?))?);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_YAML: &str = r#"
apiVersion: mlops.cnvrg.io/v1
kind: CnvrgApp
metadata:
  name: cnvrg-app
spec:
  clusterDomain: example.com
  dbs:
    redis:
      enabled: false
"#;

    #[tokio::test]
    async fn render_prints_generated_objects_without_store_fields() {
        let out = render(APP_YAML, Some("demo"), "containerd").await.unwrap();
        assert!(out.contains("kind: Gateway"));
        assert!(out.contains("name: istio-gw-demo"));
        assert!(out.contains("name: cnvrg-db-init"));
        assert!(!out.contains("name: redis-creds"));
        assert!(!out.contains("resourceVersion"));
        assert!(!out.contains("kind: CnvrgApp"));
    }

    #[test]
    fn crds_include_both_kinds() {
        let out = crds().unwrap();
        assert!(out.contains("cnvrgapps.mlops.cnvrg.io"));
        assert!(out.contains("cnvrginfras.mlops.cnvrg.io"));
    }
}
