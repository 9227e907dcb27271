//! JSON manifest builders shared by the generators.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use cnvrg_core::KnownKind;
use cnvrg_core::kinds::{CONFIG_MAP, DEPLOYMENT, PVC, SECRET, SERVICE};
use cnvrg_spec::app::Resources;
use cnvrg_spec::CnvrgApp;
use kube::core::DynamicObject;
use serde_json::{json, Map, Value as Json};

pub type Labels = BTreeMap<String, String>;

pub fn namespace(app: &CnvrgApp) -> Result<&str> {
    app.metadata.namespace.as_deref().ok_or_else(|| anyhow!("CnvrgApp has no namespace"))
}

/// User labels plus the component selector label.
pub fn labels(app: &CnvrgApp, component: &str) -> Labels {
    let mut l = app.spec.labels.clone();
    l.insert("app".into(), component.into());
    l.insert("owner".into(), "cnvrg-control-plane".into());
    l
}

fn ensure_metadata(v: &mut Json, name: &str, ns: Option<&str>, labels: &Labels) -> Result<()> {
    let root = v.as_object_mut().ok_or_else(|| anyhow!("manifest body must be an object"))?;
    let meta = root.entry("metadata").or_insert(Json::Object(Map::new()));
    if let Some(obj) = meta.as_object_mut() {
        obj.insert("name".into(), Json::String(name.to_string()));
        if let Some(ns) = ns { obj.insert("namespace".into(), Json::String(ns.to_string())); }
        if !labels.is_empty() { obj.insert("labels".into(), json!(labels)); }
    }
    Ok(())
}

/// Assemble a full object of `kind` from a body holding everything but
/// apiVersion/kind/metadata.
pub fn object(kind: &KnownKind, ns: &str, name: &str, labels: &Labels, body: Json) -> Result<DynamicObject> {
    let mut v = json!({ "apiVersion": kind.api_version(), "kind": kind.kind });
    if let (Some(dst), Json::Object(src)) = (v.as_object_mut(), body) {
        dst.extend(src);
    }
    ensure_metadata(&mut v, name, kind.namespaced.then_some(ns), labels)?;
    serde_json::from_value(v).with_context(|| format!("building {} {ns}/{name}", kind.kind))
}

/// Requests/limits block; empty quantities are omitted.
pub fn resources(requests: &Resources, limits: &Resources) -> Json {
    fn side(r: &Resources) -> Json {
        let mut m = Map::new();
        if !r.cpu.is_empty() { m.insert("cpu".into(), json!(r.cpu)); }
        if !r.memory.is_empty() { m.insert("memory".into(), json!(r.memory)); }
        Json::Object(m)
    }
    json!({ "requests": side(requests), "limits": side(limits) })
}

/// Pod spec fields common to every workload.
pub fn pod_spec(app: &CnvrgApp, containers: Json, volumes: Json) -> Json {
    let mut spec = json!({ "containers": containers });
    if volumes.as_array().is_some_and(|v| !v.is_empty()) {
        spec["volumes"] = volumes;
    }
    let pc = &app.spec.cnvrg_app_priority_class.name;
    if !pc.is_empty() {
        spec["priorityClassName"] = json!(pc);
    }
    spec
}

pub fn deployment(app: &CnvrgApp, name: &str, labels: &Labels, replicas: i32, pod: Json) -> Result<DynamicObject> {
    let ns = namespace(app)?;
    let selector = json!({ "app": labels.get("app") });
    object(&DEPLOYMENT, ns, name, labels, json!({
        "spec": {
            "replicas": replicas,
            "selector": { "matchLabels": selector },
            "template": {
                "metadata": { "labels": labels, "annotations": app.spec.annotations },
                "spec": pod,
            },
        },
    }))
}

/// Single-replica Deployment with its data volume bound to `claim`.
pub fn volume_deployment(app: &CnvrgApp, name: &str, labels: &Labels, container: Json, claim: &str) -> Result<DynamicObject> {
    let pod = pod_spec(app, json!([container]), json!([claim_volume("data", claim)]));
    let mut d = deployment(app, name, labels, 1, pod)?;
    d.data["spec"]["strategy"] = json!({ "type": "Recreate" });
    Ok(d)
}

pub fn service(app: &CnvrgApp, name: &str, labels: &Labels, port: i32, node_port: bool) -> Result<DynamicObject> {
    let ns = namespace(app)?;
    let svc_type = if node_port { "NodePort" } else { "ClusterIP" };
    object(&SERVICE, ns, name, labels, json!({
        "spec": {
            "type": svc_type,
            "selector": { "app": labels.get("app") },
            "ports": [{ "name": "http", "port": port, "targetPort": port }],
        },
    }))
}

pub fn pvc(app: &CnvrgApp, name: &str, labels: &Labels, size: &str, storage_class: &str) -> Result<DynamicObject> {
    let ns = namespace(app)?;
    let mut spec = json!({
        "accessModes": ["ReadWriteOnce"],
        "resources": { "requests": { "storage": size } },
    });
    if !storage_class.is_empty() {
        spec["storageClassName"] = json!(storage_class);
    }
    object(&PVC, ns, name, labels, json!({ "spec": spec }))
}

pub fn secret(app: &CnvrgApp, name: &str, labels: &Labels, data: BTreeMap<&str, String>) -> Result<DynamicObject> {
    let ns = namespace(app)?;
    object(&SECRET, ns, name, labels, json!({ "type": "Opaque", "stringData": data }))
}

pub fn config_map(app: &CnvrgApp, name: &str, labels: &Labels, data: BTreeMap<&str, String>) -> Result<DynamicObject> {
    let ns = namespace(app)?;
    object(&CONFIG_MAP, ns, name, labels, json!({ "data": data }))
}

pub fn claim_volume(name: &str, claim: &str) -> Json {
    json!({ "name": name, "persistentVolumeClaim": { "claimName": claim } })
}

/// Random credential. Objects are only ever created, so the first value persists.
pub fn random_token() -> String { uuid::Uuid::new_v4().simple().to_string() }

/// `host.clusterDomain`, or bare `host` when no domain is configured.
pub fn fqdn(app: &CnvrgApp, host: &str) -> String {
    if app.spec.cluster_domain.is_empty() { host.to_string() } else { format!("{host}.{}", app.spec.cluster_domain) }
}

pub fn cluster_svc(app: &CnvrgApp, svc: &str) -> Result<String> {
    Ok(format!("{svc}.{}.svc.{}", namespace(app)?, app.spec.cluster_internal_domain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn object_carries_type_and_metadata() {
        let app = testing::app("ns");
        let l = labels(&app, "web");
        let o = object(&CONFIG_MAP, "ns", "cfg", &l, json!({ "data": { "a": "b" } })).unwrap();
        let t = o.types.as_ref().unwrap();
        assert_eq!((t.api_version.as_str(), t.kind.as_str()), ("v1", "ConfigMap"));
        assert_eq!(o.metadata.namespace.as_deref(), Some("ns"));
        assert_eq!(o.metadata.labels.as_ref().unwrap()["app"], "web");
        assert_eq!(o.data["data"]["a"], "b");
    }

    #[test]
    fn empty_quantities_are_omitted() {
        let r = resources(&Resources { cpu: "1".into(), memory: String::new() }, &Resources::default());
        assert_eq!(r, json!({ "requests": { "cpu": "1" }, "limits": {} }));
    }

    #[test]
    fn priority_class_flows_into_pods() {
        let mut app = testing::app("ns");
        assert!(pod_spec(&app, json!([]), json!([])).get("priorityClassName").is_none());
        app.spec.cnvrg_app_priority_class.name = "cnvrg-apps".into();
        assert_eq!(pod_spec(&app, json!([]), json!([]))["priorityClassName"], "cnvrg-apps");
    }

    #[test]
    fn hosts_and_service_addresses() {
        let app = testing::app("team");
        assert_eq!(fqdn(&app, "app"), "app.example.com");
        assert_eq!(cluster_svc(&app, "redis").unwrap(), "redis.team.svc.cluster.local");
    }
}
