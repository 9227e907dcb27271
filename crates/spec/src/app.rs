//! `CnvrgApp` custom resource: one application stack per namespace.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::merge_fields;
use crate::status::Status;

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "mlops.cnvrg.io",
    version = "v1",
    kind = "CnvrgApp",
    namespaced,
    status = "Status",
    shortname = "cap",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Message","type":"string","jsonPath":".status.message"}"#
)]
#[serde(rename_all = "camelCase", default)]
pub struct CnvrgAppSpec {
    /// Public domain the control plane is exposed on
    pub cluster_domain: String,
    pub cluster_internal_domain: String,
    /// Container runtime; auto-detected from a node when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cri: Option<CriType>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub control_plane: ControlPlane,
    pub logging: Logging,
    pub dbs: Dbs,
    pub networking: Networking,
    pub sso: Sso,
    pub monitoring: Monitoring,
    pub cnvrg_app_priority_class: PriorityClass,
    pub cnvrg_job_priority_class: PriorityClass,
}

merge_fields!(CnvrgAppSpec {
    cluster_domain,
    cluster_internal_domain,
    cri,
    labels,
    annotations,
    control_plane,
    logging,
    dbs,
    networking,
    sso,
    monitoring,
    cnvrg_app_priority_class,
    cnvrg_job_priority_class,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CriType {
    #[serde(rename = "containerd")]
    Containerd,
    #[serde(rename = "cri-o")]
    Crio,
    #[serde(rename = "docker")]
    Docker,
}

impl CriType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriType::Containerd => "containerd",
            CriType::Crio => "cri-o",
            CriType::Docker => "docker",
        }
    }

    /// Recognize a node's `status.nodeInfo.containerRuntimeVersion`, e.g. `containerd://1.6.8`.
    pub fn from_runtime_version(version: &str) -> Option<Self> {
        [CriType::Containerd, CriType::Crio, CriType::Docker]
            .into_iter()
            .find(|c| version.contains(c.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Resources {
    pub cpu: String,
    pub memory: String,
}
merge_fields!(Resources { cpu, memory });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlPlane {
    pub image: String,
    pub webapp: Webapp,
    pub sidekiq: Sidekiq,
}
merge_fields!(ControlPlane { image, webapp, sidekiq });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Webapp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    pub replicas: i32,
    pub port: i32,
    pub svc_name: String,
    pub requests: Resources,
    pub limits: Resources,
}
merge_fields!(Webapp { enabled, replicas, port, svc_name, requests, limits });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Sidekiq {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    pub replicas: i32,
    pub requests: Resources,
    pub limits: Resources,
}
merge_fields!(Sidekiq { enabled, replicas, requests, limits });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Logging {
    pub fluentbit: Fluentbit,
}
merge_fields!(Logging { fluentbit });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Fluentbit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    pub image: String,
}
merge_fields!(Fluentbit { enabled, image });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Dbs {
    pub pg: Pg,
    pub redis: Backing,
    pub minio: Backing,
    pub es: Es,
    pub cvat: Cvat,
}
merge_fields!(Dbs { pg, redis, minio, es, cvat });

/// Shared shape of the stateful backing services (redis, minio).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Backing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    pub image: String,
    pub port: i32,
    pub svc_name: String,
    pub storage_size: String,
    pub storage_class: String,
    pub creds_ref: String,
    pub requests: Resources,
    pub limits: Resources,
}
merge_fields!(Backing { enabled, image, port, svc_name, storage_size, storage_class, creds_ref, requests, limits });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Pg {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    pub image: String,
    pub port: i32,
    pub svc_name: String,
    pub storage_size: String,
    pub storage_class: String,
    pub creds_ref: String,
    pub max_connections: i32,
    pub requests: Resources,
    pub limits: Resources,
}
merge_fields!(Pg { enabled, image, port, svc_name, storage_size, storage_class, creds_ref, max_connections, requests, limits });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Es {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    pub image: String,
    pub port: i32,
    pub svc_name: String,
    pub storage_size: String,
    pub storage_class: String,
    /// JVM heap flags; derived from `requests.memory` when empty
    pub java_opts: String,
    pub requests: Resources,
    pub limits: Resources,
}
merge_fields!(Es { enabled, image, port, svc_name, storage_size, storage_class, java_opts, requests, limits });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Cvat {
    pub enabled: bool,
    pub pg: Toggle,
    pub redis: Toggle,
}
merge_fields!(Cvat { enabled, pg, redis });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Toggle {
    pub enabled: bool,
}
merge_fields!(Toggle { enabled });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Networking {
    pub ingress: Ingress,
    pub https: Https,
    pub proxy: Proxy,
}
merge_fields!(Networking { ingress, https, proxy });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum IngressType {
    Istio,
    Ingress,
    Openshift,
    NodePort,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Ingress {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ingress_type: Option<IngressType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub istio_gw_enabled: Option<bool>,
    pub istio_gw_name: String,
    pub timeout: String,
}
merge_fields!(Ingress { ingress_type, istio_gw_enabled, istio_gw_name, timeout });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Https {
    pub enabled: bool,
    pub cert_secret: String,
}
merge_fields!(Https { enabled, cert_secret });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Proxy {
    pub enabled: bool,
    pub config_ref: String,
    pub http_proxy: Vec<String>,
    pub https_proxy: Vec<String>,
    pub no_proxy: Vec<String>,
}
merge_fields!(Proxy { enabled, config_ref, http_proxy, https_proxy, no_proxy });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Sso {
    pub enabled: bool,
    pub pki: Pki,
}
merge_fields!(Sso { enabled, pki });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Pki {
    pub enabled: bool,
    pub private_key_secret: String,
    pub public_key_secret: String,
    pub root_ca_secret: String,
}
merge_fields!(Pki { enabled, private_key_secret, public_key_secret, root_ca_secret });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Monitoring {
    pub enabled: bool,
}
merge_fields!(Monitoring { enabled });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PriorityClass {
    pub name: String,
    pub value: i32,
    pub description: String,
}
merge_fields!(PriorityClass { name, value, description });

/// True unless explicitly disabled.
pub fn enabled(toggle: Option<bool>) -> bool { toggle.unwrap_or(true) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cri_is_recognized_from_runtime_version() {
        assert_eq!(CriType::from_runtime_version("containerd://1.6.8"), Some(CriType::Containerd));
        assert_eq!(CriType::from_runtime_version("cri-o://1.24.1"), Some(CriType::Crio));
        assert_eq!(CriType::from_runtime_version("docker://20.10.7"), Some(CriType::Docker));
        assert_eq!(CriType::from_runtime_version("rkt://1.0"), None);
    }

    #[test]
    fn partial_spec_deserializes_with_unset_fields() {
        let spec: CnvrgAppSpec = serde_json::from_value(serde_json::json!({
            "networking": { "proxy": { "enabled": true, "noProxy": ["example.com"] }, "ingress": { "type": "nodeport" } },
            "cri": "cri-o"
        }))
        .unwrap();
        assert!(spec.networking.proxy.enabled);
        assert_eq!(spec.networking.proxy.no_proxy, vec!["example.com".to_string()]);
        assert_eq!(spec.networking.ingress.ingress_type, Some(IngressType::NodePort));
        assert_eq!(spec.cri, Some(CriType::Crio));
        assert_eq!(spec.dbs.pg.enabled, None);
        assert_eq!(spec.control_plane.webapp.port, 0);
    }

    #[test]
    fn spec_round_trips_through_json() {
        let mut spec = CnvrgAppSpec::default();
        spec.dbs.redis.enabled = Some(false);
        spec.labels.insert("owner".into(), "ml".into());
        let back: CnvrgAppSpec = serde_json::from_value(serde_json::to_value(&spec).unwrap()).unwrap();
        assert_eq!(back, spec);
    }
}
