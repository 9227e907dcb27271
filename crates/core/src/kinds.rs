//! Capability table of every kind the reconciler reads, creates or watches.
//!
//! Owned kinds carry a [`Capability`]; the operator only watches kinds whose
//! capability is enabled by its [`Ownership`] flags.

use serde::{Deserialize, Serialize};

/// Optional platform integration a kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Core,
    Istio,
    OpenShift,
    Prometheus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KnownKind {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub namespaced: bool,
    pub capability: Capability,
}

impl KnownKind {
    const fn core(group: &'static str, version: &'static str, kind: &'static str) -> Self {
        Self { group, version, kind, namespaced: true, capability: Capability::Core }
    }

    const fn with(group: &'static str, version: &'static str, kind: &'static str, capability: Capability) -> Self {
        Self { group, version, kind, namespaced: true, capability }
    }

    const fn cluster(group: &'static str, version: &'static str, kind: &'static str) -> Self {
        Self { group, version, kind, namespaced: false, capability: Capability::Core }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.to_string() } else { format!("{}/{}", self.group, self.version) }
    }
}

pub const APP: KnownKind = KnownKind::core("mlops.cnvrg.io", "v1", "CnvrgApp");
pub const INFRA: KnownKind = KnownKind::cluster("mlops.cnvrg.io", "v1", "CnvrgInfra");
pub const NODE: KnownKind = KnownKind::cluster("", "v1", "Node");

pub const CONFIG_MAP: KnownKind = KnownKind::core("", "v1", "ConfigMap");
pub const SECRET: KnownKind = KnownKind::core("", "v1", "Secret");
pub const SERVICE: KnownKind = KnownKind::core("", "v1", "Service");
pub const PVC: KnownKind = KnownKind::core("", "v1", "PersistentVolumeClaim");
pub const DEPLOYMENT: KnownKind = KnownKind::core("apps", "v1", "Deployment");
pub const STATEFUL_SET: KnownKind = KnownKind::core("apps", "v1", "StatefulSet");
pub const DAEMON_SET: KnownKind = KnownKind::core("apps", "v1", "DaemonSet");
pub const INGRESS: KnownKind = KnownKind::core("networking.k8s.io", "v1", "Ingress");
pub const GATEWAY: KnownKind = KnownKind::with("networking.istio.io", "v1beta1", "Gateway", Capability::Istio);
pub const VIRTUAL_SERVICE: KnownKind = KnownKind::with("networking.istio.io", "v1beta1", "VirtualService", Capability::Istio);
pub const ROUTE: KnownKind = KnownKind::with("route.openshift.io", "v1", "Route", Capability::OpenShift);
pub const SERVICE_MONITOR: KnownKind = KnownKind::with("monitoring.coreos.com", "v1", "ServiceMonitor", Capability::Prometheus);

/// Every kind a generator may emit.
pub const OWNED: &[KnownKind] = &[
    CONFIG_MAP,
    SECRET,
    SERVICE,
    PVC,
    DEPLOYMENT,
    STATEFUL_SET,
    DAEMON_SET,
    INGRESS,
    GATEWAY,
    VIRTUAL_SERVICE,
    ROUTE,
    SERVICE_MONITOR,
];

/// Which optional integrations the operator owns (watches for drift).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub istio: bool,
    pub openshift: bool,
    pub prometheus: bool,
}

impl Default for Ownership {
    fn default() -> Self { Self { istio: true, openshift: false, prometheus: true } }
}

impl Ownership {
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Core => true,
            Capability::Istio => self.istio,
            Capability::OpenShift => self.openshift,
            Capability::Prometheus => self.prometheus,
        }
    }

    pub fn owned_kinds(&self) -> impl Iterator<Item = &'static KnownKind> + '_ {
        OWNED.iter().filter(move |k| self.allows(k.capability))
    }
}
