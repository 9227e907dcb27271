//! `CnvrgInfra`: cluster-wide infrastructure resource, reconciled out of band.
//! The app reconciler only reads it (registry location, inherited defaults).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::app::{CriType, PriorityClass};
use crate::status::Status;

pub const DEFAULT_INFRA_NAMESPACE: &str = "cnvrg-infra";
pub const DEFAULT_REGISTRY_DOCUMENT: &str = "infra-reconciler-cm";

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(group = "mlops.cnvrg.io", version = "v1", kind = "CnvrgInfra", status = "Status", shortname = "cinfra")]
#[serde(rename_all = "camelCase", default)]
pub struct CnvrgInfraSpec {
    pub infra_namespace: String,
    /// ConfigMap listing app instances for the infra reconciler
    pub infra_reconciler_cm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cri: Option<CriType>,
    pub cluster_internal_domain: String,
    pub cnvrg_app_priority_class: PriorityClass,
    pub cnvrg_job_priority_class: PriorityClass,
}

impl CnvrgInfraSpec {
    /// `(name, namespace)` of the shared registry document.
    pub fn registry_document(&self) -> (String, String) {
        let name = if self.infra_reconciler_cm.is_empty() { DEFAULT_REGISTRY_DOCUMENT } else { self.infra_reconciler_cm.as_str() };
        let ns = if self.infra_namespace.is_empty() { DEFAULT_INFRA_NAMESPACE } else { self.infra_namespace.as_str() };
        (name.to_string(), ns.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_document_falls_back_to_defaults() {
        let spec = CnvrgInfraSpec::default();
        assert_eq!(spec.registry_document(), ("infra-reconciler-cm".to_string(), "cnvrg-infra".to_string()));
        let spec = CnvrgInfraSpec { infra_namespace: "infra".into(), infra_reconciler_cm: "apps".into(), ..Default::default() };
        assert_eq!(spec.registry_document(), ("apps".to_string(), "infra".to_string()));
    }
}
