//! cnvrg core types: object identity, store errors, known kinds and the
//! conflict-retry combinator shared by every writer in the reconciler.

#![forbid(unsafe_code)]

use std::fmt;

use kube::core::{DynamicObject, GroupVersionKind};
use serde::{Deserialize, Serialize};

pub mod kinds;
pub mod retry;

pub use kinds::{Capability, KnownKind, Ownership};
pub use retry::{retry_on_conflict, DEFAULT_CONFLICT_RETRIES};

/// Finalizer token owned by the app reconciler. Foreign tokens are never touched.
pub const APP_FINALIZER: &str = "cnvrgapp.mlops.cnvrg.io/finalizer";

/// Identity of a stored object: group/version/kind plus namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// `None` for cluster-scoped kinds
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: &KnownKind, namespace: Option<&str>, name: &str) -> Self {
        Self {
            group: kind.group.to_string(),
            version: kind.version.to_string(),
            kind: kind.kind.to_string(),
            namespace: namespace.map(|s| s.to_string()),
            name: name.to_string(),
        }
    }

    /// Extract the key from a dynamic object; apiVersion, kind and name are required.
    pub fn from_dynamic(obj: &DynamicObject) -> StoreResult<Self> {
        let types = obj.types.as_ref().ok_or_else(|| StoreError::Invalid("object missing apiVersion/kind".into()))?;
        let name = obj.metadata.name.clone().ok_or_else(|| StoreError::Invalid("object missing metadata.name".into()))?;
        let (group, version) = match types.api_version.split_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), types.api_version.clone()),
        };
        Ok(Self { group, version, kind: types.kind.clone(), namespace: obj.metadata.namespace.clone(), name })
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind { group: self.group.clone(), version: self.version.clone(), kind: self.kind.clone() }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }

    /// Same `v1/Kind` / `group/v1/Kind` shape used across logs and metrics.
    pub fn gvk_key(&self) -> String {
        if self.group.is_empty() {
            format!("{}/{}", self.version, self.kind)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.kind)
        }
    }

    pub fn same_kind(&self, kind: &KnownKind) -> bool {
        self.group == kind.group && self.version == kind.version && self.kind == kind.kind
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.gvk_key(), ns, self.name),
            None => write!(f, "{} {}", self.gvk_key(), self.name),
        }
    }
}

/// Store errors. Conflict and NotFound are distinguishable so callers can
/// retry or treat absence as benign.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("already_exists: {0}")]
    AlreadyExists(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("api ({code}): {message}")]
    Api { code: u16, message: String },
    #[error("transport: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool { matches!(self, StoreError::Conflict(_)) }
    pub fn is_not_found(&self) -> bool { matches!(self, StoreError::NotFound(_)) }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self { StoreError::Invalid(e.to_string()) }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::{ObjectMeta, TypeMeta};

    fn dynamic(api_version: &str, kind: &str, ns: Option<&str>, name: &str) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta { api_version: api_version.into(), kind: kind.into() }),
            metadata: ObjectMeta { name: Some(name.into()), namespace: ns.map(|s| s.into()), ..Default::default() },
            data: serde_json::json!({}),
        }
    }

    #[test]
    fn key_from_dynamic_splits_group_and_version() {
        let k = ObjectKey::from_dynamic(&dynamic("apps/v1", "Deployment", Some("ns"), "app")).unwrap();
        assert_eq!(k.group, "apps");
        assert_eq!(k.version, "v1");
        assert_eq!(k.gvk_key(), "apps/v1/Deployment");
        assert_eq!(k.to_string(), "apps/v1/Deployment ns/app");

        let core = ObjectKey::from_dynamic(&dynamic("v1", "ConfigMap", None, "cm")).unwrap();
        assert_eq!(core.group, "");
        assert_eq!(core.api_version(), "v1");
        assert_eq!(core.gvk_key(), "v1/ConfigMap");
    }

    #[test]
    fn key_from_dynamic_requires_types_and_name() {
        let mut o = dynamic("v1", "ConfigMap", None, "cm");
        o.types = None;
        assert!(matches!(ObjectKey::from_dynamic(&o), Err(StoreError::Invalid(_))));
        let mut o = dynamic("v1", "ConfigMap", None, "cm");
        o.metadata.name = None;
        assert!(matches!(ObjectKey::from_dynamic(&o), Err(StoreError::Invalid(_))));
    }
}
