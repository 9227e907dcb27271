//! cnvrg store: the narrow Get/List/Create/Update/Delete surface the
//! reconciler uses, backed by the API server ([`KubeStore`]) or by memory
//! ([`MemStore`], used by tests and offline rendering).

#![forbid(unsafe_code)]

use cnvrg_core::{KnownKind, ObjectKey, StoreResult};
use kube::core::DynamicObject;
use serde::{de::DeserializeOwned, Serialize};

mod kube_store;
mod mem;

pub use kube_store::KubeStore;
pub use mem::{Fault, MemStore, Verb, Write};

/// Versioned object store. `update` and `update_status` are conditional on
/// `metadata.resourceVersion` and fail with `StoreError::Conflict` when stale.
#[async_trait::async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<DynamicObject>>;

    /// Objects of `kind`, in the store's listing order.
    async fn list(&self, kind: &KnownKind, namespace: Option<&str>, limit: Option<u32>) -> StoreResult<Vec<DynamicObject>>;

    async fn create(&self, obj: &DynamicObject) -> StoreResult<DynamicObject>;

    /// Replace metadata and spec; status is left as stored.
    async fn update(&self, obj: &DynamicObject) -> StoreResult<DynamicObject>;

    /// Replace only the status block.
    async fn update_status(&self, obj: &DynamicObject) -> StoreResult<DynamicObject>;

    /// Request deletion. With finalizers present this only marks deletion intent.
    async fn delete(&self, key: &ObjectKey) -> StoreResult<()>;
}

/// Convert a typed resource into the store's dynamic representation.
pub fn to_dynamic<K: Serialize>(obj: &K) -> StoreResult<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

pub fn from_dynamic<K: DeserializeOwned>(obj: DynamicObject) -> StoreResult<K> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Typed get; `Ok(None)` when absent.
pub async fn get_as<K: DeserializeOwned>(store: &dyn ClusterStore, key: &ObjectKey) -> StoreResult<Option<K>> {
    match store.get(key).await? {
        Some(obj) => Ok(Some(from_dynamic(obj)?)),
        None => Ok(None),
    }
}

pub async fn list_as<K: DeserializeOwned>(store: &dyn ClusterStore, kind: &KnownKind, namespace: Option<&str>, limit: Option<u32>) -> StoreResult<Vec<K>> {
    store.list(kind, namespace, limit).await?.into_iter().map(from_dynamic).collect()
}
