//! Cross-instance registry: a flat ConfigMap, located through the first
//! `CnvrgInfra`, mapping each app namespace to its app name. The out-of-band
//! infra reconciler reads it.

use std::sync::Arc;

use cnvrg_core::kinds::CONFIG_MAP;
use cnvrg_core::{retry_on_conflict, ObjectKey, StoreResult};
use cnvrg_store::ClusterStore;
use metrics::counter;
use serde_json::{Map, Value as Json};
use tracing::{debug, info};

use crate::defaults::first_infra;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    /// No `CnvrgInfra` installed
    NoInfra,
    /// Registry document missing
    NoDocument(ObjectKey),
    Unchanged,
    Updated,
}

pub struct Registry {
    store: Arc<dyn ClusterStore>,
    retries: usize,
}

impl Registry {
    pub fn new(store: Arc<dyn ClusterStore>, retries: usize) -> Self { Self { store, retries } }

    async fn locate(&self) -> StoreResult<Option<ObjectKey>> {
        Ok(first_infra(self.store.as_ref()).await?.map(|infra| {
            let (name, ns) = infra.registry_document();
            ObjectKey::new(&CONFIG_MAP, Some(&ns), &name)
        }))
    }

    /// Set `namespace → name`, overwriting any previous value.
    pub async fn register(&self, namespace: &str, name: &str) -> StoreResult<RegistryChange> {
        self.mutate("add", |data| {
            let value = Json::String(name.to_string());
            if data.get(namespace) == Some(&value) {
                return false;
            }
            data.insert(namespace.to_string(), value);
            true
        })
        .await
    }

    /// Drop `namespace`; absent keys are a no-op.
    pub async fn unregister(&self, namespace: &str) -> StoreResult<RegistryChange> {
        self.mutate("remove", |data| data.remove(namespace).is_some()).await
    }

    async fn mutate<F>(&self, op: &'static str, edit: F) -> StoreResult<RegistryChange>
    where
        F: Fn(&mut Map<String, Json>) -> bool,
    {
        let Some(key) = self.locate().await? else {
            debug!(op, "no CnvrgInfra, registry skipped");
            return Ok(RegistryChange::NoInfra);
        };
        let edit = &edit;
        let key_ref = &key;
        let change = retry_on_conflict(self.retries, || async move {
            let Some(mut doc) = self.store.get(key_ref).await? else {
                return Ok(RegistryChange::NoDocument(key_ref.clone()));
            };
            let root = match doc.data.as_object_mut() {
                Some(root) => root,
                None => return Ok(RegistryChange::Unchanged),
            };
            let data = root.entry("data").or_insert_with(|| Json::Object(Map::new()));
            if !data.is_object() {
                *data = Json::Object(Map::new());
            }
            let Some(map) = data.as_object_mut() else { return Ok(RegistryChange::Unchanged) };
            if !edit(map) {
                return Ok(RegistryChange::Unchanged);
            }
            self.store.update(&doc).await?;
            Ok(RegistryChange::Updated)
        })
        .await?;
        match &change {
            RegistryChange::NoDocument(k) => info!(op, document = %k, "registry document missing, skipped"),
            RegistryChange::Updated => {
                counter!("registry_update_total", 1u64, "op" => op);
                info!(op, document = %key, "registry updated");
            }
            _ => {}
        }
        Ok(change)
    }
}
