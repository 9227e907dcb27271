use cnvrg_core::{KnownKind, ObjectKey, StoreError, StoreResult};
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{Discovery, Scope},
    Client,
};
use metrics::counter;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::ClusterStore;

/// API-server backed store. Resolved resources are cached per GVK.
pub struct KubeStore {
    client: Client,
    resources: RwLock<FxHashMap<GroupVersionKind, (ApiResource, bool)>>,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client, resources: RwLock::new(FxHashMap::default()) }
    }

    pub async fn try_default() -> anyhow::Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }

    pub fn client(&self) -> &Client { &self.client }

    async fn resolve(&self, gvk: &GroupVersionKind) -> StoreResult<(ApiResource, bool)> {
        if let Some(hit) = self.resources.read().await.get(gvk) {
            return Ok(hit.clone());
        }
        let found = find_api_resource(self.client.clone(), gvk).await?;
        self.resources.write().await.insert(gvk.clone(), found.clone());
        Ok(found)
    }

    async fn api(&self, gvk: &GroupVersionKind, namespace: Option<&str>) -> StoreResult<Api<DynamicObject>> {
        let (ar, namespaced) = self.resolve(gvk).await?;
        Ok(if namespaced {
            match namespace {
                Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
                None => Api::all_with(self.client.clone(), &ar),
            }
        } else {
            Api::all_with(self.client.clone(), &ar)
        })
    }

    async fn api_for(&self, obj: &DynamicObject) -> StoreResult<(Api<DynamicObject>, ObjectKey)> {
        let key = ObjectKey::from_dynamic(obj)?;
        let api = self.api(&key.gvk(), key.namespace.as_deref()).await?;
        Ok((api, key))
    }
}

async fn find_api_resource(client: Client, gvk: &GroupVersionKind) -> StoreResult<(ApiResource, bool)> {
    let discovery = Discovery::new(client).filter(&[gvk.group.as_str()]).run().await.map_err(map_kube_err)?;
    for group in discovery.groups() {
        for (ar, caps) in group.recommended_resources() {
            if ar.group == gvk.group && ar.version == gvk.version && ar.kind == gvk.kind {
                let namespaced = matches!(caps.scope, Scope::Namespaced);
                return Ok((ar, namespaced));
            }
        }
    }
    Err(StoreError::NotFound(format!("kind not served: {}/{}/{}", gvk.group, gvk.version, gvk.kind)))
}

/// Map API server errors onto the store's taxonomy.
pub(crate) fn map_kube_err(e: kube::Error) -> StoreError {
    match e {
        kube::Error::Api(resp) => match (resp.code, resp.reason.as_str()) {
            (409, "AlreadyExists") => StoreError::AlreadyExists(resp.message),
            (409, _) => StoreError::Conflict(resp.message),
            (404, _) => StoreError::NotFound(resp.message),
            (422, _) | (400, _) => StoreError::Invalid(resp.message),
            (code, _) => StoreError::Api { code, message: resp.message },
        },
        kube::Error::SerdeError(e) => StoreError::Invalid(e.to_string()),
        other => StoreError::Transport(other.to_string()),
    }
}

fn name_of(key: &ObjectKey) -> &str { key.name.as_str() }

#[async_trait::async_trait]
impl ClusterStore for KubeStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<DynamicObject>> {
        counter!("store_requests_total", 1u64, "verb" => "get");
        let api = self.api(&key.gvk(), key.namespace.as_deref()).await?;
        api.get_opt(name_of(key)).await.map_err(map_kube_err)
    }

    async fn list(&self, kind: &KnownKind, namespace: Option<&str>, limit: Option<u32>) -> StoreResult<Vec<DynamicObject>> {
        counter!("store_requests_total", 1u64, "verb" => "list");
        let gvk = GroupVersionKind::gvk(kind.group, kind.version, kind.kind);
        let api = self.api(&gvk, namespace).await?;
        let mut lp = ListParams::default();
        if let Some(n) = limit {
            lp = lp.limit(n);
        }
        let list = api.list(&lp).await.map_err(map_kube_err)?;
        Ok(list.items)
    }

    async fn create(&self, obj: &DynamicObject) -> StoreResult<DynamicObject> {
        counter!("store_requests_total", 1u64, "verb" => "create");
        let (api, key) = self.api_for(obj).await?;
        debug!(key = %key, "create");
        api.create(&PostParams::default(), obj).await.map_err(map_kube_err)
    }

    async fn update(&self, obj: &DynamicObject) -> StoreResult<DynamicObject> {
        counter!("store_requests_total", 1u64, "verb" => "update");
        let (api, key) = self.api_for(obj).await?;
        debug!(key = %key, rv = ?obj.metadata.resource_version, "update");
        api.replace(name_of(&key), &PostParams::default(), obj).await.map_err(map_kube_err)
    }

    async fn update_status(&self, obj: &DynamicObject) -> StoreResult<DynamicObject> {
        counter!("store_requests_total", 1u64, "verb" => "update_status");
        let (api, key) = self.api_for(obj).await?;
        let status = obj.data.get("status").cloned().unwrap_or(serde_json::Value::Null);
        // resourceVersion in the patch body keeps the write conditional
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": obj.metadata.resource_version },
            "status": status,
        });
        debug!(key = %key, "update status");
        api.patch_status(name_of(&key), &PatchParams::default(), &Patch::Merge(&patch)).await.map_err(map_kube_err)
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        counter!("store_requests_total", 1u64, "verb" => "delete");
        let api = self.api(&key.gvk(), key.namespace.as_deref()).await?;
        match api.delete(name_of(key), &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let e = map_kube_err(e);
                if !e.is_not_found() {
                    warn!(key = %key, error = %e, "delete failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_err(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse { status: "Failure".into(), message: format!("{reason} msg"), reason: reason.into(), code })
    }

    #[test]
    fn kube_errors_map_to_store_taxonomy() {
        assert!(map_kube_err(api_err(409, "Conflict")).is_conflict());
        assert!(matches!(map_kube_err(api_err(409, "AlreadyExists")), StoreError::AlreadyExists(_)));
        assert!(map_kube_err(api_err(404, "NotFound")).is_not_found());
        assert!(matches!(map_kube_err(api_err(422, "Invalid")), StoreError::Invalid(_)));
        assert_eq!(
            map_kube_err(api_err(500, "InternalError")),
            StoreError::Api { code: 500, message: "InternalError msg".into() }
        );
    }
}
