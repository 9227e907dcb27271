//! In-memory [`ClusterStore`] with API-server-like semantics: resource
//! versions, generation bumps, finalizer-gated deletion and owner-reference
//! garbage collection. Faults can be injected per verb for tests.

use std::sync::Mutex;

use chrono::Utc;
use cnvrg_core::{KnownKind, ObjectKey, StoreError, StoreResult};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::DynamicObject;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;

use crate::ClusterStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
    Delete,
}

/// Fail the next `times` calls of `verb` on `kind` (optionally only `name`).
#[derive(Debug, Clone)]
pub struct Fault {
    pub verb: Verb,
    pub kind: String,
    pub name: Option<String>,
    pub error: StoreError,
    pub times: usize,
}

impl Fault {
    pub fn once(verb: Verb, kind: &KnownKind, error: StoreError) -> Self {
        Self { verb, kind: kind.kind.to_string(), name: None, error, times: 1 }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn times(mut self, n: usize) -> Self {
        self.times = n;
        self
    }
}

/// One successful mutation. `object` is the stored state after the write,
/// `None` when the write removed the object.
#[derive(Debug, Clone)]
pub struct Write {
    pub verb: Verb,
    pub key: ObjectKey,
    pub object: Option<DynamicObject>,
}

#[derive(Default)]
struct Inner {
    objects: FxHashMap<ObjectKey, DynamicObject>,
    rv: u64,
    faults: Vec<Fault>,
    writes: Vec<Write>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::Transport("mem store poisoned".into()))
    }

    /// Seed an object without recording a write.
    pub fn insert(&self, obj: DynamicObject) -> StoreResult<DynamicObject> {
        let key = ObjectKey::from_dynamic(&obj)?;
        let mut inner = self.lock()?;
        let stored = inner.admit(obj);
        inner.objects.insert(key, stored.clone());
        Ok(stored)
    }

    pub fn inject(&self, fault: Fault) {
        if let Ok(mut inner) = self.lock() {
            inner.faults.push(fault);
        }
    }

    pub fn writes(&self) -> Vec<Write> {
        self.lock().map(|i| i.writes.clone()).unwrap_or_default()
    }

    pub fn clear_writes(&self) {
        if let Ok(mut inner) = self.lock() {
            inner.writes.clear();
        }
    }

    /// Current stored object, bypassing faults.
    pub fn peek(&self, key: &ObjectKey) -> Option<DynamicObject> {
        self.lock().ok().and_then(|i| i.objects.get(key).cloned())
    }

    pub fn keys(&self) -> Vec<ObjectKey> {
        let mut keys: Vec<ObjectKey> = self.lock().map(|i| i.objects.keys().cloned().collect()).unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize { self.lock().map(|i| i.objects.len()).unwrap_or(0) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Inner {
    fn next_rv(&mut self) -> String {
        self.rv += 1;
        self.rv.to_string()
    }

    fn admit(&mut self, mut obj: DynamicObject) -> DynamicObject {
        obj.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        obj.metadata.resource_version = Some(self.next_rv());
        obj.metadata.generation = Some(1);
        obj.metadata.creation_timestamp = Some(Time(Utc::now()));
        obj.metadata.deletion_timestamp = None;
        obj
    }

    fn fault(&mut self, verb: Verb, kind: &str, name: Option<&str>) -> StoreResult<()> {
        let hit = self.faults.iter_mut().find(|f| {
            f.times > 0 && f.verb == verb && f.kind == kind && (f.name.is_none() || f.name.as_deref() == name)
        });
        match hit {
            Some(f) => {
                f.times -= 1;
                let err = f.error.clone();
                self.faults.retain(|f| f.times > 0);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn record(&mut self, verb: Verb, key: ObjectKey, object: Option<DynamicObject>) {
        self.writes.push(Write { verb, key, object });
    }

    /// Remove `key` and every object transitively owned by it.
    fn remove_cascading(&mut self, key: &ObjectKey) {
        let mut doomed: Vec<String> = Vec::new();
        if let Some(obj) = self.objects.remove(key) {
            doomed.extend(obj.metadata.uid);
        }
        while let Some(uid) = doomed.pop() {
            let owned: Vec<ObjectKey> = self
                .objects
                .iter()
                .filter(|(_, o)| o.metadata.owner_references.iter().flatten().any(|r| r.uid == uid))
                .map(|(k, _)| k.clone())
                .collect();
            for k in owned {
                if let Some(o) = self.objects.remove(&k) {
                    doomed.extend(o.metadata.uid);
                }
            }
        }
    }
}

fn check_rv(incoming: &DynamicObject, stored: &DynamicObject, key: &ObjectKey) -> StoreResult<()> {
    match &incoming.metadata.resource_version {
        Some(rv) if Some(rv) != stored.metadata.resource_version.as_ref() => {
            Err(StoreError::Conflict(format!("{key}: resourceVersion {rv} is stale")))
        }
        _ => Ok(()),
    }
}

fn without_status(data: &Json) -> Json {
    let mut data = data.clone();
    if let Some(m) = data.as_object_mut() {
        m.remove("status");
    }
    data
}

fn set_status(data: &mut Json, status: Option<Json>) {
    if let Some(m) = data.as_object_mut() {
        match status {
            Some(s) => {
                m.insert("status".into(), s);
            }
            None => {
                m.remove("status");
            }
        }
    }
}

#[async_trait::async_trait]
impl ClusterStore for MemStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<DynamicObject>> {
        let mut inner = self.lock()?;
        inner.fault(Verb::Get, &key.kind, Some(&key.name))?;
        Ok(inner.objects.get(key).cloned())
    }

    async fn list(&self, kind: &KnownKind, namespace: Option<&str>, limit: Option<u32>) -> StoreResult<Vec<DynamicObject>> {
        let mut inner = self.lock()?;
        inner.fault(Verb::List, kind.kind, None)?;
        let mut hits: Vec<(&ObjectKey, &DynamicObject)> = inner
            .objects
            .iter()
            .filter(|(k, _)| k.same_kind(kind) && (namespace.is_none() || k.namespace.as_deref() == namespace))
            .collect();
        hits.sort_by(|a, b| a.0.cmp(b.0));
        let take = limit.map(|n| n as usize).unwrap_or(usize::MAX);
        Ok(hits.into_iter().take(take).map(|(_, o)| o.clone()).collect())
    }

    async fn create(&self, obj: &DynamicObject) -> StoreResult<DynamicObject> {
        let key = ObjectKey::from_dynamic(obj)?;
        let mut inner = self.lock()?;
        inner.fault(Verb::Create, &key.kind, Some(&key.name))?;
        if inner.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        let stored = inner.admit(obj.clone());
        inner.objects.insert(key.clone(), stored.clone());
        inner.record(Verb::Create, key, Some(stored.clone()));
        Ok(stored)
    }

    async fn update(&self, obj: &DynamicObject) -> StoreResult<DynamicObject> {
        let key = ObjectKey::from_dynamic(obj)?;
        let mut inner = self.lock()?;
        inner.fault(Verb::Update, &key.kind, Some(&key.name))?;
        let stored = inner.objects.get(&key).cloned().ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        check_rv(obj, &stored, &key)?;

        let mut next = obj.clone();
        next.metadata.uid = stored.metadata.uid.clone();
        next.metadata.creation_timestamp = stored.metadata.creation_timestamp.clone();
        next.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        set_status(&mut next.data, stored.data.get("status").cloned());
        let generation = stored.metadata.generation.unwrap_or(1);
        let changed = without_status(&next.data) != without_status(&stored.data);
        next.metadata.generation = Some(if changed { generation + 1 } else { generation });
        next.metadata.resource_version = Some(inner.next_rv());

        let finalized = next.metadata.deletion_timestamp.is_some() && next.metadata.finalizers.as_ref().map_or(true, |f| f.is_empty());
        if finalized {
            inner.remove_cascading(&key);
            inner.record(Verb::Update, key, None);
        } else {
            inner.objects.insert(key.clone(), next.clone());
            inner.record(Verb::Update, key, Some(next.clone()));
        }
        Ok(next)
    }

    async fn update_status(&self, obj: &DynamicObject) -> StoreResult<DynamicObject> {
        let key = ObjectKey::from_dynamic(obj)?;
        let mut inner = self.lock()?;
        inner.fault(Verb::UpdateStatus, &key.kind, Some(&key.name))?;
        let mut next = inner.objects.get(&key).cloned().ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        check_rv(obj, &next, &key)?;
        set_status(&mut next.data, obj.data.get("status").cloned());
        next.metadata.resource_version = Some(inner.next_rv());
        inner.objects.insert(key.clone(), next.clone());
        inner.record(Verb::UpdateStatus, key, Some(next.clone()));
        Ok(next)
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.fault(Verb::Delete, &key.kind, Some(&key.name))?;
        let stored = inner.objects.get(key).cloned().ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let has_finalizers = stored.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty());
        if !has_finalizers {
            inner.remove_cascading(key);
            inner.record(Verb::Delete, key.clone(), None);
            return Ok(());
        }
        if stored.metadata.deletion_timestamp.is_none() {
            let mut next = stored;
            next.metadata.deletion_timestamp = Some(Time(Utc::now()));
            next.metadata.generation = Some(next.metadata.generation.unwrap_or(1) + 1);
            next.metadata.resource_version = Some(inner.next_rv());
            inner.objects.insert(key.clone(), next.clone());
            inner.record(Verb::Delete, key.clone(), Some(next));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnvrg_core::kinds::{CONFIG_MAP, DEPLOYMENT};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::core::{ObjectMeta, TypeMeta};
    use serde_json::json;

    fn cm(name: &str, data: Json) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta { api_version: "v1".into(), kind: "ConfigMap".into() }),
            metadata: ObjectMeta { name: Some(name.into()), namespace: Some("ns".into()), ..Default::default() },
            data,
        }
    }

    fn key(name: &str) -> ObjectKey { ObjectKey::new(&CONFIG_MAP, Some("ns"), name) }

    #[tokio::test]
    async fn stale_update_conflicts_and_fresh_update_bumps_generation() {
        let s = MemStore::new();
        let created = s.create(&cm("a", json!({"data": {"k": "1"}}))).await.unwrap();
        assert_eq!(created.metadata.generation, Some(1));

        let mut fresh = created.clone();
        fresh.data = json!({"data": {"k": "2"}});
        let updated = s.update(&fresh).await.unwrap();
        assert_eq!(updated.metadata.generation, Some(2));

        let err = s.update(&fresh).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn status_writes_do_not_touch_spec_or_generation() {
        let s = MemStore::new();
        let mut o = s.create(&cm("a", json!({"spec": {"x": 1}}))).await.unwrap();
        o.data = json!({"spec": {"x": 99}, "status": {"status": "HEALTHY"}});
        let after = s.update_status(&o).await.unwrap();
        assert_eq!(after.data, json!({"spec": {"x": 1}, "status": {"status": "HEALTHY"}}));
        assert_eq!(after.metadata.generation, Some(1));

        // plain updates keep the stored status
        let mut again = after.clone();
        again.data = json!({"spec": {"x": 1}});
        let kept = s.update(&again).await.unwrap();
        assert_eq!(kept.data["status"]["status"], "HEALTHY");
    }

    #[tokio::test]
    async fn finalizers_gate_deletion() {
        let s = MemStore::new();
        let mut o = cm("a", json!({}));
        o.metadata.finalizers = Some(vec!["x/y".into()]);
        let o = s.create(&o).await.unwrap();
        s.delete(&key("a")).await.unwrap();
        let marked = s.peek(&key("a")).unwrap();
        assert!(marked.metadata.deletion_timestamp.is_some());

        let mut cleared = marked.clone();
        cleared.metadata.finalizers = Some(vec![]);
        s.update(&cleared).await.unwrap();
        assert!(s.peek(&key("a")).is_none());
        assert_ne!(o.metadata.resource_version, marked.metadata.resource_version);
    }

    #[tokio::test]
    async fn owner_removal_collects_dependents() {
        let s = MemStore::new();
        let owner = s.create(&cm("owner", json!({}))).await.unwrap();
        let mut dep = DynamicObject {
            types: Some(TypeMeta { api_version: "apps/v1".into(), kind: "Deployment".into() }),
            metadata: ObjectMeta { name: Some("web".into()), namespace: Some("ns".into()), ..Default::default() },
            data: json!({}),
        };
        dep.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "v1".into(),
            kind: "ConfigMap".into(),
            name: "owner".into(),
            uid: owner.metadata.uid.clone().unwrap(),
            ..Default::default()
        }]);
        s.create(&dep).await.unwrap();
        s.create(&cm("free", json!({}))).await.unwrap();

        s.delete(&key("owner")).await.unwrap();
        assert!(s.peek(&ObjectKey::new(&DEPLOYMENT, Some("ns"), "web")).is_none());
        assert!(s.peek(&key("free")).is_some());
    }

    #[tokio::test]
    async fn injected_faults_fire_then_clear() {
        let s = MemStore::new();
        s.inject(Fault::once(Verb::Create, &CONFIG_MAP, StoreError::Transport("boom".into())).times(2));
        assert!(s.create(&cm("a", json!({}))).await.is_err());
        assert!(s.create(&cm("a", json!({}))).await.is_err());
        assert!(s.create(&cm("a", json!({}))).await.is_ok());
        assert!(matches!(s.create(&cm("a", json!({}))).await, Err(StoreError::AlreadyExists(_))));
        assert_eq!(s.writes().len(), 1);
    }

    #[tokio::test]
    async fn list_is_ordered_and_limited() {
        let s = MemStore::new();
        for n in ["c", "a", "b"] {
            s.insert(cm(n, json!({}))).unwrap();
        }
        let names: Vec<String> = s.list(&CONFIG_MAP, None, Some(2)).await.unwrap().into_iter().filter_map(|o| o.metadata.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(s.writes().is_empty());
    }
}
