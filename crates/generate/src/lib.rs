//! cnvrg generators: each component turns a desired `CnvrgApp` into the
//! Kubernetes objects it needs. Generators are pure; the reconciler decides
//! what to create.

#![forbid(unsafe_code)]

use cnvrg_core::{ObjectKey, StoreResult};
use cnvrg_spec::CnvrgApp;
use kube::core::DynamicObject;

pub mod controlplane;
pub mod ingress;
pub mod logging;
pub mod manifest;
pub mod minio;
pub mod pg;
pub mod redis;

/// One generated object. `owned` objects get a controller reference to the
/// app and are collected with it; the rest are deleted explicitly on teardown.
#[derive(Debug, Clone)]
pub struct Deployable {
    pub object: DynamicObject,
    pub owned: bool,
}

impl Deployable {
    pub fn owned(object: DynamicObject) -> Self { Self { object, owned: true } }

    pub fn unowned(object: DynamicObject) -> Self { Self { object, owned: false } }

    pub fn key(&self) -> StoreResult<ObjectKey> { ObjectKey::from_dynamic(&self.object) }
}

pub trait Generator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Objects for `app`, whose spec is already the desired (merged) spec.
    fn generate(&self, app: &CnvrgApp) -> anyhow::Result<Vec<Deployable>>;
}

/// Built-in generators in apply order.
pub fn default_generators() -> Vec<Box<dyn Generator>> {
    vec![
        Box::new(ingress::IngressGenerator),
        Box::new(controlplane::ControlPlaneGenerator),
        Box::new(logging::LoggingGenerator),
        Box::new(redis::RedisGenerator),
        Box::new(pg::PgGenerator),
        Box::new(minio::MinioGenerator),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    use cnvrg_spec::{desired_spec, CnvrgApp, CnvrgAppSpec, CriType, Facts};

    pub fn app_with(ns: &str, user: CnvrgAppSpec) -> CnvrgApp {
        let spec = desired_spec(&user, &Facts { namespace: ns, cri: Some(CriType::Containerd), infra: None }).unwrap();
        let mut app = CnvrgApp::new("cnvrg-app", spec);
        app.metadata.namespace = Some(ns.to_string());
        app
    }

    pub fn app(ns: &str) -> CnvrgApp {
        let mut user = CnvrgAppSpec::default();
        user.cluster_domain = "example.com".into();
        app_with(ns, user)
    }

    pub fn names(out: &[super::Deployable]) -> Vec<String> {
        out.iter().map(|d| format!("{}/{}", d.object.types.as_ref().map(|t| t.kind.as_str()).unwrap_or(""), d.object.metadata.name.as_deref().unwrap_or(""))).collect()
    }
}
