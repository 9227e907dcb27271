use std::collections::BTreeMap;

use anyhow::Result;
use cnvrg_spec::{enabled, CnvrgApp};
use serde_json::json;

use crate::manifest::{self, labels};
use crate::{Deployable, Generator};

pub struct MinioGenerator;

impl Generator for MinioGenerator {
    fn name(&self) -> &'static str { "minio" }

    fn generate(&self, app: &CnvrgApp) -> Result<Vec<Deployable>> {
        let minio = &app.spec.dbs.minio;
        if !enabled(minio.enabled) {
            return Ok(vec![]);
        }
        let l = labels(app, &minio.svc_name);
        let mut creds = BTreeMap::new();
        creds.insert("MINIO_ACCESS_KEY", manifest::random_token());
        creds.insert("MINIO_SECRET_KEY", manifest::random_token());

        let container = json!({
            "name": "minio",
            "image": minio.image,
            "args": ["gateway", "nas", "/data", "--address", format!(":{}", minio.port)],
            "envFrom": [{ "secretRef": { "name": minio.creds_ref } }],
            "ports": [{ "name": "http", "containerPort": minio.port }],
            "resources": manifest::resources(&minio.requests, &minio.limits),
            "volumeMounts": [{ "name": "data", "mountPath": "/data" }],
            "readinessProbe": { "httpGet": { "path": "/minio/health/ready", "port": minio.port } },
        });
        Ok(vec![
            Deployable::owned(manifest::secret(app, &minio.creds_ref, &l, creds)?),
            Deployable::owned(manifest::pvc(app, &minio.svc_name, &l, &minio.storage_size, &minio.storage_class)?),
            Deployable::owned(manifest::volume_deployment(app, &minio.svc_name, &l, container, &minio.svc_name)?),
            Deployable::owned(manifest::service(app, &minio.svc_name, &l, minio.port, false)?),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn minio_uses_object_storage_creds() {
        let out = MinioGenerator.generate(&testing::app("ns")).unwrap();
        assert_eq!(
            testing::names(&out),
            vec!["Secret/cp-object-storage", "PersistentVolumeClaim/minio", "Deployment/minio", "Service/minio"]
        );
        let a = out[0].object.data["stringData"]["MINIO_ACCESS_KEY"].as_str().unwrap();
        let b = out[0].object.data["stringData"]["MINIO_SECRET_KEY"].as_str().unwrap();
        assert_ne!(a, b);
    }
}
