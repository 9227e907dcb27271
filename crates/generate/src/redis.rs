use std::collections::BTreeMap;

use anyhow::Result;
use cnvrg_spec::{enabled, CnvrgApp};
use serde_json::json;

use crate::manifest::{self, labels};
use crate::{Deployable, Generator};

pub struct RedisGenerator;

impl Generator for RedisGenerator {
    fn name(&self) -> &'static str { "redis" }

    fn generate(&self, app: &CnvrgApp) -> Result<Vec<Deployable>> {
        let redis = &app.spec.dbs.redis;
        if !enabled(redis.enabled) {
            return Ok(vec![]);
        }
        let l = labels(app, &redis.svc_name);
        let mut creds = BTreeMap::new();
        creds.insert("REDIS_PASSWORD", manifest::random_token());

        let container = json!({
            "name": "redis",
            "image": redis.image,
            "command": ["/bin/sh", "-c", "redis-server --appendonly yes --requirepass \"$REDIS_PASSWORD\""],
            "envFrom": [{ "secretRef": { "name": redis.creds_ref } }],
            "ports": [{ "name": "redis", "containerPort": redis.port }],
            "resources": manifest::resources(&redis.requests, &redis.limits),
            "volumeMounts": [{ "name": "data", "mountPath": "/data" }],
        });
        Ok(vec![
            Deployable::owned(manifest::secret(app, &redis.creds_ref, &l, creds)?),
            Deployable::owned(manifest::pvc(app, &redis.svc_name, &l, &redis.storage_size, &redis.storage_class)?),
            Deployable::owned(manifest::volume_deployment(app, &redis.svc_name, &l, container, &redis.svc_name)?),
            Deployable::owned(manifest::service(app, &redis.svc_name, &l, redis.port, false)?),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use cnvrg_spec::CnvrgAppSpec;

    #[test]
    fn redis_emits_creds_volume_workload_and_service() {
        let out = RedisGenerator.generate(&testing::app("ns")).unwrap();
        assert_eq!(testing::names(&out), vec!["Secret/redis-creds", "PersistentVolumeClaim/redis", "Deployment/redis", "Service/redis"]);
        assert_eq!(out[1].object.data["spec"]["resources"]["requests"]["storage"], "10Gi");
        assert_eq!(out[2].object.data["spec"]["strategy"]["type"], "Recreate");
    }

    #[test]
    fn disabled_redis_emits_nothing() {
        let mut user = CnvrgAppSpec::default();
        user.dbs.redis.enabled = Some(false);
        assert!(RedisGenerator.generate(&testing::app_with("ns", user)).unwrap().is_empty());
    }
}
