//! PostgreSQL plus the `cnvrg-db-init` ConfigMap. The init document is not
//! owned by the app; teardown deletes it explicitly.

use std::collections::BTreeMap;

use anyhow::Result;
use cnvrg_spec::{enabled, CnvrgApp};
use serde_json::json;

use crate::manifest::{self, labels};
use crate::{Deployable, Generator};

pub const DB_INIT_CONFIG_MAP: &str = "cnvrg-db-init";
const PG_USER: &str = "cnvrg";
const PG_DATABASE: &str = "cnvrg_production";
const CVAT_DATABASE: &str = "cvat";

pub struct PgGenerator;

impl Generator for PgGenerator {
    fn name(&self) -> &'static str { "pg" }

    fn generate(&self, app: &CnvrgApp) -> Result<Vec<Deployable>> {
        let pg = &app.spec.dbs.pg;
        if !enabled(pg.enabled) {
            return Ok(vec![]);
        }
        let l = labels(app, &pg.svc_name);

        let mut creds = BTreeMap::new();
        creds.insert("POSTGRESQL_USER", PG_USER.to_string());
        creds.insert("POSTGRESQL_PASSWORD", manifest::random_token());
        creds.insert("POSTGRESQL_ADMIN_PASSWORD", manifest::random_token());
        creds.insert("POSTGRESQL_DATABASE", PG_DATABASE.to_string());
        creds.insert("POSTGRESQL_MAX_CONNECTIONS", pg.max_connections.to_string());

        let mut init = BTreeMap::new();
        init.insert("POSTGRES_HOST", manifest::cluster_svc(app, &pg.svc_name)?);
        init.insert("POSTGRES_PORT", pg.port.to_string());
        init.insert("POSTGRES_DB", PG_DATABASE.to_string());
        if app.spec.dbs.cvat.pg.enabled {
            init.insert("CVAT_DB", CVAT_DATABASE.to_string());
        }

        let container = json!({
            "name": "postgres",
            "image": pg.image,
            "envFrom": [{ "secretRef": { "name": pg.creds_ref } }],
            "ports": [{ "name": "postgres", "containerPort": pg.port }],
            "resources": manifest::resources(&pg.requests, &pg.limits),
            "volumeMounts": [{ "name": "data", "mountPath": "/var/lib/pgsql/data" }],
        });
        Ok(vec![
            Deployable::owned(manifest::secret(app, &pg.creds_ref, &l, creds)?),
            Deployable::owned(manifest::pvc(app, &pg.svc_name, &l, &pg.storage_size, &pg.storage_class)?),
            Deployable::owned(manifest::volume_deployment(app, &pg.svc_name, &l, container, &pg.svc_name)?),
            Deployable::owned(manifest::service(app, &pg.svc_name, &l, pg.port, false)?),
            Deployable::unowned(manifest::config_map(app, DB_INIT_CONFIG_MAP, &l, init)?),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use cnvrg_spec::CnvrgAppSpec;

    #[test]
    fn pg_emits_stack_and_unowned_init_document() {
        let out = PgGenerator.generate(&testing::app("ns")).unwrap();
        assert_eq!(
            testing::names(&out),
            vec!["Secret/pg-creds", "PersistentVolumeClaim/postgres", "Deployment/postgres", "Service/postgres", "ConfigMap/cnvrg-db-init"]
        );
        assert!(out[..4].iter().all(|d| d.owned));
        assert!(!out[4].owned);
        assert_eq!(out[0].object.data["stringData"]["POSTGRESQL_MAX_CONNECTIONS"], "500");
        assert!(out[4].object.data["data"].get("CVAT_DB").is_none());
    }

    #[test]
    fn cvat_adds_its_database() {
        let mut user = CnvrgAppSpec::default();
        user.dbs.cvat.enabled = true;
        let out = PgGenerator.generate(&testing::app_with("ns", user)).unwrap();
        assert_eq!(out[4].object.data["data"]["CVAT_DB"], "cvat");
    }

    #[test]
    fn user_storage_class_lands_on_the_claim() {
        let mut user = CnvrgAppSpec::default();
        user.dbs.pg.storage_class = "fast".into();
        let out = PgGenerator.generate(&testing::app_with("ns", user)).unwrap();
        assert_eq!(out[1].object.data["spec"]["storageClassName"], "fast");
    }
}
