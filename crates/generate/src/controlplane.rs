//! Control plane: shared config/secret, webapp and sidekiq workloads, and the
//! route that exposes the webapp for the configured ingress type.

use std::collections::BTreeMap;

use anyhow::Result;
use cnvrg_core::kinds::{INGRESS, ROUTE, SERVICE_MONITOR, VIRTUAL_SERVICE};
use cnvrg_spec::{enabled, CnvrgApp, IngressType};
use serde_json::{json, Value as Json};

use crate::manifest::{self, labels, namespace, Labels};
use crate::{Deployable, Generator};

pub const BASE_CONFIG: &str = "cp-base-config";
pub const BASE_SECRET: &str = "cp-base-secret";
pub const DEFAULT_PROXY_CONFIG: &str = "cp-proxy";
const SIDEKIQ: &str = "sidekiq";

pub struct ControlPlaneGenerator;

fn scheme(app: &CnvrgApp) -> &'static str { if app.spec.networking.https.enabled { "https" } else { "http" } }

fn proxy_config_name(app: &CnvrgApp) -> &str {
    let r = &app.spec.networking.proxy.config_ref;
    if r.is_empty() { DEFAULT_PROXY_CONFIG } else { r.as_str() }
}

fn base_config(app: &CnvrgApp) -> Result<BTreeMap<&'static str, String>> {
    let spec = &app.spec;
    let dbs = &spec.dbs;
    let mut data = BTreeMap::new();
    data.insert("DEFAULT_URL", format!("{}://{}", scheme(app), manifest::fqdn(app, &spec.control_plane.webapp.svc_name)));
    data.insert("CNVRG_CLUSTER_INTERNAL_DOMAIN", spec.cluster_internal_domain.clone());
    data.insert("CNVRG_JOB_PRIORITY_CLASS", spec.cnvrg_job_priority_class.name.clone());
    data.insert("POSTGRES_HOST", manifest::cluster_svc(app, &dbs.pg.svc_name)?);
    data.insert("POSTGRES_PORT", dbs.pg.port.to_string());
    data.insert("REDIS_URL", format!("redis://{}:{}", manifest::cluster_svc(app, &dbs.redis.svc_name)?, dbs.redis.port));
    data.insert("ELASTICSEARCH_URL", format!("http://{}:{}", manifest::cluster_svc(app, &dbs.es.svc_name)?, dbs.es.port));
    data.insert("MINIO_ENDPOINT", format!("http://{}:{}", manifest::cluster_svc(app, &dbs.minio.svc_name)?, dbs.minio.port));
    data.insert("CVAT_ENABLED", dbs.cvat.enabled.to_string());
    if spec.sso.enabled {
        data.insert("SSO_ENABLED", "true".into());
    }
    let pki = &spec.sso.pki;
    if pki.enabled {
        data.insert("PKI_PRIVATE_KEY_SECRET", pki.private_key_secret.clone());
        data.insert("PKI_PUBLIC_KEY_SECRET", pki.public_key_secret.clone());
        data.insert("PKI_ROOT_CA_SECRET", pki.root_ca_secret.clone());
    }
    Ok(data)
}

fn env_from(app: &CnvrgApp) -> Json {
    let mut refs = vec![json!({ "configMapRef": { "name": BASE_CONFIG } }), json!({ "secretRef": { "name": BASE_SECRET } })];
    if app.spec.networking.proxy.enabled {
        refs.push(json!({ "configMapRef": { "name": proxy_config_name(app) } }));
    }
    Json::Array(refs)
}

fn route(app: &CnvrgApp, l: &Labels) -> Result<Option<Deployable>> {
    let ns = namespace(app)?;
    let webapp = &app.spec.control_plane.webapp;
    let ingress = &app.spec.networking.ingress;
    let host = manifest::fqdn(app, &webapp.svc_name);
    let obj = match ingress.ingress_type {
        Some(IngressType::Istio) => manifest::object(&VIRTUAL_SERVICE, ns, &webapp.svc_name, l, json!({
            "spec": {
                "hosts": [host],
                "gateways": [ingress.istio_gw_name],
                "http": [{
                    "timeout": ingress.timeout,
                    "route": [{ "destination": { "host": manifest::cluster_svc(app, &webapp.svc_name)?, "port": { "number": webapp.port } } }],
                }],
            },
        }))?,
        Some(IngressType::Ingress) => {
            let mut spec = json!({
                "rules": [{
                    "host": host,
                    "http": { "paths": [{
                        "path": "/",
                        "pathType": "Prefix",
                        "backend": { "service": { "name": webapp.svc_name, "port": { "number": webapp.port } } },
                    }] },
                }],
            });
            if app.spec.networking.https.enabled {
                spec["tls"] = json!([{ "hosts": [host], "secretName": app.spec.networking.https.cert_secret }]);
            }
            manifest::object(&INGRESS, ns, &webapp.svc_name, l, json!({ "spec": spec }))?
        }
        Some(IngressType::Openshift) => {
            let mut spec = json!({
                "host": host,
                "to": { "kind": "Service", "name": webapp.svc_name },
                "port": { "targetPort": "http" },
            });
            if app.spec.networking.https.enabled {
                spec["tls"] = json!({ "termination": "edge", "insecureEdgeTerminationPolicy": "Redirect" });
            }
            manifest::object(&ROUTE, ns, &webapp.svc_name, l, json!({ "spec": spec }))?
        }
        Some(IngressType::NodePort) | None => return Ok(None),
    };
    Ok(Some(Deployable::owned(obj)))
}

impl Generator for ControlPlaneGenerator {
    fn name(&self) -> &'static str { "controlplane" }

    fn generate(&self, app: &CnvrgApp) -> Result<Vec<Deployable>> {
        let cp = &app.spec.control_plane;
        let webapp_on = enabled(cp.webapp.enabled);
        let sidekiq_on = enabled(cp.sidekiq.enabled);
        if !webapp_on && !sidekiq_on {
            return Ok(vec![]);
        }
        let base = labels(app, "cnvrg-control-plane");
        let mut out = vec![Deployable::owned(manifest::config_map(app, BASE_CONFIG, &base, base_config(app)?)?)];

        let proxy = &app.spec.networking.proxy;
        if proxy.enabled {
            let mut data = BTreeMap::new();
            for key in ["HTTP_PROXY", "http_proxy"] { data.insert(key, proxy.http_proxy.join(",")); }
            for key in ["HTTPS_PROXY", "https_proxy"] { data.insert(key, proxy.https_proxy.join(",")); }
            for key in ["NO_PROXY", "no_proxy"] { data.insert(key, proxy.no_proxy.join(",")); }
            out.push(Deployable::owned(manifest::config_map(app, proxy_config_name(app), &base, data)?));
        }

        let mut secret = BTreeMap::new();
        secret.insert("SECRET_KEY_BASE", manifest::random_token());
        out.push(Deployable::owned(manifest::secret(app, BASE_SECRET, &base, secret)?));

        if webapp_on {
            let l = labels(app, &cp.webapp.svc_name);
            let container = json!({
                "name": "cnvrg-app",
                "image": cp.image,
                "command": ["/bin/bash", "-lc", "start-web"],
                "ports": [{ "name": "http", "containerPort": cp.webapp.port }],
                "envFrom": env_from(app),
                "resources": manifest::resources(&cp.webapp.requests, &cp.webapp.limits),
                "readinessProbe": { "httpGet": { "path": "/healthz", "port": cp.webapp.port } },
            });
            let pod = manifest::pod_spec(app, json!([container]), json!([]));
            out.push(Deployable::owned(manifest::deployment(app, &cp.webapp.svc_name, &l, cp.webapp.replicas, pod)?));
            let node_port = app.spec.networking.ingress.ingress_type == Some(IngressType::NodePort);
            out.push(Deployable::owned(manifest::service(app, &cp.webapp.svc_name, &l, cp.webapp.port, node_port)?));
            out.extend(route(app, &l)?);
            if app.spec.monitoring.enabled {
                let ns = namespace(app)?;
                let sm = manifest::object(&SERVICE_MONITOR, ns, &cp.webapp.svc_name, &l, json!({
                    "spec": {
                        "selector": { "matchLabels": { "app": cp.webapp.svc_name } },
                        "namespaceSelector": { "matchNames": [ns] },
                        "endpoints": [{ "port": "http", "path": "/metrics", "interval": "30s" }],
                    },
                }))?;
                out.push(Deployable::owned(sm));
            }
        }

        if sidekiq_on {
            let l = labels(app, SIDEKIQ);
            let container = json!({
                "name": SIDEKIQ,
                "image": cp.image,
                "command": ["/bin/bash", "-lc", "start-sidekiq"],
                "envFrom": env_from(app),
                "resources": manifest::resources(&cp.sidekiq.requests, &cp.sidekiq.limits),
            });
            let pod = manifest::pod_spec(app, json!([container]), json!([]));
            out.push(Deployable::owned(manifest::deployment(app, SIDEKIQ, &l, cp.sidekiq.replicas, pod)?));
        }
        Ok(out)
    }
}
