//! Log shipping (fluent-bit) and log storage (Elasticsearch).

use std::collections::BTreeMap;

use anyhow::Result;
use cnvrg_core::kinds::{DAEMON_SET, STATEFUL_SET};
use cnvrg_spec::{enabled, CnvrgApp, CriType};
use serde_json::json;

use crate::manifest::{self, labels, namespace};
use crate::{Deployable, Generator};

pub const FLUENTBIT: &str = "fluentbit";

pub struct LoggingGenerator;

/// fluent-bit input parser matching the node container runtime's log format.
fn log_parser(cri: Option<CriType>) -> &'static str {
    match cri {
        Some(CriType::Docker) => "docker",
        _ => "cri",
    }
}

fn fluentbit_config(app: &CnvrgApp) -> Result<BTreeMap<&'static str, String>> {
    let es = &app.spec.dbs.es;
    let ns = namespace(app)?;
    let mut data = BTreeMap::new();
    data.insert("fluent-bit.conf", format!(
        "[SERVICE]\n    Flush 1\n    Parsers_File parsers.conf\n\n\
         [INPUT]\n    Name tail\n    Path /var/log/containers/*_{ns}_*.log\n    Parser {parser}\n    Tag kube.*\n\n\
         [FILTER]\n    Name kubernetes\n    Match kube.*\n\n\
         [OUTPUT]\n    Name es\n    Match *\n    Host {host}\n    Port {port}\n    Logstash_Format On\n",
        parser = log_parser(app.spec.cri),
        host = manifest::cluster_svc(app, &es.svc_name)?,
        port = es.port,
    ));
    data.insert("parsers.conf", concat!(
        "[PARSER]\n    Name docker\n    Format json\n    Time_Key time\n\n",
        "[PARSER]\n    Name cri\n    Format regex\n    Regex ^(?<time>[^ ]+) (?<stream>stdout|stderr) (?<logtag>[^ ]*) (?<log>.*)$\n",
    ).to_string());
    Ok(data)
}

impl Generator for LoggingGenerator {
    fn name(&self) -> &'static str { "logging" }

    fn generate(&self, app: &CnvrgApp) -> Result<Vec<Deployable>> {
        let ns = namespace(app)?;
        let mut out = Vec::new();

        let fb = &app.spec.logging.fluentbit;
        if enabled(fb.enabled) {
            let l = labels(app, FLUENTBIT);
            out.push(Deployable::owned(manifest::config_map(app, FLUENTBIT, &l, fluentbit_config(app)?)?));
            let container = json!({
                "name": FLUENTBIT,
                "image": fb.image,
                "volumeMounts": [
                    { "name": "config", "mountPath": "/fluent-bit/etc/" },
                    { "name": "varlog", "mountPath": "/var/log", "readOnly": true },
                ],
            });
            let volumes = json!([
                { "name": "config", "configMap": { "name": FLUENTBIT } },
                { "name": "varlog", "hostPath": { "path": "/var/log" } },
            ]);
            let mut pod = manifest::pod_spec(app, json!([container]), volumes);
            pod["tolerations"] = json!([{ "operator": "Exists" }]);
            let ds = manifest::object(&DAEMON_SET, ns, FLUENTBIT, &l, json!({
                "spec": {
                    "selector": { "matchLabels": { "app": FLUENTBIT } },
                    "template": { "metadata": { "labels": l }, "spec": pod },
                },
            }))?;
            out.push(Deployable::owned(ds));
        }

        let es = &app.spec.dbs.es;
        if enabled(es.enabled) {
            let l = labels(app, &es.svc_name);
            let mut env = vec![
                json!({ "name": "discovery.type", "value": "single-node" }),
                json!({ "name": "cluster.name", "value": "cnvrg-es" }),
            ];
            if !es.java_opts.is_empty() {
                env.push(json!({ "name": "ES_JAVA_OPTS", "value": es.java_opts }));
            }
            let container = json!({
                "name": "elasticsearch",
                "image": es.image,
                "env": env,
                "ports": [{ "name": "http", "containerPort": es.port }],
                "resources": manifest::resources(&es.requests, &es.limits),
                "volumeMounts": [{ "name": "es-storage", "mountPath": "/usr/share/elasticsearch/data" }],
            });
            let pod = manifest::pod_spec(app, json!([container]), json!([]));
            let mut claim = json!({
                "metadata": { "name": "es-storage" },
                "spec": { "accessModes": ["ReadWriteOnce"], "resources": { "requests": { "storage": es.storage_size } } },
            });
            if !es.storage_class.is_empty() {
                claim["spec"]["storageClassName"] = json!(es.storage_class);
            }
            let sts = manifest::object(&STATEFUL_SET, ns, &es.svc_name, &l, json!({
                "spec": {
                    "serviceName": es.svc_name,
                    "replicas": 1,
                    "selector": { "matchLabels": { "app": es.svc_name } },
                    "template": { "metadata": { "labels": l }, "spec": pod },
                    "volumeClaimTemplates": [claim],
                },
            }))?;
            out.push(Deployable::owned(sts));
            out.push(Deployable::owned(manifest::service(app, &es.svc_name, &l, es.port, false)?));
        }
        Ok(out)
    }
}
