//! Istio ingress gateway for the app namespace.

use anyhow::Result;
use cnvrg_core::kinds::GATEWAY;
use cnvrg_spec::{enabled, CnvrgApp, IngressType};
use serde_json::json;

use crate::manifest::{self, labels, namespace};
use crate::{Deployable, Generator};

pub struct IngressGenerator;

impl Generator for IngressGenerator {
    fn name(&self) -> &'static str { "ingress" }

    fn generate(&self, app: &CnvrgApp) -> Result<Vec<Deployable>> {
        let ingress = &app.spec.networking.ingress;
        if ingress.ingress_type != Some(IngressType::Istio) || !enabled(ingress.istio_gw_enabled) {
            return Ok(vec![]);
        }
        let ns = namespace(app)?;
        let hosts = vec![manifest::fqdn(app, "*")];
        let mut servers = vec![json!({
            "port": { "number": 80, "name": "http", "protocol": "HTTP" },
            "hosts": hosts,
        })];
        let https = &app.spec.networking.https;
        if https.enabled {
            servers.push(json!({
                "port": { "number": 443, "name": "https", "protocol": "HTTPS" },
                "hosts": hosts,
                "tls": { "mode": "SIMPLE", "credentialName": https.cert_secret },
            }));
        }
        let gw = manifest::object(&GATEWAY, ns, &ingress.istio_gw_name, &labels(app, "istio-gw"), json!({
            "spec": {
                "selector": { "istio": "ingressgateway" },
                "servers": servers,
            },
        }))?;
        Ok(vec![Deployable::owned(gw)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use cnvrg_spec::CnvrgAppSpec;

    #[test]
    fn istio_gateway_named_after_namespace() {
        let out = IngressGenerator.generate(&testing::app("team-a")).unwrap();
        assert_eq!(testing::names(&out), vec!["Gateway/istio-gw-team-a"]);
        let servers = out[0].object.data["spec"]["servers"].as_array().unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0]["hosts"][0], "*.example.com");
    }

    #[test]
    fn https_adds_tls_server() {
        let mut user = CnvrgAppSpec::default();
        user.networking.https.enabled = true;
        user.networking.https.cert_secret = "wildcard".into();
        let out = IngressGenerator.generate(&testing::app_with("ns", user)).unwrap();
        let servers = out[0].object.data["spec"]["servers"].as_array().unwrap();
        assert_eq!(servers[1]["tls"]["credentialName"], "wildcard");
    }

    #[test]
    fn other_ingress_types_or_disabled_gateway_emit_nothing() {
        let mut user = CnvrgAppSpec::default();
        user.networking.ingress.ingress_type = Some(IngressType::Openshift);
        assert!(IngressGenerator.generate(&testing::app_with("ns", user)).unwrap().is_empty());

        let mut user = CnvrgAppSpec::default();
        user.networking.ingress.istio_gw_enabled = Some(false);
        assert!(IngressGenerator.generate(&testing::app_with("ns", user)).unwrap().is_empty());
    }
}
