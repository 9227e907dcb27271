//! Desired spec = defaults ⊕ computed environment facts ⊕ user values.
//!
//! Pure: cluster introspection happens in the caller and arrives as [`Facts`].

use std::collections::BTreeSet;

use crate::app::{CnvrgAppSpec, CriType};
use crate::defaults::default_app_spec;
use crate::infra::CnvrgInfraSpec;
use crate::merge::Merge;

const PKI_PRIVATE_KEY_SECRET: &str = "okta-pki-private-key";
const PKI_PUBLIC_KEY_SECRET: &str = "okta-pki-public-key";
const PKI_ROOT_CA_SECRET: &str = "okta-pki-root-ca";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefaultsError {
    #[error("could not determine container runtime ({0}); set spec.cri explicitly")]
    UnknownRuntime(String),
}

/// Environment facts the merge depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Facts<'a> {
    pub namespace: &'a str,
    /// Runtime detected from a node; consulted when neither the user nor the infra sets `cri`
    pub cri: Option<CriType>,
    /// First `CnvrgInfra` in the cluster, if any
    pub infra: Option<&'a CnvrgInfraSpec>,
}

pub fn istio_gateway_name(namespace: &str) -> String { format!("istio-gw-{namespace}") }

/// Entries every proxied workload must bypass.
pub fn default_no_proxy(internal_domain: &str) -> Vec<String> {
    let domain = if internal_domain.is_empty() { "cluster.local" } else { internal_domain };
    vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
        ".svc".to_string(),
        format!(".svc.{domain}"),
        format!("kubernetes.default.svc.{domain}"),
    ]
}

/// `-Xms{N}g -Xmx{N}g` with N = half of a `<int>Gi` memory request.
pub fn es_heap_opts(memory: &str) -> Option<String> {
    let gi: i64 = memory.strip_suffix("Gi")?.trim().parse().ok()?;
    let heap = gi / 2;
    (heap > 0).then(|| format!("-Xms{heap}g -Xmx{heap}g"))
}

pub fn desired_spec(user: &CnvrgAppSpec, facts: &Facts<'_>) -> Result<CnvrgAppSpec, DefaultsError> {
    let mut desired = default_app_spec();

    // computed facts fill what the user left unset; the user overlay below wins otherwise
    if user.cri.is_none() {
        let cri = facts
            .infra
            .and_then(|i| i.cri)
            .or(facts.cri)
            .ok_or_else(|| DefaultsError::UnknownRuntime("no runtime detected".into()))?;
        desired.cri = Some(cri);
    }
    desired.networking.ingress.istio_gw_name = istio_gateway_name(facts.namespace);
    if let Some(infra) = facts.infra {
        if !infra.cluster_internal_domain.is_empty() {
            desired.cluster_internal_domain = infra.cluster_internal_domain.clone();
        }
        if user.cnvrg_app_priority_class.name.is_empty() {
            desired.cnvrg_app_priority_class = infra.cnvrg_app_priority_class.clone();
        }
        if user.cnvrg_job_priority_class.name.is_empty() {
            desired.cnvrg_job_priority_class = infra.cnvrg_job_priority_class.clone();
        }
    }

    desired.merge_from(user);

    // derived from merged values
    if desired.dbs.cvat.enabled {
        desired.dbs.cvat.pg.enabled = true;
        desired.dbs.cvat.redis.enabled = true;
    }
    if desired.dbs.es.java_opts.is_empty() {
        if let Some(opts) = es_heap_opts(&desired.dbs.es.requests.memory) {
            desired.dbs.es.java_opts = opts;
        }
    }
    if desired.networking.proxy.enabled {
        let mut all: BTreeSet<String> = desired.networking.proxy.no_proxy.iter().cloned().collect();
        all.extend(default_no_proxy(&desired.cluster_internal_domain));
        desired.networking.proxy.no_proxy = all.into_iter().collect();
    }
    let pki = &mut desired.sso.pki;
    if pki.enabled {
        if pki.private_key_secret.is_empty() { pki.private_key_secret = PKI_PRIVATE_KEY_SECRET.into(); }
        if pki.public_key_secret.is_empty() { pki.public_key_secret = PKI_PUBLIC_KEY_SECRET.into(); }
        if pki.root_ca_secret.is_empty() { pki.root_ca_secret = PKI_ROOT_CA_SECRET.into(); }
    }

    Ok(desired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{PriorityClass, Proxy};

    fn facts(ns: &str) -> Facts<'_> { Facts { namespace: ns, cri: Some(CriType::Containerd), infra: None } }

    #[test]
    fn empty_spec_gets_full_defaults_and_computed_facts() {
        let d = desired_spec(&CnvrgAppSpec::default(), &facts("team-a")).unwrap();
        assert_eq!(d.cri, Some(CriType::Containerd));
        assert_eq!(d.networking.ingress.istio_gw_name, "istio-gw-team-a");
        assert_eq!(d.dbs.pg.enabled, Some(true));
        assert_eq!(d.dbs.pg.port, 5432);
        assert_eq!(d.dbs.es.java_opts, "-Xms2g -Xmx2g");
        assert!(!d.networking.proxy.enabled);
    }

    #[test]
    fn runtime_is_required_unless_user_sets_it() {
        let no_cri = Facts { namespace: "ns", cri: None, infra: None };
        assert!(matches!(desired_spec(&CnvrgAppSpec::default(), &no_cri), Err(DefaultsError::UnknownRuntime(_))));
        let user = CnvrgAppSpec { cri: Some(CriType::Docker), ..Default::default() };
        assert_eq!(desired_spec(&user, &no_cri).unwrap().cri, Some(CriType::Docker));
    }

    #[test]
    fn user_values_override_and_bools_follow_user() {
        let mut user = CnvrgAppSpec::default();
        user.dbs.redis.enabled = Some(false);
        user.dbs.pg.port = 6543;
        user.networking.ingress.istio_gw_name = "shared-gw".into();
        user.dbs.es.java_opts = "-Xmx1g".into();
        let d = desired_spec(&user, &facts("ns")).unwrap();
        assert_eq!(d.dbs.redis.enabled, Some(false));
        assert_eq!(d.dbs.pg.port, 6543);
        assert_eq!(d.dbs.pg.image, "centos/postgresql-12-centos7");
        assert_eq!(d.networking.ingress.istio_gw_name, "shared-gw");
        assert_eq!(d.dbs.es.java_opts, "-Xmx1g");
    }

    #[test]
    fn no_proxy_is_sorted_deduplicated_union() {
        let mut user = CnvrgAppSpec::default();
        user.networking.proxy = Proxy {
            enabled: true,
            no_proxy: vec!["example.com".into(), "localhost".into(), ".corp".into()],
            ..Default::default()
        };
        let d = desired_spec(&user, &facts("ns")).unwrap();
        assert_eq!(
            d.networking.proxy.no_proxy,
            vec![".corp", ".svc", ".svc.cluster.local", "127.0.0.1", "example.com", "kubernetes.default.svc.cluster.local", "localhost"]
        );
    }

    #[test]
    fn desired_spec_is_a_fixpoint() {
        let mut user = CnvrgAppSpec::default();
        user.networking.proxy.enabled = true;
        user.dbs.cvat.enabled = true;
        user.sso.pki.enabled = true;
        let once = desired_spec(&user, &facts("ns")).unwrap();
        let twice = desired_spec(&once, &facts("ns")).unwrap();
        assert_eq!(once, twice);
        assert!(once.dbs.cvat.pg.enabled && once.dbs.cvat.redis.enabled);
        assert_eq!(once.sso.pki.root_ca_secret, "okta-pki-root-ca");
    }

    #[test]
    fn priority_classes_inherit_from_infra() {
        let infra = CnvrgInfraSpec {
            cnvrg_app_priority_class: PriorityClass { name: "app-pc".into(), value: 2000, description: String::new() },
            cnvrg_job_priority_class: PriorityClass { name: "job-pc".into(), value: 1000, description: String::new() },
            ..Default::default()
        };
        let mut user = CnvrgAppSpec::default();
        user.cnvrg_job_priority_class.name = "mine".into();
        let f = Facts { namespace: "ns", cri: Some(CriType::Crio), infra: Some(&infra) };
        let d = desired_spec(&user, &f).unwrap();
        assert_eq!(d.cnvrg_app_priority_class.name, "app-pc");
        assert_eq!(d.cnvrg_job_priority_class.name, "mine");
    }

    #[test]
    fn infra_runtime_and_domain_fill_unset_app_fields() {
        let infra = CnvrgInfraSpec { cri: Some(CriType::Docker), cluster_internal_domain: "corp.local".into(), ..Default::default() };
        let f = Facts { namespace: "ns", cri: None, infra: Some(&infra) };
        let d = desired_spec(&CnvrgAppSpec::default(), &f).unwrap();
        assert_eq!(d.cri, Some(CriType::Docker));
        assert_eq!(d.cluster_internal_domain, "corp.local");

        // infra runtime wins over a detected one; app values win over both
        let f = Facts { namespace: "ns", cri: Some(CriType::Containerd), infra: Some(&infra) };
        assert_eq!(desired_spec(&CnvrgAppSpec::default(), &f).unwrap().cri, Some(CriType::Docker));
        let user = CnvrgAppSpec { cri: Some(CriType::Crio), cluster_internal_domain: "mine.local".into(), ..Default::default() };
        let d = desired_spec(&user, &f).unwrap();
        assert_eq!(d.cri, Some(CriType::Crio));
        assert_eq!(d.cluster_internal_domain, "mine.local");
    }

    #[test]
    fn heap_opts_need_whole_gibibytes() {
        assert_eq!(es_heap_opts("8Gi").as_deref(), Some("-Xms4g -Xmx4g"));
        assert_eq!(es_heap_opts("1Gi"), None);
        assert_eq!(es_heap_opts("512Mi"), None);
    }
}
