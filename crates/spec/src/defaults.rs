//! Compiled-in baseline for `CnvrgAppSpec`.

use crate::app::*;

fn res(cpu: &str, memory: &str) -> Resources {
    Resources { cpu: cpu.into(), memory: memory.into() }
}

fn backing(image: &str, port: i32, svc: &str, size: &str, creds: &str, req: Resources, lim: Resources) -> Backing {
    Backing {
        enabled: Some(true),
        image: image.into(),
        port,
        svc_name: svc.into(),
        storage_size: size.into(),
        storage_class: String::new(),
        creds_ref: creds.into(),
        requests: req,
        limits: lim,
    }
}

pub fn default_app_spec() -> CnvrgAppSpec {
    CnvrgAppSpec {
        cluster_domain: String::new(),
        cluster_internal_domain: "cluster.local".into(),
        cri: None,
        labels: Default::default(),
        annotations: Default::default(),
        control_plane: ControlPlane {
            image: "cnvrg/core:3.6.99".into(),
            webapp: Webapp {
                enabled: Some(true),
                replicas: 1,
                port: 8080,
                svc_name: "app".into(),
                requests: res("2", "4Gi"),
                limits: res("4", "8Gi"),
            },
            sidekiq: Sidekiq { enabled: Some(true), replicas: 2, requests: res("1", "2Gi"), limits: res("2", "4Gi") },
        },
        logging: Logging {
            fluentbit: Fluentbit { enabled: Some(true), image: "cnvrg/cnvrg-fluentbit:v1.7.2".into() },
        },
        dbs: Dbs {
            pg: Pg {
                enabled: Some(true),
                image: "centos/postgresql-12-centos7".into(),
                port: 5432,
                svc_name: "postgres".into(),
                storage_size: "80Gi".into(),
                storage_class: String::new(),
                creds_ref: "pg-creds".into(),
                max_connections: 500,
                requests: res("4", "4Gi"),
                limits: res("12", "32Gi"),
            },
            redis: backing("docker.io/cnvrg/cnvrg-redis:v3.0.5.c2", 6379, "redis", "10Gi", "redis-creds", res("1", "2Gi"), res("2", "4Gi")),
            minio: backing("minio/minio:RELEASE.2021-05-22T02-34-03Z", 9000, "minio", "100Gi", "cp-object-storage", res("1", "2Gi"), res("4", "8Gi")),
            es: Es {
                enabled: Some(true),
                image: "docker.elastic.co/elasticsearch/elasticsearch:7.8.1".into(),
                port: 9200,
                svc_name: "elasticsearch".into(),
                storage_size: "80Gi".into(),
                storage_class: String::new(),
                java_opts: String::new(),
                requests: res("1", "4Gi"),
                limits: res("2", "8Gi"),
            },
            cvat: Cvat::default(),
        },
        networking: Networking {
            ingress: Ingress {
                ingress_type: Some(IngressType::Istio),
                istio_gw_enabled: Some(true),
                istio_gw_name: String::new(),
                timeout: "18000s".into(),
            },
            https: Https::default(),
            proxy: Proxy::default(),
        },
        sso: Sso::default(),
        monitoring: Monitoring::default(),
        cnvrg_app_priority_class: PriorityClass::default(),
        cnvrg_job_priority_class: PriorityClass::default(),
    }
}
